//! Complex Zernike polynomial basis and least-squares calibration solver.
//!
//! Pointing errors are 2-D vectors, which map naturally onto complex numbers
//! `e = ex + i·ey`. A displacement field over the unit disk is modelled as
//!
//! ```text
//! e(p) = Σ_j a_j · Z_j(p)
//! ```
//!
//! with complex coefficients `a_j` and the complex Zernike polynomials
//! `Z_j` described in [`complex`]. [`ZernikeSolver`] recovers the `a_j`
//! from error vectors measured at a finite set of points.

pub mod complex;
mod solver;

pub use complex::{j_to_mn, mn_to_j, radial, zernike, ComplexZernike};
pub use solver::ZernikeSolver;
