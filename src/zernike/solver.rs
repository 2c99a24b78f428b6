use nalgebra::{Complex, DMatrix, DVector};
use tracing::debug;

use super::complex::{j_to_mn, zernike};
use crate::error::{PoaError, Result};
use crate::Vec2;

/// Least-squares fit of complex Zernike coefficients to error vectors.
///
/// The `N × J` basis matrix `B[k, j] = Z_j(p_k)` and its SVD pseudo-inverse
/// are built once for a fixed set of (normalized) measurement points; every
/// [`solve_for`](ZernikeSolver::solve_for) call is a single product.
#[derive(Debug, Clone)]
pub struct ZernikeSolver {
    points: Vec<Vec2>,
    basis: DMatrix<Complex<f64>>,
    pinv: DMatrix<Complex<f64>>,
}

/// Singular values below this are treated as zero.
const SVD_EPS: f64 = 1e-12;

impl ZernikeSolver {
    /// Build the basis for `j_max` polynomials over `points`.
    pub fn new(points: &[Vec2], j_max: usize) -> Result<Self> {
        if points.is_empty() {
            return Err(PoaError::ShapeMismatch(
                "calibration point matrix is empty".into(),
            ));
        }
        if j_max == 0 {
            return Err(PoaError::ShapeMismatch(
                "at least one Zernike coefficient is required".into(),
            ));
        }
        if points.len() < j_max {
            return Err(PoaError::TooFewPoints {
                needed: j_max,
                available: points.len(),
            });
        }

        let modes: Vec<(i32, u32)> = (0..j_max).map(j_to_mn).collect();
        let basis = DMatrix::from_fn(points.len(), j_max, |k, j| {
            let (m, n) = modes[j];
            zernike(m, n, points[k])
        });
        let pinv = basis
            .clone()
            .pseudo_inverse(SVD_EPS)
            .map_err(|e| PoaError::ShapeMismatch(format!("basis pseudo-inverse failed: {e}")))?;

        Ok(Self {
            points: points.to_vec(),
            basis,
            pinv,
        })
    }

    /// Number of coefficients solved for.
    pub fn order(&self) -> usize {
        self.basis.ncols()
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    /// The `J × N` pseudo-inverse of the basis.
    pub fn pseudo_inverse(&self) -> &DMatrix<Complex<f64>> {
        &self.pinv
    }

    /// Fit coefficients to one error vector per point (`e_k = ex + i·ey`).
    pub fn solve_for(&self, errors: &[Vec2]) -> Result<Vec<Complex<f64>>> {
        if errors.len() != self.points.len() {
            return Err(PoaError::ShapeMismatch(format!(
                "expecting {} error vectors (got {} instead)",
                self.points.len(),
                errors.len()
            )));
        }

        let b = DVector::from_iterator(
            errors.len(),
            errors.iter().map(|e| Complex::new(e.x, e.y)),
        );
        let coeffs = &self.pinv * &b;

        let residual = (&self.basis * &coeffs - &b).norm();
        debug!(
            "Zernike fit: J={}, N={}, residual norm {:.3e}",
            self.order(),
            self.points.len(),
            residual
        );

        Ok(coeffs.iter().copied().collect())
    }
}
