//! # poacal
//!
//! Simulation and calibration of the **pointing error of a two-link pick-off
//! arm** (POA) in an optical instrument.
//!
//! Light from a reference mask of pinholes on a regular lattice (the GCU
//! mask) is picked off by a rotating two-joint arm. The arm is commanded
//! with nominal kinematics, but its real link length, encoder quantization
//! and instrument misalignments make it land slightly off target. This crate
//! simulates that mechanism, samples the resulting error over the field,
//! fits a complex Zernike correction from a handful of calibration points,
//! and measures the residual error once the correction is installed.
//!
//! ## Features
//!
//! - **Unit-aware random quantities**: descriptors such as
//!   `"0.2 +/- 1e-6 m (flat)"` with Gaussian, uniform, degenerate or
//!   tabulated distributions
//! - **Composable transforms**: shared, lockable 2-D mappings chained into
//!   the instrument's pointing and image paths
//! - **Tiled field sampler**: oversampled integration over a rectangular
//!   field with an optional circular cut, fanned out over a rayon pool
//! - **Complex Zernike fit**: least-squares coefficients from measured error
//!   vectors via SVD
//! - **Calibration strategies**: random, spiral and ring-optimal point
//!   selection behind a registry, plus timed arm paths through the points
//!
//! ## Example
//!
//! ```no_run
//! use poacal::{Calibration, Configuration};
//!
//! let mut config = Configuration::new();
//! config.set("poa.radius", "0.2 +/- 1e-4 m (flat)");
//! config.set("cal.seed", 42i64);
//!
//! let mut cal = Calibration::new(&config)?;
//! cal.manufacture();
//! cal.start_session()?;
//!
//! let points = cal.generate_points("ring", 0.9)?;
//! let coefficients = cal.calibrate(&points)?;
//! cal.apply_pointing_model()?;
//! let residual = cal.verify()?;
//! println!(
//!     "{} coefficients, residual RMS {:.3e} m",
//!     coefficients.len(),
//!     residual.mse.sqrt()
//! );
//! # Ok::<(), poacal::PoaError>(())
//! ```
//!
//! ## Pipeline
//!
//! 1. **Manufacture / session**: lifecycle events redraw the arm radius,
//!    alignment offsets and encoder zero points
//! 2. **Measure**: the pointing chain is evaluated at the calibration points,
//!    giving one error vector per point
//! 3. **Fit**: the vectors, as complex numbers, are fitted with `J` Zernike
//!    polynomials over coordinates normalized by the arm radius
//! 4. **Correct**: the fit is installed in the arm controller, which offsets
//!    every commanded position before inverse kinematics
//! 5. **Verify**: the field sampler maps the residual squared error
//!

pub mod arm;
pub mod calibration;
pub mod config;
pub mod error;
pub mod mask;
pub mod optics;
pub mod quantity;
pub mod sampler;
pub mod transform;
pub mod zernike;

pub use arm::{ArmModel, JointAngles};
pub use calibration::{
    Calibration, CalibrationPath, CalibrationStage, CalibrationStrategy, CoefficientStats,
    PathOptions, Residual, StrategyRegistry,
};
pub use config::{ConfigValue, Configuration};
pub use error::{PoaError, Result};
pub use mask::GcuMask;
pub use optics::OpticalModel;
pub use quantity::GenerativeQuantity;
pub use sampler::{DetectorGeometry, ErrorSampler, ImageSampler, PlaneSampler, SamplingGeometry};
pub use transform::{CompositeTransform, LifecycleEvent, SharedTransform, Transform};
pub use zernike::{ComplexZernike, ZernikeSolver};

// Field coordinates are in meters; 64-bit throughout since pointing errors
// are several orders of magnitude below the field size.
pub type Vec2 = nalgebra::Vector2<f64>;
pub type Matrix2 = nalgebra::Matrix2<f64>;
