//! Error taxonomy shared by every module of the crate.
//!
//! Errors fall into four groups:
//!
//! - **malformed input**: bad quantity descriptors, wrong point-matrix shapes,
//!   basis/error dimension mismatches, bad configuration values;
//! - **domain errors**: unreachable arm geometry, too few calibration points,
//!   calibration stages invoked out of order;
//! - **registry errors**: duplicate or unknown calibration strategies;
//! - **infrastructure**: worker pool creation, configuration persistence and
//!   image output.
//!
//! Nothing is retried: every operation is a local computation.

use thiserror::Error;

/// Errors produced by the pointing model and calibration pipeline.
#[derive(Debug, Error)]
pub enum PoaError {
    #[error("invalid quantity descriptor `{0}`")]
    ParseQuantity(String),

    #[error("unsupported distribution `{0}`")]
    UnsupportedDistribution(String),

    #[error("unknown unit `{0}`")]
    UnknownUnit(String),

    #[error("cannot convert `{from}` to `{to}`")]
    IncompatibleUnits { from: String, to: String },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("point ({x:.6}, {y:.6}) is outside the arm reach (radius {reach:.6})")]
    Unreachable { x: f64, y: f64, reach: f64 },

    #[error("too few points: {needed} required, {available} available")]
    TooFewPoints { needed: usize, available: usize },

    #[error("calibration stage error: cannot {action} while {stage}")]
    InvalidStage { action: &'static str, stage: String },

    #[error("verification point ({x:.6}, {y:.6}) was used in the fit")]
    FitPointReused { x: f64, y: f64 },

    #[error("strategy `{0}` is already registered")]
    AlreadyRegistered(String),

    #[error("unknown calibration strategy `{0}`")]
    UnknownStrategy(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PoaError>;
