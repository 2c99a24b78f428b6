//! Calibration of the arm pointing error.
//!
//! A [`Calibration`] drives one simulated instrument through
//! manufacture → session → measurement → fit → correction → verification.
//! Where to measure is decided by a [`CalibrationStrategy`] picked by name
//! from a [`StrategyRegistry`]; [`plan_path`] turns a point list into a
//! timed arm trajectory.

#[allow(clippy::module_inception)]
mod calibration;
mod path;
mod random;
mod ring;
mod spiral;
mod strategy;

pub use calibration::{
    Calibration, CalibrationStage, CoefficientStats, Residual, DEFAULT_MAP_SIZE,
    DEFAULT_MAP_STEP, DEFAULT_ORDER, DEFAULT_STRATEGY,
};
pub use path::{nearest_neighbour_order, plan_path, CalibrationPath, DistanceNorm, PathOptions};
pub use random::RandomStrategy;
pub use ring::RingStrategy;
pub use spiral::SpiralStrategy;
pub use strategy::{
    factory, point_count, strategy_defaults, CalibrationStrategy, StrategyFactory,
    StrategyRegistry, DEFAULT_POINT_COUNT,
};
