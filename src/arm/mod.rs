//! Two-link pick-off arm: kinematics, encoders and motion.
//!
//! - [`ArmModel`]: nominal and realized kinematics with manufacturing
//!   tolerances and per-sample noise
//! - [`Encoder`]: per-joint angle quantization
//! - [`trapezoidal_move`]: time-parameterized single-axis moves
//! - [`ArmTransform`] / [`PointingTransform`]: the arm as a [`Transform`](crate::transform::Transform)

mod encoder;
mod model;
mod motion;
mod transform;

pub use encoder::{
    encoder_key, Axis, Encoder, DEFAULT_ENCODER_BITS, DEFAULT_ENCODER_ERROR,
    DEFAULT_QUANTIZATION_ERROR, DEFAULT_SESSION_OFFSET,
};
pub use model::{
    rotation, ArmModel, BlockRotations, JointAngles, DEFAULT_ARM_INSTABILITY,
    DEFAULT_POSITION_ERROR, DEFAULT_RADIUS,
};
pub use motion::{
    shortest_delta, trapezoidal_move, AxisLimits, MotionConfig, MotionProfile,
    DEFAULT_AXIS_ACCELERATION, DEFAULT_AXIS_SPEED, DEFAULT_MOTION_DT,
};
pub use transform::{
    ArmState, ArmTransform, PointingTransform, POINTING_INVERSE_ITERATIONS,
    POINTING_INVERSE_TOLERANCE,
};
