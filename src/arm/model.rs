//! Kinematic model of the two-link pick-off arm.
//!
//! The arm has two links of equal length `R`. The first joint (θ) sits at
//! the field center; the second (φ) at the elbow. Commanding the arm to a
//! field point `p` works in two halves:
//!
//! 1. **nominal inverse kinematics**: the control system converts `p` into
//!    joint angles using the nominal radius (law of cosines);
//! 2. **realized forward kinematics**: the encoders quantize the angles and
//!    the real arm, built with a slightly different radius and subject to
//!    flexure and positioning noise, ends up somewhere near `p`.
//!
//! The difference between `p` and the realized position is the pointing
//! error that the calibration tries to model.

use std::f64::consts::TAU;

use nalgebra::Complex;
use rand::Rng;
use tracing::debug;

use crate::config::Configuration;
use crate::error::{PoaError, Result};
use crate::quantity::{Dimension, GenerativeQuantity};
use crate::transform::{LifecycleEvent, Transform, ZernikeTransform};
use crate::{Matrix2, Vec2};

use super::encoder::{Axis, Encoder};
use super::motion::MotionConfig;

/// Default arm link length.
pub const DEFAULT_RADIUS: &str = "0.2 +/- 1e-6 m (flat)";
/// Default per-sample link length instability.
pub const DEFAULT_ARM_INSTABILITY: &str = "0.0 +/- 1e-6 m (gauss)";
/// Default per-sample positioning error magnitude.
pub const DEFAULT_POSITION_ERROR: &str = "0.0 +/- 0 m (gauss)";

/// Cosines within this distance of ±1 are clamped instead of rejected.
const COS_TOLERANCE: f64 = 1e-12;

/// Joint angles of the arm (radians).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointAngles {
    pub theta: f64,
    pub phi: f64,
}

impl JointAngles {
    pub fn new(theta: f64, phi: f64) -> Self {
        Self { theta, phi }
    }

    /// Rotation angle of the pick-off relative to the field (`φ − θ`).
    pub fn rotation_angle(&self) -> f64 {
        self.phi - self.theta
    }

    pub fn is_finite(&self) -> bool {
        self.theta.is_finite() && self.phi.is_finite()
    }
}

/// Per-point rotation blocks for a batch of joint angles.
///
/// Logically a block-diagonal `2N × 2N` matrix with one `2×2` rotation by
/// `φ − θ` per point; only the blocks are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRotations {
    blocks: Vec<Matrix2>,
}

impl BlockRotations {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, i: usize) -> &Matrix2 {
        &self.blocks[i]
    }

    pub fn blocks(&self) -> &[Matrix2] {
        &self.blocks
    }

    /// Rotate `v` by the `i`-th block.
    pub fn apply(&self, i: usize, v: Vec2) -> Vec2 {
        self.blocks[i] * v
    }

    /// Multiply the whole block-diagonal matrix by a stacked vector.
    pub fn apply_all(&self, v: &[Vec2]) -> Result<Vec<Vec2>> {
        if v.len() != self.blocks.len() {
            return Err(PoaError::ShapeMismatch(format!(
                "{} vectors for {} rotation blocks",
                v.len(),
                self.blocks.len()
            )));
        }
        Ok(self.blocks.iter().zip(v).map(|(m, p)| m * p).collect())
    }
}

/// Rotation matrix by `angle`.
pub fn rotation(angle: f64) -> Matrix2 {
    let (s, c) = angle.sin_cos();
    Matrix2::new(c, -s, s, c)
}

/// Two-link arm with manufacturing tolerances, encoder quantization and
/// per-sample noise.
#[derive(Debug, Clone)]
pub struct ArmModel {
    radius: GenerativeQuantity,
    instability: GenerativeQuantity,
    position_error: GenerativeQuantity,
    encoders: [Encoder; 2],
    motion: MotionConfig,
    /// Nominal link length, used by the control system.
    nominal_radius: f64,
    /// Link length actually delivered by the manufacturer.
    manufactured_radius: f64,
    corrective: Option<ZernikeTransform>,
}

impl ArmModel {
    /// Seed every `poa.*` key with its default.
    pub fn defaults(config: &mut Configuration) {
        for axis in Axis::ALL {
            Encoder::defaults(config, axis);
        }
        config.set_default("poa.radius", DEFAULT_RADIUS);
        config.set_default("poa.arm_instability", DEFAULT_ARM_INSTABILITY);
        config.set_default("poa.position_error", DEFAULT_POSITION_ERROR);
        MotionConfig::defaults(config);
    }

    /// Build the model. The arm starts out with its nominal radius until the
    /// first [`LifecycleEvent::Manufacture`].
    pub fn from_config(config: &Configuration) -> Result<Self> {
        let radius = config.get_si_quantity("poa.radius", Dimension::Length)?;
        let nominal_radius = radius.value();
        if !(nominal_radius > 0.0) {
            return Err(PoaError::Config(format!(
                "`poa.radius` must be positive, got {nominal_radius} m"
            )));
        }
        Ok(Self {
            instability: config.get_si_quantity("poa.arm_instability", Dimension::Length)?,
            position_error: config.get_si_quantity("poa.position_error", Dimension::Length)?,
            encoders: [
                Encoder::from_config(config, Axis::Theta)?,
                Encoder::from_config(config, Axis::Phi)?,
            ],
            motion: MotionConfig::from_config(config)?,
            nominal_radius,
            manufactured_radius: nominal_radius,
            radius,
            corrective: None,
        })
    }

    /// Nominal link length `R` (m).
    pub fn nominal_radius(&self) -> f64 {
        self.nominal_radius
    }

    /// Manufactured link length (m).
    pub fn manufactured_radius(&self) -> f64 {
        self.manufactured_radius
    }

    /// Farthest reachable distance from the field center (`2R`).
    pub fn reach(&self) -> f64 {
        2.0 * self.nominal_radius
    }

    pub fn encoder(&self, axis: Axis) -> &Encoder {
        match axis {
            Axis::Theta => &self.encoders[0],
            Axis::Phi => &self.encoders[1],
        }
    }

    pub fn motion(&self) -> &MotionConfig {
        &self.motion
    }

    /// Install (or remove) a Zernike correction applied to every commanded
    /// position before inverse kinematics.
    ///
    /// Coefficients are in meters, over coordinates normalized by the
    /// nominal radius.
    pub fn set_error_model(&mut self, coefficients: Option<Vec<Complex<f64>>>) {
        self.corrective =
            coefficients.map(|c| ZernikeTransform::new(c, self.nominal_radius));
    }

    pub fn error_model(&self) -> Option<&ZernikeTransform> {
        self.corrective.as_ref()
    }

    /// Redraw random state. `Manufacture` draws the link length and starts a
    /// new session; `Session` redraws the encoder zero offsets.
    pub fn generate<R: Rng + ?Sized>(&mut self, event: LifecycleEvent, rng: &mut R) {
        if event == LifecycleEvent::Manufacture {
            self.manufactured_radius = self.radius.sample(rng);
            debug!(
                "Arm manufactured: R = {:.9} m (nominal {:.9} m)",
                self.manufactured_radius, self.nominal_radius
            );
        }
        for enc in &mut self.encoders {
            enc.start_session(rng);
        }
        debug!(
            "Arm session: encoder offsets theta={:.3e} rad, phi={:.3e} rad",
            self.encoders[0].session_offset(),
            self.encoders[1].session_offset()
        );
    }

    // ── Nominal kinematics ──────────────────────────────────────────────

    /// Joint angles that place the arm at `p`, or `Unreachable` if `p` is
    /// beyond `2R`.
    pub fn try_xy_to_theta_phi(&self, p: Vec2, mirror: bool) -> Result<JointAngles> {
        let r = self.nominal_radius;
        let rho2 = p.norm_squared();
        let mut cos_phi = 1.0 - 0.5 * rho2 / (r * r);
        if cos_phi < -1.0 - COS_TOLERANCE {
            return Err(PoaError::Unreachable {
                x: p.x,
                y: p.y,
                reach: self.reach(),
            });
        }
        cos_phi = cos_phi.max(-1.0);

        let sign = if mirror { -1.0 } else { 1.0 };
        let phi = sign * cos_phi.acos();
        let alpha = p.y.atan2(p.x);
        let beta = phi.sin().atan2(1.0 - cos_phi);
        Ok(JointAngles::new(alpha - beta, phi))
    }

    /// Like [`try_xy_to_theta_phi`](Self::try_xy_to_theta_phi), but returns
    /// NaN angles for unreachable points.
    pub fn xy_to_theta_phi(&self, p: Vec2, mirror: bool) -> JointAngles {
        self.try_xy_to_theta_phi(p, mirror)
            .unwrap_or(JointAngles::new(f64::NAN, f64::NAN))
    }

    pub fn xy_to_theta_phi_batch(&self, points: &[Vec2], mirror: bool) -> Vec<JointAngles> {
        points
            .iter()
            .map(|&p| self.xy_to_theta_phi(p, mirror))
            .collect()
    }

    /// Nominal forward kinematics.
    pub fn xy_from_theta_phi(&self, angles: JointAngles) -> Vec2 {
        let r = self.nominal_radius;
        let diff = angles.rotation_angle();
        Vec2::new(
            r * (angles.theta.cos() - diff.cos()),
            r * (angles.theta.sin() + diff.sin()),
        )
    }

    pub fn xy_from_theta_phi_batch(&self, angles: &[JointAngles]) -> Vec<Vec2> {
        angles.iter().map(|&a| self.xy_from_theta_phi(a)).collect()
    }

    /// Pick-off rotation of every point of a batch.
    pub fn rotations_from_theta_phi(&self, angles: &[JointAngles]) -> BlockRotations {
        BlockRotations {
            blocks: angles.iter().map(|a| rotation(a.rotation_angle())).collect(),
        }
    }

    // ── Realized kinematics ─────────────────────────────────────────────

    /// Angles reported by the encoders for commanded `angles`.
    pub fn model_theta_phi<R: Rng + ?Sized>(&self, angles: JointAngles, rng: &mut R) -> JointAngles {
        JointAngles::new(
            self.encoders[0].read(angles.theta, rng),
            self.encoders[1].read(angles.phi, rng),
        )
    }

    /// Position actually reached for commanded `angles`.
    pub fn model_xy_from_theta_phi<R: Rng + ?Sized>(&self, angles: JointAngles, rng: &mut R) -> Vec2 {
        let q = self.model_theta_phi(angles, rng);
        let diff = q.rotation_angle();
        let m_r = self.manufactured_radius;
        let r_elbow = m_r + self.instability.sample(rng);
        let mut p = Vec2::new(
            m_r * q.theta.cos() - r_elbow * diff.cos(),
            m_r * q.theta.sin() + r_elbow * diff.sin(),
        );

        // Direction drawn over [0, 2π) so the error has no preferred axis
        let magnitude = self.position_error.sample(rng);
        if magnitude != 0.0 {
            let direction = TAU * rng.random::<f64>();
            p += magnitude * Vec2::new(direction.cos(), direction.sin());
        }
        p
    }

    /// Position actually reached when the arm is commanded to `p`.
    ///
    /// Unreachable commands yield NaN coordinates.
    pub fn model_xy<R: Rng + ?Sized>(&self, p: Vec2, mirror: bool, rng: &mut R) -> Vec2 {
        let target = match &self.corrective {
            Some(c) => c.forward(p),
            None => p,
        };
        let angles = self.xy_to_theta_phi(target, mirror);
        if !angles.is_finite() {
            return Vec2::new(f64::NAN, f64::NAN);
        }
        self.model_xy_from_theta_phi(angles, rng)
    }
}
