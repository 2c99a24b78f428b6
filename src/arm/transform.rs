//! Transforms built on the arm kinematics.

use rand::RngCore;

use crate::transform::{LifecycleEvent, Transform};
use crate::{Matrix2, Vec2};

use super::model::{rotation, ArmModel, JointAngles};

/// Geometry of the pick-off for fixed joint angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmState {
    pub angles: JointAngles,
    /// Rotation of the pick-off by `φ − θ`.
    pub rotation: Matrix2,
    /// Field position of the pick-off center.
    pub center: Vec2,
}

impl ArmState {
    pub fn new(angles: JointAngles, field_radius: f64, arm_radius: f64) -> Self {
        let rot_angle = angles.rotation_angle();
        let center = Vec2::new(
            field_radius * angles.theta.cos() - arm_radius * rot_angle.cos(),
            field_radius * angles.theta.sin() + arm_radius * rot_angle.sin(),
        );
        Self {
            angles,
            rotation: rotation(rot_angle),
            center,
        }
    }
}

/// Field-to-pick-off transform for an arm parked at fixed angles.
///
/// `forward(p) = rot · (p − center) / magnification`,
/// `backward(p) = rotᵀ · (p · magnification) + center`.
#[derive(Debug, Clone)]
pub struct ArmTransform {
    field_radius: f64,
    arm_radius: f64,
    magnification: f64,
    state: ArmState,
}

impl ArmTransform {
    pub fn new(field_radius: f64, arm_radius: f64, magnification: f64) -> Self {
        Self {
            field_radius,
            arm_radius,
            magnification,
            state: ArmState::new(JointAngles::default(), field_radius, arm_radius),
        }
    }

    /// Move the arm; the rotation and center are recomputed.
    pub fn set_axis_angles(&mut self, angles: JointAngles) {
        self.state = ArmState::new(angles, self.field_radius, self.arm_radius);
    }

    pub fn state(&self) -> &ArmState {
        &self.state
    }
}

impl Transform for ArmTransform {
    fn forward(&self, p: Vec2) -> Vec2 {
        self.state.rotation * (p - self.state.center) / self.magnification
    }

    fn backward(&self, p: Vec2) -> Vec2 {
        self.state.rotation.transpose() * (p * self.magnification) + self.state.center
    }

    fn describe(&self) -> String {
        format!(
            "arm(theta={:.4}, phi={:.4})",
            self.state.angles.theta, self.state.angles.phi
        )
    }
}

/// Iterations of the fixed-point inverse in [`PointingTransform::forward`].
pub const POINTING_INVERSE_ITERATIONS: usize = 20;
/// Convergence threshold of the fixed-point inverse (m).
pub const POINTING_INVERSE_TOLERANCE: f64 = 1e-12;

/// Pointing of the real arm.
///
/// `backward(p)` is where the arm actually ends up when commanded to `p`
/// ([`ArmModel::model_xy`], noisy). `forward` inverts it by fixed-point
/// iteration: the command is nudged by the remaining miss until the
/// realized position matches. Noise keeps the inverse approximate and it is
/// not guaranteed to converge for strongly distorted models.
#[derive(Debug, Clone)]
pub struct PointingTransform {
    model: ArmModel,
    mirror: bool,
}

impl PointingTransform {
    pub fn new(model: ArmModel) -> Self {
        Self {
            model,
            mirror: false,
        }
    }

    /// Use the mirrored (elbow-reversed) arm configuration.
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn model(&self) -> &ArmModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut ArmModel {
        &mut self.model
    }

    pub fn mirror(&self) -> bool {
        self.mirror
    }
}

impl Transform for PointingTransform {
    fn forward(&self, p: Vec2) -> Vec2 {
        let mut command = p;
        for _ in 0..POINTING_INVERSE_ITERATIONS {
            let miss = p - self.backward(command);
            if !miss.x.is_finite() || !miss.y.is_finite() {
                return Vec2::new(f64::NAN, f64::NAN);
            }
            command += miss;
            if miss.norm() < POINTING_INVERSE_TOLERANCE {
                break;
            }
        }
        command
    }

    fn backward(&self, p: Vec2) -> Vec2 {
        self.model.model_xy(p, self.mirror, &mut rand::rng())
    }

    fn generate(&mut self, event: LifecycleEvent, rng: &mut dyn RngCore) {
        self.model.generate(event, rng);
    }

    fn describe(&self) -> String {
        format!("pointing(R={:.6} m)", self.model.nominal_radius())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::Axis;
    use crate::config::Configuration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_arm_transform_inverts() {
        let mut t = ArmTransform::new(0.2, 0.2, 2.0);
        t.set_axis_angles(JointAngles::new(0.3, 1.1));
        let p = Vec2::new(0.05, -0.02);
        assert!((t.backward(t.forward(p)) - p).norm() < 1e-14);
        assert!((t.forward(t.backward(p)) - p).norm() < 1e-14);
        // the pick-off center maps to the origin
        assert!(t.forward(t.state().center).norm() < 1e-15);
    }

    #[test]
    fn test_arm_state_geometry() {
        let s = ArmState::new(JointAngles::new(0.0, FRAC_PI_2), 0.2, 0.2);
        // theta = 0, rotation π/2: center at (0.2 − 0, 0 + 0.2)
        assert!((s.center - Vec2::new(0.2, 0.2)).norm() < 1e-15);
        assert!((s.rotation * Vec2::new(1.0, 0.0) - Vec2::new(0.0, 1.0)).norm() < 1e-15);
    }

    fn exact_pointing() -> PointingTransform {
        let mut cfg = Configuration::new();
        cfg.set("poa.radius", "0.2 m");
        cfg.set("poa.arm_instability", "0 m");
        for axis in Axis::ALL {
            cfg.set(&format!("poa.encoder[{axis}].bits"), 0i64);
            cfg.set(&format!("poa.encoder[{axis}].error"), "0 rad");
        }
        ArmModel::defaults(&mut cfg);
        PointingTransform::new(ArmModel::from_config(&cfg).unwrap())
    }

    #[test]
    fn test_pointing_is_identity_without_errors() {
        let t = exact_pointing();
        let p = Vec2::new(0.05, 0.03);
        assert!((t.backward(p) - p).norm() < 1e-9);
        assert!((t.forward(p) - p).norm() < 1e-9);
    }

    #[test]
    fn test_pointing_inverse_with_radius_error() {
        let mut cfg = Configuration::new();
        cfg.set("poa.radius", "0.2 +/- 1e-4 m (flat)");
        cfg.set("poa.arm_instability", "0 m");
        for axis in Axis::ALL {
            cfg.set(&format!("poa.encoder[{axis}].bits"), 0i64);
            cfg.set(&format!("poa.encoder[{axis}].error"), "0 rad");
        }
        ArmModel::defaults(&mut cfg);
        let mut t = PointingTransform::new(ArmModel::from_config(&cfg).unwrap());
        let mut rng = StdRng::seed_from_u64(8);
        t.generate(LifecycleEvent::Manufacture, &mut rng);
        assert_ne!(t.model().manufactured_radius(), 0.2);

        let p = Vec2::new(0.1, 0.07);
        let miss = (t.backward(p) - p).norm();
        assert!(miss > 1e-7, "radius error should move the arm, miss {miss}");
        let q = t.forward(p);
        assert!((t.backward(q) - p).norm() < 1e-10);
    }
}
