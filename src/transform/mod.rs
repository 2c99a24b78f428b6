//! Bidirectional 2-D transforms and their composition.
//!
//! A [`Transform`] maps a field point forward (object → image) and backward
//! (image → object). Every transform that is locally invertible satisfies
//! `backward(forward(p)) ≈ p`.
//!
//! Transforms may carry random state that is redrawn at lifecycle events:
//!
//! - [`LifecycleEvent::Manufacture`]: tolerances fixed once per built unit
//!   (arm radius, alignment offsets);
//! - [`LifecycleEvent::Session`]: state fixed once per observing session
//!   (encoder zero offsets).
//!
//! Chains are built with [`CompositeTransform`], whose children are
//! [`SharedTransform`] handles. The same child can sit in several chains;
//! a change made through any handle is seen by all of them.
//!
//! # Transforms
//!
//! - [`IdentityTransform`]
//! - [`OffsetTransform`]: fixed alignment offset drawn at manufacture
//! - [`SampledTransform`]: bilinear interpolation of a displacement grid
//! - [`ZernikeTransform`]: complex Zernike displacement model
//! - [`ArmTransform`](crate::arm::ArmTransform) and
//!   [`PointingTransform`](crate::arm::PointingTransform) live in [`crate::arm`]

mod composite;
mod offset;
mod sampled;
mod zernike;

pub use composite::CompositeTransform;
pub use offset::{OffsetTransform, GCU_ALIGNMENT, NGSS_ALIGNMENT};
pub use sampled::SampledTransform;
pub use zernike::ZernikeTransform;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::RngCore;

use crate::{Matrix2, Vec2};

/// Default finite-difference step for Jacobians, in field units (m).
pub const DEFAULT_JACOBIAN_STEP: f64 = 1e-6;

/// Events that trigger a redraw of a transform's random state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A new unit is built: manufacturing tolerances are drawn.
    Manufacture,
    /// A new observing session starts on the same unit.
    Session,
}

/// Bidirectional mapping of field points.
///
/// Single-point operations default to the identity; batch operations and
/// Jacobians default to the single-point ones. Implementations overriding
/// the batch methods must return exactly what the per-point methods would.
pub trait Transform: Send + Sync + fmt::Debug {
    fn forward(&self, p: Vec2) -> Vec2 {
        p
    }

    fn backward(&self, p: Vec2) -> Vec2 {
        p
    }

    fn forward_batch(&self, points: &[Vec2]) -> Vec<Vec2> {
        points.iter().map(|&p| self.forward(p)).collect()
    }

    fn backward_batch(&self, points: &[Vec2]) -> Vec<Vec2> {
        points.iter().map(|&p| self.backward(p)).collect()
    }

    /// Jacobian of [`forward`](Transform::forward) by central differences.
    fn forward_jacobian(&self, p: Vec2, step: f64) -> Matrix2 {
        central_difference(|q| self.forward(q), p, step)
    }

    /// Jacobian of [`backward`](Transform::backward) by central differences.
    fn backward_jacobian(&self, p: Vec2, step: f64) -> Matrix2 {
        central_difference(|q| self.backward(q), p, step)
    }

    /// Redraw random state for a lifecycle event.
    fn generate(&mut self, _event: LifecycleEvent, _rng: &mut dyn RngCore) {}

    /// Short name used in log messages.
    fn describe(&self) -> String;
}

/// Shared, lockable handle to a transform living in one or more chains.
pub type SharedTransform = Arc<RwLock<dyn Transform>>;

/// Wrap a transform in a [`SharedTransform`] handle.
pub fn shared<T: Transform + 'static>(transform: T) -> SharedTransform {
    Arc::new(RwLock::new(transform))
}

/// Read access to a shared transform.
///
/// A panic in another thread while holding the lock cannot leave a transform
/// half-updated in a way that matters for evaluation, so poisoning is ignored.
pub fn read(t: &SharedTransform) -> RwLockReadGuard<'_, dyn Transform + 'static> {
    t.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write access to a shared transform.
pub fn write(t: &SharedTransform) -> RwLockWriteGuard<'_, dyn Transform + 'static> {
    t.write().unwrap_or_else(PoisonError::into_inner)
}

/// Jacobian of `f` at `p` by central finite differences.
pub fn central_difference<F>(f: F, p: Vec2, step: f64) -> Matrix2
where
    F: Fn(Vec2) -> Vec2,
{
    let hx = Vec2::new(step, 0.0);
    let hy = Vec2::new(0.0, step);
    let dfdx = (f(p + hx) - f(p - hx)) / (2.0 * step);
    let dfdy = (f(p + hy) - f(p - hy)) / (2.0 * step);
    Matrix2::from_columns(&[dfdx, dfdy])
}

/// The identity mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl Transform for IdentityTransform {
    fn describe(&self) -> String {
        "identity".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Affine {
        m: Matrix2,
        t: Vec2,
    }

    impl Transform for Affine {
        fn forward(&self, p: Vec2) -> Vec2 {
            self.m * p + self.t
        }

        fn backward(&self, p: Vec2) -> Vec2 {
            self.m.try_inverse().unwrap() * (p - self.t)
        }

        fn describe(&self) -> String {
            "affine".into()
        }
    }

    #[test]
    fn test_identity() {
        let p = Vec2::new(0.1, -0.2);
        assert_eq!(IdentityTransform.forward(p), p);
        assert_eq!(IdentityTransform.backward(p), p);
        let j = IdentityTransform.forward_jacobian(p, DEFAULT_JACOBIAN_STEP);
        assert!((j - Matrix2::identity()).norm() < 1e-9);
    }

    #[test]
    fn test_default_batch_matches_single() {
        let t = Affine {
            m: Matrix2::new(1.0, 0.1, -0.2, 0.9),
            t: Vec2::new(1e-3, -2e-3),
        };
        let pts: Vec<Vec2> = (0..10)
            .map(|i| Vec2::new(i as f64 * 0.01, -(i as f64) * 0.02))
            .collect();
        let fwd = t.forward_batch(&pts);
        for (p, f) in pts.iter().zip(&fwd) {
            assert_eq!(t.forward(*p), *f);
            assert!((t.backward(*f) - p).norm() < 1e-12);
        }
    }

    #[test]
    fn test_jacobian_of_affine() {
        let m = Matrix2::new(1.0, 0.1, -0.2, 0.9);
        let t = Affine {
            m,
            t: Vec2::new(0.5, 0.5),
        };
        let j = t.forward_jacobian(Vec2::new(0.03, 0.04), 1e-4);
        assert!((j - m).norm() < 1e-9, "jacobian = {j}");
        let jb = t.backward_jacobian(Vec2::new(0.03, 0.04), 1e-4);
        assert!((jb * m - Matrix2::identity()).norm() < 1e-9);
    }
}
