//! Optical model: the transform chains of the instrument.
//!
//! Two chains share their children:
//!
//! - the **pointing chain** `GCU alignment → arm pointing → NGSS alignment`,
//!   whose `backward` is where a commanded field point really lands;
//! - the **image chain** `GCU alignment → pick-off`, mapping the field into
//!   the pick-off frame for the arm's current joint angles.
//!
//! Lifecycle events are applied once per distinct child, so the alignment
//! offsets shared by both chains are drawn only once.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use nalgebra::Complex;
use rand::RngCore;
use tracing::debug;

use crate::arm::{ArmModel, ArmTransform, JointAngles, PointingTransform};
use crate::config::Configuration;
use crate::error::{PoaError, Result};
use crate::transform::{
    shared, CompositeTransform, LifecycleEvent, OffsetTransform, SharedTransform, Transform,
    GCU_ALIGNMENT, NGSS_ALIGNMENT,
};

/// Default pick-off magnification.
pub const DEFAULT_MAGNIFICATION: f64 = 1.0;

fn lock_read<T>(h: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    h.read().unwrap_or_else(PoisonError::into_inner)
}

fn lock_write<T>(h: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    h.write().unwrap_or_else(PoisonError::into_inner)
}

/// Instrument model assembled from configuration.
#[derive(Debug)]
pub struct OpticalModel {
    pointing: Arc<RwLock<PointingTransform>>,
    pick_off: Arc<RwLock<ArmTransform>>,
    gcu_alignment: Arc<RwLock<OffsetTransform>>,
    ngss_alignment: Arc<RwLock<OffsetTransform>>,
    pointing_chain: SharedTransform,
    image_chain: SharedTransform,
}

impl OpticalModel {
    pub fn defaults(config: &mut Configuration) {
        ArmModel::defaults(config);
        OffsetTransform::defaults(config, GCU_ALIGNMENT);
        OffsetTransform::defaults(config, NGSS_ALIGNMENT);
        config.set_default("poa.magnification", DEFAULT_MAGNIFICATION);
    }

    pub fn from_config(config: &Configuration) -> Result<Self> {
        let arm = ArmModel::from_config(config)?;
        let r = arm.nominal_radius();
        let magnification = config.get_f64("poa.magnification")?;
        if !(magnification > 0.0 && magnification.is_finite()) {
            return Err(PoaError::Config(format!(
                "key `poa.magnification` must be positive, got {magnification}"
            )));
        }

        let pointing = Arc::new(RwLock::new(PointingTransform::new(arm)));
        let pick_off = Arc::new(RwLock::new(ArmTransform::new(r, r, magnification)));
        let gcu_alignment = Arc::new(RwLock::new(OffsetTransform::from_config(
            config,
            GCU_ALIGNMENT,
        )?));
        let ngss_alignment = Arc::new(RwLock::new(OffsetTransform::from_config(
            config,
            NGSS_ALIGNMENT,
        )?));

        let mut chain = CompositeTransform::new();
        chain.push_back(gcu_alignment.clone());
        chain.push_back(pointing.clone());
        chain.push_back(ngss_alignment.clone());
        let pointing_chain = shared(chain);

        let mut chain = CompositeTransform::new();
        chain.push_back(gcu_alignment.clone());
        chain.push_back(pick_off.clone());
        let image_chain = shared(chain);

        Ok(Self {
            pointing,
            pick_off,
            gcu_alignment,
            ngss_alignment,
            pointing_chain,
            image_chain,
        })
    }

    /// Nominal arm link length `R` (m).
    pub fn radius(&self) -> f64 {
        lock_read(&self.pointing).model().nominal_radius()
    }

    /// Snapshot of the arm model.
    pub fn arm(&self) -> ArmModel {
        lock_read(&self.pointing).model().clone()
    }

    /// The pointing chain.
    pub fn pointing_transform(&self) -> SharedTransform {
        self.pointing_chain.clone()
    }

    /// The image chain.
    pub fn transform(&self) -> SharedTransform {
        self.image_chain.clone()
    }

    /// Install (or clear) the Zernike correction of the arm controller.
    pub fn set_pointing_model(&self, coefficients: Option<Vec<Complex<f64>>>) {
        lock_write(&self.pointing)
            .model_mut()
            .set_error_model(coefficients);
    }

    /// Park the pick-off at the given joint angles.
    pub fn move_to(&self, angles: JointAngles) {
        lock_write(&self.pick_off).set_axis_angles(angles);
    }

    /// Propagate a lifecycle event to every stateful component.
    pub fn generate(&self, event: LifecycleEvent, rng: &mut dyn RngCore) {
        lock_write(&self.gcu_alignment).generate(event, rng);
        lock_write(&self.pointing).generate(event, rng);
        lock_write(&self.ngss_alignment).generate(event, rng);
        debug!("Optical model: {:?} event applied", event);
    }
}
