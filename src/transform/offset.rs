use rand::RngCore;
use tracing::debug;

use super::{LifecycleEvent, Transform};
use crate::config::Configuration;
use crate::error::Result;
use crate::quantity::{Dimension, GenerativeQuantity, Unit};
use crate::Vec2;

/// Configuration prefix of the GCU alignment offset.
pub const GCU_ALIGNMENT: &str = "gcu_alignment";
/// Configuration prefix of the NGSS alignment offset.
pub const NGSS_ALIGNMENT: &str = "ngss_alignment";

/// Constant translation of the field, drawn once per manufactured unit.
///
/// Models an alignment error between two optical subsystems:
/// `forward(p) = p + offset`, `backward(p) = p − offset`.
#[derive(Debug, Clone)]
pub struct OffsetTransform {
    name: String,
    x0: GenerativeQuantity,
    y0: GenerativeQuantity,
    offset: Vec2,
}

impl OffsetTransform {
    /// Seed `<prefix>.x0` and `<prefix>.y0` with a zero offset.
    pub fn defaults(config: &mut Configuration, prefix: &str) {
        config.set_default(&format!("{prefix}.x0"), "0 m");
        config.set_default(&format!("{prefix}.y0"), "0 m");
    }

    /// Build from the `<prefix>.x0` / `<prefix>.y0` quantity descriptors.
    ///
    /// The offset starts at the nominal values until the first
    /// [`LifecycleEvent::Manufacture`].
    pub fn from_config(config: &Configuration, prefix: &str) -> Result<Self> {
        let x0 = config.get_si_quantity(&format!("{prefix}.x0"), Dimension::Length)?;
        let y0 = config.get_si_quantity(&format!("{prefix}.y0"), Dimension::Length)?;
        let offset = Vec2::new(x0.value(), y0.value());
        Ok(Self {
            name: prefix.to_string(),
            x0,
            y0,
            offset,
        })
    }

    /// Offset with no tolerance.
    pub fn fixed(offset: Vec2) -> Self {
        Self {
            name: "offset".into(),
            x0: GenerativeQuantity::fixed(offset.x, Unit::meter()),
            y0: GenerativeQuantity::fixed(offset.y, Unit::meter()),
            offset,
        }
    }

    /// Current offset, in meters.
    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: Vec2) {
        self.offset = offset;
    }
}

impl Transform for OffsetTransform {
    fn forward(&self, p: Vec2) -> Vec2 {
        p + self.offset
    }

    fn backward(&self, p: Vec2) -> Vec2 {
        p - self.offset
    }

    fn generate(&mut self, event: LifecycleEvent, rng: &mut dyn RngCore) {
        if event == LifecycleEvent::Manufacture {
            self.offset = Vec2::new(self.x0.sample(rng), self.y0.sample(rng));
            debug!(
                "{} offset drawn: ({:.3e}, {:.3e}) m",
                self.name, self.offset.x, self.offset.y
            );
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoaError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_defaults_are_zero() {
        let mut cfg = Configuration::new();
        OffsetTransform::defaults(&mut cfg, GCU_ALIGNMENT);
        let mut t = OffsetTransform::from_config(&cfg, GCU_ALIGNMENT).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        t.generate(LifecycleEvent::Manufacture, &mut rng);
        assert_eq!(t.offset(), Vec2::zeros());
        assert_eq!(t.describe(), "gcu_alignment");
    }

    #[test]
    fn test_manufacture_draws_within_tolerance() {
        let mut cfg = Configuration::new();
        cfg.set("ngss_alignment.x0", "1 +/- 0.5 mm (flat)");
        cfg.set("ngss_alignment.y0", "-2 mm");
        let mut t = OffsetTransform::from_config(&cfg, NGSS_ALIGNMENT).unwrap();
        assert!((t.offset() - Vec2::new(1e-3, -2e-3)).norm() < 1e-15);

        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..50 {
            t.generate(LifecycleEvent::Manufacture, &mut rng);
            let o = t.offset();
            assert!((0.5e-3..1.5e-3).contains(&o.x), "x0 = {}", o.x);
            assert!((o.y + 2e-3).abs() < 1e-15);
        }

        // sessions leave the manufactured offset untouched
        let before = t.offset();
        t.generate(LifecycleEvent::Session, &mut rng);
        assert_eq!(t.offset(), before);

        let p = Vec2::new(0.01, 0.02);
        assert!((t.backward(t.forward(p)) - p).norm() < 1e-15);
    }

    #[test]
    fn test_rejects_angles() {
        let mut cfg = Configuration::new();
        cfg.set("gcu_alignment.x0", "1 deg");
        cfg.set("gcu_alignment.y0", "0 m");
        assert!(matches!(
            OffsetTransform::from_config(&cfg, GCU_ALIGNMENT),
            Err(PoaError::Config(_))
        ));
    }
}
