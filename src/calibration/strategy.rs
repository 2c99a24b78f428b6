//! Calibration point-selection strategies and their registry.

use std::collections::BTreeMap;
use std::fmt;

use rand::RngCore;

use crate::config::Configuration;
use crate::error::{PoaError, Result};
use crate::mask::GcuMask;
use crate::Vec2;

use super::random::RandomStrategy;
use super::ring::RingStrategy;
use super::spiral::SpiralStrategy;

/// Default number of calibration points (`cal.number`).
pub const DEFAULT_POINT_COUNT: i64 = 11;

/// Chooses where on the mask to measure.
pub trait CalibrationStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Number of points produced.
    fn count(&self) -> usize;

    /// Valid mask points to measure.
    ///
    /// `scale` is the extent of the pattern in units of the mask radius.
    /// Strategies that pick directly from the lattice ignore it.
    fn generate_points(&self, scale: f64, rng: &mut dyn RngCore) -> Result<Vec<Vec2>>;
}

/// Builds a strategy for a mask from configuration.
pub type StrategyFactory =
    Box<dyn Fn(&GcuMask, &Configuration) -> Result<Box<dyn CalibrationStrategy>> + Send + Sync>;

/// Wrap a strategy constructor into a [`StrategyFactory`].
pub fn factory<S, F>(build: F) -> StrategyFactory
where
    S: CalibrationStrategy + 'static,
    F: Fn(&GcuMask, &Configuration) -> Result<S> + Send + Sync + 'static,
{
    Box::new(
        move |mask: &GcuMask, config: &Configuration| -> Result<Box<dyn CalibrationStrategy>> {
            Ok(Box::new(build(mask, config)?))
        },
    )
}

/// Seed `cal.number`.
pub fn strategy_defaults(config: &mut Configuration) {
    config.set_default("cal.number", DEFAULT_POINT_COUNT);
}

/// Requested number of points, `cal.number`.
pub fn point_count(config: &Configuration) -> Result<usize> {
    config.get_usize("cal.number")
}

/// Check that a pattern produced enough points and cut it to `n`.
pub(crate) fn take_points(mut points: Vec<Vec2>, n: usize) -> Result<Vec<Vec2>> {
    if points.len() < n {
        return Err(PoaError::TooFewPoints {
            needed: n,
            available: points.len(),
        });
    }
    points.truncate(n);
    Ok(points)
}

/// Fail early when the mask cannot supply `n` points at all.
pub(crate) fn check_available(mask: &GcuMask, n: usize) -> Result<()> {
    let available = mask.point_list().len();
    if n > available {
        return Err(PoaError::TooFewPoints {
            needed: n,
            available,
        });
    }
    Ok(())
}

/// Named strategy factories.
#[derive(Default)]
pub struct StrategyRegistry {
    factories: BTreeMap<String, StrategyFactory>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl StrategyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `random`, `spiral` and `ring`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_or_keep("random", factory(RandomStrategy::from_config));
        registry.register_or_keep("spiral", factory(SpiralStrategy::from_config));
        registry.register_or_keep("ring", factory(RingStrategy::from_config));
        registry
    }

    /// Add a factory; fails if the name is taken.
    pub fn register(&mut self, name: &str, factory: StrategyFactory) -> Result<()> {
        if self.factories.contains_key(name) {
            return Err(PoaError::AlreadyRegistered(name.to_string()));
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    /// Add a factory unless the name is taken. Returns `true` if inserted.
    pub fn register_or_keep(&mut self, name: &str, factory: StrategyFactory) -> bool {
        self.register(name, factory).is_ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn make(
        &self,
        name: &str,
        mask: &GcuMask,
        config: &Configuration,
    ) -> Result<Box<dyn CalibrationStrategy>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PoaError::UnknownStrategy(name.to_string()))?;
        factory(mask, config)
    }

    /// Build the named strategy and generate its points.
    pub fn generate_points(
        &self,
        name: &str,
        mask: &GcuMask,
        config: &Configuration,
        scale: f64,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Vec2>> {
        self.make(name, mask, config)?.generate_points(scale, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Debug)]
    struct Center;

    impl CalibrationStrategy for Center {
        fn name(&self) -> &str {
            "center"
        }

        fn count(&self) -> usize {
            1
        }

        fn generate_points(&self, _scale: f64, _rng: &mut dyn RngCore) -> Result<Vec<Vec2>> {
            Ok(vec![Vec2::zeros()])
        }
    }

    #[test]
    fn test_defaults_registered() {
        let registry = StrategyRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["random", "ring", "spiral"]);
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = StrategyRegistry::with_defaults();
        let err = registry
            .register("random", factory(|_: &GcuMask, _: &Configuration| Ok(Center)))
            .unwrap_err();
        assert!(matches!(err, PoaError::AlreadyRegistered(ref n) if n == "random"));
        // idempotent insert keeps the first registration
        let center = || factory(|_: &GcuMask, _: &Configuration| Ok(Center));
        assert!(!registry.register_or_keep("random", center()));
        assert!(registry.register_or_keep("center", center()));

        let mut cfg = Configuration::new();
        strategy_defaults(&mut cfg);
        let mask = GcuMask::default();
        let s = registry.make("random", &mask, &cfg).unwrap();
        assert_eq!(s.name(), "random");
        let mut rng = StdRng::seed_from_u64(0);
        let p = registry
            .generate_points("center", &mask, &cfg, 1.0, &mut rng)
            .unwrap();
        assert_eq!(p, vec![Vec2::zeros()]);
    }

    #[test]
    fn test_unknown_strategy() {
        let registry = StrategyRegistry::with_defaults();
        let cfg = Configuration::new();
        assert!(matches!(
            registry.make("ocs2", &GcuMask::default(), &cfg),
            Err(PoaError::UnknownStrategy(_))
        ));
    }
}
