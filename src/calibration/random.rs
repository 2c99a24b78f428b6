use rand::seq::index;
use rand::RngCore;

use super::strategy::{check_available, point_count, CalibrationStrategy};
use crate::config::Configuration;
use crate::error::Result;
use crate::mask::GcuMask;
use crate::Vec2;

/// `N` mask points drawn uniformly without replacement.
#[derive(Debug, Clone)]
pub struct RandomStrategy {
    points: Vec<Vec2>,
    n: usize,
}

impl RandomStrategy {
    pub fn new(mask: &GcuMask, n: usize) -> Result<Self> {
        check_available(mask, n)?;
        Ok(Self {
            points: mask.point_list(),
            n,
        })
    }

    pub fn from_config(mask: &GcuMask, config: &Configuration) -> Result<Self> {
        Self::new(mask, point_count(config)?)
    }
}

impl CalibrationStrategy for RandomStrategy {
    fn name(&self) -> &str {
        "random"
    }

    fn count(&self) -> usize {
        self.n
    }

    fn generate_points(&self, _scale: f64, rng: &mut dyn RngCore) -> Result<Vec<Vec2>> {
        Ok(index::sample(rng, self.points.len(), self.n)
            .iter()
            .map(|i| self.points[i])
            .collect())
    }
}
