use std::f64::consts::{PI, TAU};

use rand::{Rng, RngCore};

use super::strategy::{check_available, point_count, take_points, CalibrationStrategy};
use crate::config::Configuration;
use crate::error::Result;
use crate::mask::GcuMask;
use crate::Vec2;

/// `N` points on an Archimedean-like spiral of equal-area spacing.
///
/// Point `j` sits at `ρ_j = scale·√(j/(N−1))`, `θ_j = α + j·Δθ`, where the
/// spiral winds `⌊√(N/π)⌋` times and `α` is a random phase. Positions are
/// snapped to the nearest mask point, so duplicates can occur for large `N`.
#[derive(Debug, Clone)]
pub struct SpiralStrategy {
    mask: GcuMask,
    n: usize,
    phase: Option<f64>,
}

impl SpiralStrategy {
    pub fn new(mask: &GcuMask, n: usize) -> Result<Self> {
        check_available(mask, n)?;
        Ok(Self {
            mask: mask.clone(),
            n,
            phase: None,
        })
    }

    pub fn from_config(mask: &GcuMask, config: &Configuration) -> Result<Self> {
        Self::new(mask, point_count(config)?)
    }

    /// Fix the starting phase instead of drawing it.
    pub fn with_phase(mut self, alpha: f64) -> Self {
        self.phase = Some(alpha);
        self
    }

    /// Spiral positions in normalized mask coordinates.
    pub fn pattern(&self, scale: f64, alpha: f64) -> Vec<Vec2> {
        match self.n {
            0 => Vec::new(),
            1 => vec![Vec2::zeros()],
            n => {
                let turns = (n as f64 / PI).sqrt().floor();
                let dtheta = TAU * turns / (n - 1) as f64;
                (0..n)
                    .map(|j| {
                        let rho = scale * (j as f64 / (n - 1) as f64).sqrt();
                        let theta = alpha + j as f64 * dtheta;
                        Vec2::new(rho * theta.cos(), rho * theta.sin())
                    })
                    .collect()
            }
        }
    }
}

impl CalibrationStrategy for SpiralStrategy {
    fn name(&self) -> &str {
        "spiral"
    }

    fn count(&self) -> usize {
        self.n
    }

    fn generate_points(&self, scale: f64, rng: &mut dyn RngCore) -> Result<Vec<Vec2>> {
        let alpha = self.phase.unwrap_or_else(|| TAU * rng.random::<f64>());
        let pattern = self.pattern(scale, alpha);
        let points = self.mask.closest(&self.mask.unnormalize_all(&pattern));
        take_points(points, self.n)
    }
}
