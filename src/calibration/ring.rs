use std::f64::consts::{PI, TAU};

use rand::RngCore;

use super::strategy::{check_available, point_count, take_points, CalibrationStrategy};
use crate::config::Configuration;
use crate::error::Result;
use crate::mask::GcuMask;
use crate::Vec2;

/// Concentric rings with radii and populations chosen for low-order
/// Zernike fits.
///
/// For `N` points the fit degree is `n = ⌈−1.5 + ½√(1 + 8N)⌉` and
/// `⌊n/2⌋ + 1` rings are laid out. Ring `j` has radius
/// `r_j = 1.1565ζ − 0.76535ζ² + 0.60517ζ³` with
/// `ζ = cos((2j − 1)π / (2(n + 1)))` and carries `2n + 5 − 4j` evenly
/// spaced points. The first `N` positions are kept after snapping.
#[derive(Debug, Clone)]
pub struct RingStrategy {
    mask: GcuMask,
    n: usize,
}

impl RingStrategy {
    pub fn new(mask: &GcuMask, n: usize) -> Result<Self> {
        check_available(mask, n)?;
        Ok(Self {
            mask: mask.clone(),
            n,
        })
    }

    pub fn from_config(mask: &GcuMask, config: &Configuration) -> Result<Self> {
        Self::new(mask, point_count(config)?)
    }

    /// Polynomial degree the rings are laid out for.
    pub fn degree(&self) -> usize {
        // inverse of N = (n + 1)(n + 2) / 2
        let d = (-1.5 + 0.5 * (1.0 + 8.0 * self.n as f64).sqrt()).ceil();
        d.max(0.0) as usize
    }

    /// Ring positions in normalized mask coordinates, before truncation.
    pub fn pattern(&self, scale: f64) -> Vec<Vec2> {
        if self.n == 0 {
            return Vec::new();
        }
        let n = self.degree();
        let rings = n / 2 + 1;
        let mut points = Vec::new();
        for j in 1..=rings {
            let zeta = ((2 * j - 1) as f64 * PI / (2 * (n + 1)) as f64).cos();
            let r = scale * (1.1565 * zeta - 0.76535 * zeta.powi(2) + 0.60517 * zeta.powi(3));
            let count = 2 * n + 5 - 4 * j;
            for s in 0..count {
                let theta = TAU * s as f64 / count as f64;
                points.push(Vec2::new(r * theta.cos(), r * theta.sin()));
            }
        }
        points
    }
}

impl CalibrationStrategy for RingStrategy {
    fn name(&self) -> &str {
        "ring"
    }

    fn count(&self) -> usize {
        self.n
    }

    fn generate_points(&self, scale: f64, _rng: &mut dyn RngCore) -> Result<Vec<Vec2>> {
        let mut pattern = self.pattern(scale);
        pattern.truncate(self.n);
        let points = self.mask.closest(&self.mask.unnormalize_all(&pattern));
        take_points(points, self.n)
    }
}
