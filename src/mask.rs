//! Reference GCU mask: a square lattice of pinholes inside a circular plate.
//!
//! The pinholes sit at `center + (i·s, j·s)` for integer `i, j` and lattice
//! separation `s`; only those within the mask radius are valid calibration
//! targets. Calibration strategies work in normalized coordinates (unit
//! radius) and snap their ideal positions back onto the lattice with
//! [`GcuMask::closest`].

use crate::config::Configuration;
use crate::error::{PoaError, Result};
use crate::Vec2;

/// Pinhole pitch (m).
pub const DEFAULT_POINT_SEPARATION: f64 = 15e-3;
/// Pinhole diameter (m).
pub const DEFAULT_POINT_DIAMETER: f64 = 150e-6;
/// Pinhole intensity (W Hz⁻¹ m⁻² sr⁻¹).
pub const DEFAULT_POINT_INTENSITY: f64 = 1e-3;
/// Mask plate diameter (m).
pub const DEFAULT_MASK_DIAMETER: f64 = 400e-3;

/// Slack on the mask radius for points sitting exactly on the rim.
const RIM_TOLERANCE: f64 = 1e-12;

/// Lattice search half-width, in cells, when snapping points outside the mask.
const SNAP_SEARCH_CELLS: i64 = 2;

/// GCU reference mask geometry and illumination.
#[derive(Debug, Clone, PartialEq)]
pub struct GcuMask {
    /// Lattice pitch (m).
    pub separation: f64,
    /// Pinhole diameter (m).
    pub point_diameter: f64,
    /// Pinhole intensity.
    pub intensity: f64,
    /// Mask center (m).
    pub center: Vec2,
    /// Plate diameter (m).
    pub diameter: f64,
    /// Scale from detector-side field coordinates to the mask plane, used
    /// only by [`GcuMask::intensity_at`]. Everything else, `center`
    /// included, is in mask-plane meters.
    pub focal_length: f64,
}

impl Default for GcuMask {
    fn default() -> Self {
        Self {
            separation: DEFAULT_POINT_SEPARATION,
            point_diameter: DEFAULT_POINT_DIAMETER,
            intensity: DEFAULT_POINT_INTENSITY,
            center: Vec2::zeros(),
            diameter: DEFAULT_MASK_DIAMETER,
            focal_length: 1.0,
        }
    }
}

impl GcuMask {
    pub fn defaults(config: &mut Configuration) {
        let d = GcuMask::default();
        config.set_default("gcu.point_separation", d.separation);
        config.set_default("gcu.point_diameter", d.point_diameter);
        config.set_default("gcu.point_intensity", d.intensity);
        config.set_default("gcu.x0", d.center.x);
        config.set_default("gcu.y0", d.center.y);
        config.set_default("gcu.diameter", d.diameter);
        config.set_default("gcu.focal_length", d.focal_length);
    }

    pub fn from_config(config: &Configuration) -> Result<Self> {
        let mask = Self {
            separation: config.get_f64("gcu.point_separation")?,
            point_diameter: config.get_f64("gcu.point_diameter")?,
            intensity: config.get_f64("gcu.point_intensity")?,
            center: Vec2::new(config.get_f64("gcu.x0")?, config.get_f64("gcu.y0")?),
            diameter: config.get_f64("gcu.diameter")?,
            focal_length: config.get_f64("gcu.focal_length")?,
        };
        for (name, v) in [
            ("gcu.point_separation", mask.separation),
            ("gcu.point_diameter", mask.point_diameter),
            ("gcu.diameter", mask.diameter),
            ("gcu.focal_length", mask.focal_length),
        ] {
            if !(v > 0.0 && v.is_finite()) {
                return Err(PoaError::Config(format!(
                    "key `{name}` must be positive, got {v}"
                )));
            }
        }
        Ok(mask)
    }

    /// Radius of the valid area (m).
    pub fn radius(&self) -> f64 {
        0.5 * self.diameter
    }

    pub fn contains(&self, p: Vec2) -> bool {
        (p - self.center).norm() <= self.radius() + RIM_TOLERANCE
    }

    fn lattice_point(&self, i: i64, j: i64) -> Vec2 {
        self.center + self.separation * Vec2::new(i as f64, j as f64)
    }

    /// Every lattice point whose distance to the center lies in
    /// `[r_min, r_max]`, ordered by row (y) then column (x).
    pub fn points_in_radius(&self, r_min: f64, r_max: f64) -> Vec<Vec2> {
        let cells = (r_max / self.separation).floor() as i64;
        let mut points = Vec::new();
        for j in -cells..=cells {
            for i in -cells..=cells {
                let p = self.lattice_point(i, j);
                let r = (p - self.center).norm();
                if r >= r_min - RIM_TOLERANCE && r <= r_max + RIM_TOLERANCE {
                    points.push(p);
                }
            }
        }
        points
    }

    /// Every valid lattice point of the mask.
    pub fn point_list(&self) -> Vec<Vec2> {
        self.points_in_radius(0.0, self.radius())
    }

    /// Nearest valid lattice point to `p`.
    pub fn closest_point(&self, p: Vec2) -> Vec2 {
        let rel = (p - self.center) / self.separation;
        let (i, j) = (rel.x.round() as i64, rel.y.round() as i64);
        let snapped = self.lattice_point(i, j);
        if self.contains(snapped) {
            return snapped;
        }

        // Outside the plate: look around the rim point closest to `p`
        let d = p - self.center;
        let rim = self.center + d * (self.radius() / d.norm());
        let rel = (rim - self.center) / self.separation;
        let (ci, cj) = (rel.x.round() as i64, rel.y.round() as i64);
        let mut best = self.center;
        let mut best_dist = (p - best).norm();
        for j in cj - SNAP_SEARCH_CELLS..=cj + SNAP_SEARCH_CELLS {
            for i in ci - SNAP_SEARCH_CELLS..=ci + SNAP_SEARCH_CELLS {
                let q = self.lattice_point(i, j);
                let dist = (p - q).norm();
                if self.contains(q) && dist < best_dist {
                    best = q;
                    best_dist = dist;
                }
            }
        }
        best
    }

    /// Snap every point to its nearest valid lattice point.
    pub fn closest(&self, points: &[Vec2]) -> Vec<Vec2> {
        points.iter().map(|&p| self.closest_point(p)).collect()
    }

    /// Field coordinates to unit-radius mask coordinates.
    pub fn normalize(&self, p: Vec2) -> Vec2 {
        (p - self.center) / self.radius()
    }

    /// Unit-radius mask coordinates to field coordinates.
    pub fn unnormalize(&self, q: Vec2) -> Vec2 {
        self.center + q * self.radius()
    }

    pub fn unnormalize_all(&self, points: &[Vec2]) -> Vec<Vec2> {
        points.iter().map(|&q| self.unnormalize(q)).collect()
    }

    /// Light emitted at field point `p`: the pinhole intensity inside a
    /// pinhole, zero elsewhere. `p` is scaled onto the mask plane first, so
    /// the pinhole at `center` is seen at `center / focal_length`.
    pub fn intensity_at(&self, p: Vec2) -> f64 {
        let s = self.separation;
        let on_mask = self.focal_length * p;
        let rel = on_mask - self.center;
        // offset from the nearest pinhole, per axis in [−s/2, s/2)
        let d = Vec2::new(
            (rel.x + 0.5 * s).rem_euclid(s) - 0.5 * s,
            (rel.y + 0.5 * s).rem_euclid(s) - 0.5 * s,
        );
        if d.norm() <= 0.5 * self.point_diameter {
            self.intensity
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lattice() {
        let mask = GcuMask::default();
        let points = mask.point_list();
        // area estimate π (200/15)² ≈ 558
        assert!(points.len() > 500 && points.len() < 620, "{}", points.len());
        assert!(points.iter().all(|&p| mask.contains(p)));
        assert!(points.contains(&Vec2::zeros()));
    }

    #[test]
    fn test_points_in_annulus() {
        let mask = GcuMask::default();
        let ring = mask.points_in_radius(0.014, 0.016);
        // the four axis neighbours at exactly one pitch
        assert_eq!(ring.len(), 4);
        for p in ring {
            assert!((p.norm() - 0.015).abs() < 1e-12);
        }
    }

    #[test]
    fn test_closest_snaps_to_lattice() {
        let mask = GcuMask::default();
        let p = mask.closest_point(Vec2::new(0.031, -0.044));
        assert!((p - Vec2::new(0.030, -0.045)).norm() < 1e-12);

        // points beyond the rim come back inside
        let far = mask.closest_point(Vec2::new(0.5, 0.0));
        assert!(mask.contains(far));
        assert!((far - Vec2::new(0.195, 0.0)).norm() < 1e-12, "{far}");
    }

    #[test]
    fn test_normalization() {
        let mask = GcuMask {
            center: Vec2::new(0.01, -0.02),
            ..Default::default()
        };
        let p = Vec2::new(0.1, 0.05);
        let q = mask.normalize(p);
        assert!((mask.unnormalize(q) - p).norm() < 1e-15);
        assert!((mask.normalize(Vec2::new(0.21, -0.02)) - Vec2::new(1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_intensity() {
        let mask = GcuMask::default();
        assert_eq!(mask.intensity_at(Vec2::new(0.015, 0.030)), 1e-3);
        assert_eq!(mask.intensity_at(Vec2::new(0.015 + 50e-6, -0.030)), 1e-3);
        assert_eq!(mask.intensity_at(Vec2::new(0.015 + 100e-6, 0.0)), 0.0);
        assert_eq!(mask.intensity_at(Vec2::new(0.0075, 0.0075)), 0.0);
    }

    #[test]
    fn test_intensity_center_in_mask_plane() {
        let mask = GcuMask {
            center: Vec2::new(0.01, 0.0),
            focal_length: 2.0,
            ..Default::default()
        };
        assert_eq!(mask.intensity_at(Vec2::new(0.005, 0.0)), 1e-3);
        assert_eq!(mask.intensity_at(Vec2::new(0.005 + 7.5e-3, 0.0)), 1e-3);
        // center taken as a field coordinate would light here instead
        assert_eq!(mask.intensity_at(Vec2::new(0.01, 0.0)), 0.0);
    }

    #[test]
    fn test_config() {
        let mut cfg = Configuration::new();
        cfg.set("gcu.diameter", 0.2);
        GcuMask::defaults(&mut cfg);
        let mask = GcuMask::from_config(&cfg).unwrap();
        assert_eq!(mask.radius(), 0.1);
        cfg.set("gcu.point_separation", -1.0);
        assert!(GcuMask::from_config(&cfg).is_err());
    }
}
