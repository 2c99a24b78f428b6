//! Time-parameterized arm path through a list of calibration points.
//!
//! Points are converted to joint angles with the nominal inverse kinematics,
//! optionally reordered by a greedy nearest-neighbour walk in joint space,
//! and joined by per-axis trapezoidal moves. Both axes start each move
//! together; the axis that finishes first holds its final angle until the
//! other arrives. After every arrival the arm settles for `settle_time`.

use rand::{Rng, RngCore};
use tracing::debug;

use crate::arm::{shortest_delta, trapezoidal_move, ArmModel, Axis, JointAngles};
use crate::error::{PoaError, Result};
use crate::Vec2;

/// How joint-space distances combine the two axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceNorm {
    #[default]
    Euclidean,
    /// Largest single-axis move; a proxy for move time when both axes
    /// run in parallel.
    Max,
    Manhattan,
}

impl DistanceNorm {
    /// Distance between two joint positions, taking each axis the short way
    /// around.
    pub fn distance(&self, a: JointAngles, b: JointAngles) -> f64 {
        let dt = shortest_delta(a.theta, b.theta).abs();
        let dp = shortest_delta(a.phi, b.phi).abs();
        match self {
            DistanceNorm::Euclidean => dt.hypot(dp),
            DistanceNorm::Max => dt.max(dp),
            DistanceNorm::Manhattan => dt + dp,
        }
    }
}

impl std::str::FromStr for DistanceNorm {
    type Err = PoaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceNorm::Euclidean),
            "max" | "linf" => Ok(DistanceNorm::Max),
            "manhattan" | "l1" => Ok(DistanceNorm::Manhattan),
            other => Err(PoaError::Config(format!("unknown distance norm `{other}`"))),
        }
    }
}

/// Options for [`plan_path`].
#[derive(Debug, Clone)]
pub struct PathOptions {
    /// Visit points in nearest-neighbour order instead of the given order.
    pub reorder: bool,
    /// Start the nearest-neighbour walk at a random point instead of the first.
    pub random_start: bool,
    pub norm: DistanceNorm,
    /// Dwell time after each arrival (s).
    pub settle_time: f64,
    /// Use the mirrored elbow solution.
    pub mirror: bool,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            reorder: true,
            random_start: false,
            norm: DistanceNorm::Euclidean,
            settle_time: 1.0,
            mirror: false,
        }
    }
}

/// A sampled arm trajectory.
#[derive(Debug, Clone)]
pub struct CalibrationPath {
    /// Sample times (s), non-decreasing, starting at 0.
    pub times: Vec<f64>,
    /// Joint angles at each sample. Angles are unwrapped along the path.
    pub angles: Vec<JointAngles>,
    /// Field position at each sample (nominal forward kinematics).
    pub xy: Vec<Vec2>,
    /// For each visited point, the sample index at which the arm arrives.
    pub segment_bounds: Vec<usize>,
    /// Points in visiting order.
    pub ordered_points: Vec<Vec2>,
}

impl CalibrationPath {
    /// Total duration of the path (s).
    pub fn duration(&self) -> f64 {
        self.times.last().copied().unwrap_or(0.0)
    }
}

/// Greedy nearest-neighbour visiting order starting at `start`.
pub fn nearest_neighbour_order(
    angles: &[JointAngles],
    start: usize,
    norm: DistanceNorm,
) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..angles.len()).filter(|&i| i != start).collect();
    let mut order = Vec::with_capacity(angles.len());
    if start >= angles.len() {
        return order;
    }
    order.push(start);
    let mut current = start;
    while !remaining.is_empty() {
        let (k, _) = remaining
            .iter()
            .enumerate()
            .map(|(k, &i)| (k, norm.distance(angles[current], angles[i])))
            .fold((0, f64::INFINITY), |best, c| if c.1 < best.1 { c } else { best });
        current = remaining.swap_remove(k);
        order.push(current);
    }
    order
}

/// Plan a path through `points` for `arm`.
///
/// Fails with `Unreachable` if any point is beyond the arm's reach and with
/// `ShapeMismatch` if `points` is empty.
pub fn plan_path(
    arm: &ArmModel,
    points: &[Vec2],
    opts: &PathOptions,
    rng: &mut dyn RngCore,
) -> Result<CalibrationPath> {
    if points.is_empty() {
        return Err(PoaError::ShapeMismatch(
            "calibration path needs at least one point".to_string(),
        ));
    }
    let angles = points
        .iter()
        .map(|&p| arm.try_xy_to_theta_phi(p, opts.mirror))
        .collect::<Result<Vec<_>>>()?;

    let order: Vec<usize> = if opts.reorder {
        let start = if opts.random_start {
            rng.random_range(0..points.len())
        } else {
            0
        };
        nearest_neighbour_order(&angles, start, opts.norm)
    } else {
        (0..points.len()).collect()
    };

    let motion = arm.motion();
    let dt = motion.dt;
    let mut current = angles[order[0]];
    let mut times = vec![0.0];
    let mut samples = vec![current];
    let mut segment_bounds = vec![0];
    let mut t0 = 0.0;

    let settle = |times: &mut Vec<f64>, samples: &mut Vec<JointAngles>, t0: &mut f64, at| {
        if opts.settle_time > 0.0 {
            *t0 += opts.settle_time;
            times.push(*t0);
            samples.push(at);
        }
    };
    settle(&mut times, &mut samples, &mut t0, current);

    for &i in &order[1..] {
        let target = angles[i];
        let theta = trapezoidal_move(current.theta, target.theta, motion.limits(Axis::Theta), dt);
        let phi = trapezoidal_move(current.phi, target.phi, motion.limits(Axis::Phi), dt);
        let duration = theta.duration().max(phi.duration());

        let steps = (duration / dt).floor() as usize;
        let mut grid: Vec<f64> = (1..=steps).map(|k| k as f64 * dt).collect();
        if duration - grid.last().copied().unwrap_or(0.0) > 1e-12 {
            grid.push(duration);
        }
        for t in grid {
            times.push(t0 + t);
            samples.push(JointAngles::new(theta.angle_at(t), phi.angle_at(t)));
        }
        t0 += duration;
        current = JointAngles::new(theta.final_angle(), phi.final_angle());
        segment_bounds.push(samples.len() - 1);
        settle(&mut times, &mut samples, &mut t0, current);
    }

    let xy = arm.xy_from_theta_phi_batch(&samples);
    let ordered_points: Vec<Vec2> = order.iter().map(|&i| points[i]).collect();
    debug!(
        "Calibration path: {} points, {} samples, {:.1} s",
        ordered_points.len(),
        samples.len(),
        t0
    );

    Ok(CalibrationPath {
        times,
        angles: samples,
        xy,
        segment_bounds,
        ordered_points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn arm() -> ArmModel {
        let mut cfg = Configuration::new();
        cfg.set("poa.radius", "0.2 m");
        ArmModel::defaults(&mut cfg);
        ArmModel::from_config(&cfg).unwrap()
    }

    #[test]
    fn test_distance_norms() {
        let a = JointAngles::new(0.1, 0.0);
        let b = JointAngles::new(-0.2, 0.4);
        assert!((DistanceNorm::Euclidean.distance(a, b) - 0.5).abs() < 1e-12);
        assert!((DistanceNorm::Max.distance(a, b) - 0.4).abs() < 1e-12);
        assert!((DistanceNorm::Manhattan.distance(a, b) - 0.7).abs() < 1e-12);
        // wraparound
        let c = JointAngles::new(3.1, 0.0);
        let d = JointAngles::new(-3.1, 0.0);
        assert!(DistanceNorm::Euclidean.distance(c, d) < 0.1);
        assert_eq!("l1".parse::<DistanceNorm>().unwrap(), DistanceNorm::Manhattan);
        assert!("l3".parse::<DistanceNorm>().is_err());
    }

    #[test]
    fn test_nearest_neighbour_order() {
        let angles: Vec<JointAngles> = [0.0, 0.9, 0.1, 0.5]
            .iter()
            .map(|&t| JointAngles::new(t, 0.0))
            .collect();
        let order = nearest_neighbour_order(&angles, 0, DistanceNorm::Euclidean);
        assert_eq!(order, vec![0, 2, 3, 1]);
    }

    #[test]
    fn test_path_visits_points() {
        let arm = arm();
        let points = vec![
            Vec2::new(0.05, 0.0),
            Vec2::new(-0.1, 0.1),
            Vec2::new(0.06, 0.01),
            Vec2::new(0.0, -0.15),
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let path = plan_path(&arm, &points, &PathOptions::default(), &mut rng).unwrap();

        assert_eq!(path.ordered_points.len(), 4);
        assert_eq!(path.ordered_points[0], points[0]);
        assert_eq!(path.ordered_points[1], points[2]);
        assert_eq!(path.times.len(), path.angles.len());
        assert_eq!(path.xy.len(), path.angles.len());
        assert!(path.times.windows(2).all(|w| w[1] >= w[0]));
        for (&k, p) in path.segment_bounds.iter().zip(&path.ordered_points) {
            assert!((path.xy[k] - p).norm() < 1e-9, "{} vs {p}", path.xy[k]);
            // settled: next sample holds position
            assert!((path.xy[k + 1] - p).norm() < 1e-9);
        }
        assert!(path.duration() > 4.0);
    }

    #[test]
    fn test_unreachable_and_empty() {
        let arm = arm();
        let mut rng = StdRng::seed_from_u64(0);
        let opts = PathOptions::default();
        assert!(matches!(
            plan_path(&arm, &[Vec2::new(0.5, 0.0)], &opts, &mut rng),
            Err(PoaError::Unreachable { .. })
        ));
        assert!(matches!(
            plan_path(&arm, &[], &opts, &mut rng),
            Err(PoaError::ShapeMismatch(_))
        ));
    }
}
