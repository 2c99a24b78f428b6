//! Trapezoidal velocity profiles for single-axis moves.
//!
//! A move accelerates at the axis' maximum acceleration up to its maximum
//! speed, cruises, and decelerates symmetrically. Moves too short to reach
//! full speed follow a triangular profile instead. Moves always take the
//! shortest way around the circle.

use std::f64::consts::{PI, TAU};

use crate::config::Configuration;
use crate::error::{PoaError, Result};

use super::encoder::Axis;

/// Default maximum joint speed (rad/s).
pub const DEFAULT_AXIS_SPEED: f64 = 0.1;
/// Default maximum joint acceleration (rad/s²).
pub const DEFAULT_AXIS_ACCELERATION: f64 = 0.05;
/// Default sampling interval of motion profiles (s).
pub const DEFAULT_MOTION_DT: f64 = 0.1;

/// Kinematic limits of one joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisLimits {
    /// Maximum speed (rad/s).
    pub speed: f64,
    /// Maximum acceleration (rad/s²).
    pub acceleration: f64,
}

impl Default for AxisLimits {
    fn default() -> Self {
        Self {
            speed: DEFAULT_AXIS_SPEED,
            acceleration: DEFAULT_AXIS_ACCELERATION,
        }
    }
}

/// Limits of both joints plus the profile sampling interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionConfig {
    pub theta: AxisLimits,
    pub phi: AxisLimits,
    /// Sampling interval (s).
    pub dt: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            theta: AxisLimits::default(),
            phi: AxisLimits::default(),
            dt: DEFAULT_MOTION_DT,
        }
    }
}

fn axis_key(axis: Axis, param: &str) -> String {
    format!("poa.axis[{}].{}", axis.name(), param)
}

impl MotionConfig {
    pub fn defaults(config: &mut Configuration) {
        for axis in Axis::ALL {
            config.set_default(&axis_key(axis, "speed"), DEFAULT_AXIS_SPEED);
            config.set_default(&axis_key(axis, "acceleration"), DEFAULT_AXIS_ACCELERATION);
        }
        config.set_default("poa.motion.dt", DEFAULT_MOTION_DT);
    }

    pub fn from_config(config: &Configuration) -> Result<Self> {
        let limits = |axis: Axis| -> Result<AxisLimits> {
            let speed = positive(config, &axis_key(axis, "speed"))?;
            let acceleration = positive(config, &axis_key(axis, "acceleration"))?;
            Ok(AxisLimits {
                speed,
                acceleration,
            })
        };
        Ok(Self {
            theta: limits(Axis::Theta)?,
            phi: limits(Axis::Phi)?,
            dt: positive(config, "poa.motion.dt")?,
        })
    }

    pub fn limits(&self, axis: Axis) -> AxisLimits {
        match axis {
            Axis::Theta => self.theta,
            Axis::Phi => self.phi,
        }
    }
}

fn positive(config: &Configuration, key: &str) -> Result<f64> {
    let v = config.get_f64(key)?;
    if !(v > 0.0 && v.is_finite()) {
        return Err(PoaError::Config(format!(
            "key `{key}` must be positive, got {v}"
        )));
    }
    Ok(v)
}

/// Signed angle of the shortest rotation from `from` to `to`, in `(−π, π]`.
pub fn shortest_delta(from: f64, to: f64) -> f64 {
    let d = (to - from).rem_euclid(TAU);
    if d > PI {
        d - TAU
    } else {
        d
    }
}

/// Time-sampled single-axis move.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionProfile {
    /// Sample times (s), starting at 0 and ending at the move duration.
    pub times: Vec<f64>,
    /// Joint angle at each sample time (rad).
    pub angles: Vec<f64>,
}

impl MotionProfile {
    /// Duration of the move (s).
    pub fn duration(&self) -> f64 {
        self.times.last().copied().unwrap_or(0.0)
    }

    /// Final angle of the move.
    pub fn final_angle(&self) -> f64 {
        self.angles.last().copied().unwrap_or(f64::NAN)
    }

    /// Angle at time `t`, linearly interpolated; holds the end values
    /// outside the profile.
    pub fn angle_at(&self, t: f64) -> f64 {
        let n = self.times.len();
        if n == 0 {
            return f64::NAN;
        }
        if t <= self.times[0] {
            return self.angles[0];
        }
        if t >= self.times[n - 1] {
            return self.angles[n - 1];
        }
        let i = self.times.partition_point(|&s| s <= t);
        let (t0, t1) = (self.times[i - 1], self.times[i]);
        let (a0, a1) = (self.angles[i - 1], self.angles[i]);
        a0 + (a1 - a0) * (t - t0) / (t1 - t0)
    }
}

/// Trapezoidal (or triangular) move from `from` to `to`, sampled every `dt`.
///
/// The final angle is `from + shortest_delta(from, to)`, so it may differ
/// from `to` by a multiple of 2π.
pub fn trapezoidal_move(from: f64, to: f64, limits: AxisLimits, dt: f64) -> MotionProfile {
    let delta = shortest_delta(from, to);
    let distance = delta.abs();
    if distance == 0.0 {
        return MotionProfile {
            times: vec![0.0],
            angles: vec![from],
        };
    }
    let sign = delta.signum();
    let a = limits.acceleration;

    let mut t_acc = limits.speed / a;
    let mut v_peak = limits.speed;
    let mut d_acc = 0.5 * a * t_acc * t_acc;
    if 2.0 * d_acc >= distance {
        // never reaches full speed
        t_acc = (distance / a).sqrt();
        v_peak = a * t_acc;
        d_acc = 0.5 * distance;
    }
    let t_cruise = (distance - 2.0 * d_acc) / v_peak;
    let total = 2.0 * t_acc + t_cruise;

    let position = |t: f64| -> f64 {
        if t < t_acc {
            0.5 * a * t * t
        } else if t < t_acc + t_cruise {
            d_acc + v_peak * (t - t_acc)
        } else {
            let td = (total - t).max(0.0);
            distance - 0.5 * a * td * td
        }
    };

    let steps = (total / dt).floor() as usize;
    let mut times: Vec<f64> = (0..=steps).map(|k| k as f64 * dt).collect();
    if times.last().is_some_and(|&t| total - t > 1e-12) {
        times.push(total);
    } else if let Some(last) = times.last_mut() {
        *last = total;
    }
    let angles = times.iter().map(|&t| from + sign * position(t)).collect();

    MotionProfile { times, angles }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortest_delta() {
        assert!((shortest_delta(0.1, 0.3) - 0.2).abs() < 1e-15);
        assert!((shortest_delta(0.3, 0.1) + 0.2).abs() < 1e-15);
        assert!((shortest_delta(3.0, -3.0) - (TAU - 6.0)).abs() < 1e-12);
        assert!((shortest_delta(-3.0, 3.0) + (TAU - 6.0)).abs() < 1e-12);
    }

    #[test]
    fn test_trapezoid_reaches_target() {
        let limits = AxisLimits {
            speed: 0.1,
            acceleration: 0.05,
        };
        let p = trapezoidal_move(0.0, 1.0, limits, 0.1);
        // 2 s ramp each way covering 0.1 rad each, then 8 s cruise
        assert!((p.duration() - 12.0).abs() < 1e-9, "duration {}", p.duration());
        assert!((p.final_angle() - 1.0).abs() < 1e-12);
        assert_eq!(p.angles[0], 0.0);
        for w in p.angles.windows(2) {
            assert!(w[1] >= w[0] - 1e-15);
        }
        for w in p.times.windows(2) {
            let v = (p.angle_at(w[1]) - p.angle_at(w[0])) / (w[1] - w[0]);
            assert!(v <= limits.speed + 1e-9, "speed {v}");
        }
    }

    #[test]
    fn test_triangle_profile() {
        let limits = AxisLimits {
            speed: 1.0,
            acceleration: 0.5,
        };
        let p = trapezoidal_move(1.0, 0.9, limits, 0.05);
        let expected = 2.0 * (0.1f64 / 0.5).sqrt();
        assert!((p.duration() - expected).abs() < 1e-9);
        assert!((p.final_angle() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_wraparound_move() {
        let p = trapezoidal_move(3.0, -3.0, AxisLimits::default(), 0.1);
        assert!((p.final_angle() - (3.0 + TAU - 6.0)).abs() < 1e-12);
        assert!(p.final_angle() > 3.0);
    }

    #[test]
    fn test_zero_move() {
        let p = trapezoidal_move(0.4, 0.4, AxisLimits::default(), 0.1);
        assert_eq!(p.times, vec![0.0]);
        assert_eq!(p.angle_at(10.0), 0.4);
    }

    #[test]
    fn test_config() {
        let mut cfg = Configuration::new();
        cfg.set("poa.axis[phi].speed", 0.2);
        MotionConfig::defaults(&mut cfg);
        let m = MotionConfig::from_config(&cfg).unwrap();
        assert_eq!(m.limits(Axis::Phi).speed, 0.2);
        assert_eq!(m.limits(Axis::Theta), AxisLimits::default());

        cfg.set("poa.motion.dt", 0.0);
        assert!(MotionConfig::from_config(&cfg).is_err());
    }
}
