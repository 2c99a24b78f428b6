//! Calibration orchestrator: manufacture, measure, fit, apply, verify.

use std::fmt;

use nalgebra::Complex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use super::path::{plan_path, CalibrationPath, PathOptions};
use super::strategy::{strategy_defaults, StrategyRegistry};
use crate::config::Configuration;
use crate::error::{PoaError, Result};
use crate::mask::GcuMask;
use crate::optics::OpticalModel;
use crate::sampler::{ErrorSampler, SamplerStats, SamplingGeometry, DEFAULT_WORKERS};
use crate::transform::LifecycleEvent;
use crate::zernike::{j_to_mn, ZernikeSolver};
use crate::Vec2;

/// Default number of Zernike coefficients fitted.
pub const DEFAULT_ORDER: i64 = 3;
/// Default residual-map size (pixels per side).
pub const DEFAULT_MAP_SIZE: i64 = 400;
/// Default residual-map pixel pitch (m).
pub const DEFAULT_MAP_STEP: f64 = 1.25e-3;
/// Default point-selection strategy.
pub const DEFAULT_STRATEGY: &str = "spiral";

/// Progress of a calibration cycle. Stages are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CalibrationStage {
    Idle,
    Manufactured,
    InSession,
    Measured,
    Fitted,
    Applied,
    Verified,
}

impl fmt::Display for CalibrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CalibrationStage::Idle => "idle",
            CalibrationStage::Manufactured => "manufactured",
            CalibrationStage::InSession => "in session",
            CalibrationStage::Measured => "measured",
            CalibrationStage::Fitted => "fitted",
            CalibrationStage::Applied => "applied",
            CalibrationStage::Verified => "verified",
        };
        f.write_str(s)
    }
}

/// Residual error of the field after a correction is installed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Residual {
    /// Mean squared error over the field (m²).
    pub mse: f64,
    /// Largest squared error over the field (m²).
    pub max_se: f64,
}

/// Spread of one coefficient over a Monte Carlo run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoefficientStats {
    pub j: usize,
    pub m: i32,
    pub n: u32,
    pub re_mean: f64,
    pub re_std: f64,
    pub im_mean: f64,
    pub im_std: f64,
}

impl CoefficientStats {
    /// Per-coefficient mean and (population) standard deviation.
    pub fn from_samples(samples: &[Vec<Complex<f64>>]) -> Vec<CoefficientStats> {
        let order = samples.iter().map(Vec::len).min().unwrap_or(0);
        let count = samples.len() as f64;
        (0..order)
            .map(|j| {
                let (m, n) = j_to_mn(j);
                let mean_std = |f: &dyn Fn(&Complex<f64>) -> f64| {
                    let mean = samples.iter().map(|s| f(&s[j])).sum::<f64>() / count;
                    let var = samples
                        .iter()
                        .map(|s| (f(&s[j]) - mean).powi(2))
                        .sum::<f64>()
                        / count;
                    (mean, var.sqrt())
                };
                let (re_mean, re_std) = mean_std(&|c| c.re);
                let (im_mean, im_std) = mean_std(&|c| c.im);
                CoefficientStats {
                    j,
                    m,
                    n,
                    re_mean,
                    re_std,
                    im_mean,
                    im_std,
                }
            })
            .collect()
    }

    /// Label of the form `a(m,n)`.
    pub fn label(&self) -> String {
        format!("a({:2},{:2})", self.m, self.n)
    }
}

/// Runs calibration cycles against a simulated instrument.
///
/// Measurements are always taken with the controller correction removed, so
/// fitted coefficients describe the raw pointing error and can be installed
/// as-is.
#[derive(Debug)]
pub struct Calibration {
    model: OpticalModel,
    mask: GcuMask,
    mask_points: Vec<Vec2>,
    order: usize,
    solver: ZernikeSolver,
    sampler: ErrorSampler,
    strategies: StrategyRegistry,
    config: Configuration,
    stage: CalibrationStage,
    rng: StdRng,
    points: Vec<Vec2>,
    err_vec: Vec<Vec2>,
    coefficients: Option<Vec<Complex<f64>>>,
    installed: Option<Vec<Complex<f64>>>,
}

impl Calibration {
    /// Seed every key the calibration and its components read.
    pub fn defaults(config: &mut Configuration) {
        OpticalModel::defaults(config);
        GcuMask::defaults(config);
        strategy_defaults(config);
        config.set_default("cal.order", DEFAULT_ORDER);
        config.set_default("cal.strategy", DEFAULT_STRATEGY);
        config.set_default("cal.scale", 1.0);
        config.set_default("cal.cols", DEFAULT_MAP_SIZE);
        config.set_default("cal.rows", DEFAULT_MAP_SIZE);
        config.set_default("cal.step", DEFAULT_MAP_STEP);
        config.set_default("cal.oversampling", 1i64);
        config.set_default("cal.parallel", true);
        config.set_default("cal.workers", DEFAULT_WORKERS);
    }

    /// Build from a configuration. Missing keys take their defaults.
    pub fn new(config: &Configuration) -> Result<Self> {
        let mut config = config.clone();
        Self::defaults(&mut config);

        let model = OpticalModel::from_config(&config)?;
        let mask = GcuMask::from_config(&config)?;
        let mask_points = mask.point_list();
        let r = model.radius();

        let order = config.get_usize("cal.order")?;
        let normalized: Vec<Vec2> = mask_points.iter().map(|p| p / r).collect();
        let solver = ZernikeSolver::new(&normalized, order)?;

        let step = config.get_f64("cal.step")?;
        let geometry = SamplingGeometry::new(
            config.get_usize("cal.cols")?,
            config.get_usize("cal.rows")?,
            step,
            step,
            Some(r),
        );
        let mut sampler = ErrorSampler::new(model.pointing_transform(), geometry);
        sampler
            .plane_mut()
            .set_oversampling(config.get_usize("cal.oversampling")?);
        if config.get_bool("cal.parallel")? {
            sampler.plane_mut().set_workers(config.get_usize("cal.workers")?)?;
            sampler.plane_mut().set_parallel(true)?;
        }

        let rng = if config.have("cal.seed") {
            StdRng::seed_from_u64(config.get_i64("cal.seed")? as u64)
        } else {
            StdRng::from_rng(&mut rand::rng())
        };

        debug!(
            "Calibration: R = {:.6} m, {} mask points, J = {}",
            r,
            mask_points.len(),
            order
        );

        Ok(Self {
            model,
            mask,
            mask_points,
            order,
            solver,
            sampler,
            strategies: StrategyRegistry::with_defaults(),
            config,
            stage: CalibrationStage::Idle,
            rng,
            points: Vec::new(),
            err_vec: Vec::new(),
            coefficients: None,
            installed: None,
        })
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn stage(&self) -> CalibrationStage {
        self.stage
    }

    /// Number of Zernike coefficients fitted.
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn model(&self) -> &OpticalModel {
        &self.model
    }

    pub fn mask(&self) -> &GcuMask {
        &self.mask
    }

    pub fn mask_points(&self) -> &[Vec2] {
        &self.mask_points
    }

    /// The effective configuration, defaults included.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn sampler(&self) -> &ErrorSampler {
        &self.sampler
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    pub fn strategies_mut(&mut self) -> &mut StrategyRegistry {
        &mut self.strategies
    }

    /// Points of the last measurement.
    pub fn measured_points(&self) -> &[Vec2] {
        &self.points
    }

    /// Error vectors of the last measurement.
    pub fn error_vectors(&self) -> &[Vec2] {
        &self.err_vec
    }

    /// Coefficients of the last fit.
    pub fn coefficients(&self) -> Option<&[Complex<f64>]> {
        self.coefficients.as_deref()
    }

    fn require(&self, action: &'static str, allowed: bool) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(PoaError::InvalidStage {
                action,
                stage: self.stage.to_string(),
            })
        }
    }

    fn install(&mut self, coefficients: Option<Vec<Complex<f64>>>) {
        self.model.set_pointing_model(coefficients.clone());
        self.installed = coefficients;
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Build a new instrument: redraw manufacturing tolerances and drop any
    /// installed correction. Allowed at any stage.
    pub fn manufacture(&mut self) {
        self.install(None);
        self.coefficients = None;
        self.model
            .generate(LifecycleEvent::Manufacture, &mut self.rng);
        self.stage = CalibrationStage::Manufactured;
    }

    /// Start an observing session on the current instrument.
    pub fn start_session(&mut self) -> Result<()> {
        self.require(
            "start a session",
            self.stage >= CalibrationStage::Manufactured,
        )?;
        self.model.generate(LifecycleEvent::Session, &mut self.rng);
        self.stage = CalibrationStage::InSession;
        Ok(())
    }

    fn measure_at(&mut self, points: &[Vec2]) -> Result<()> {
        self.require(
            "measure displacements",
            self.stage >= CalibrationStage::InSession,
        )?;
        self.install(None);
        self.err_vec = self.sampler.process_points(points)?;
        self.points = points.to_vec();
        self.stage = CalibrationStage::Measured;
        Ok(())
    }

    /// Measure the pointing error at every mask point.
    pub fn measure_displacements(&mut self) -> Result<&[Vec2]> {
        let points = self.mask_points.clone();
        self.measure_at(&points)?;
        Ok(&self.err_vec)
    }

    /// Fit the last measurement.
    pub fn solve_pointing_model(&mut self) -> Result<Vec<Complex<f64>>> {
        self.require(
            "solve the pointing model",
            self.stage == CalibrationStage::Measured,
        )?;
        let coefficients = if self.points == self.mask_points {
            self.solver.solve_for(&self.err_vec)?
        } else {
            let r = self.model.radius();
            let normalized: Vec<Vec2> = self.points.iter().map(|p| p / r).collect();
            ZernikeSolver::new(&normalized, self.order)?.solve_for(&self.err_vec)?
        };
        self.coefficients = Some(coefficients.clone());
        self.stage = CalibrationStage::Fitted;
        Ok(coefficients)
    }

    /// Install the last fit in the arm controller.
    pub fn apply_pointing_model(&mut self) -> Result<()> {
        self.require(
            "apply the pointing model",
            self.stage >= CalibrationStage::Fitted,
        )?;
        self.install(self.coefficients.clone());
        self.stage = CalibrationStage::Applied;
        Ok(())
    }

    /// Sample the residual error over the full field. May be repeated; the
    /// fit and the installed correction are left untouched.
    pub fn verify(&mut self) -> Result<Residual> {
        self.require(
            "verify the pointing model",
            self.stage >= CalibrationStage::Applied,
        )?;
        let residual = self.residual()?;
        self.stage = CalibrationStage::Verified;
        info!(
            "Calibration verified: RMS {:.3e} m, max {:.3e} m",
            residual.mse.sqrt(),
            residual.max_se.sqrt()
        );
        Ok(residual)
    }

    /// Residual error at `points`, which must be disjoint from the points of
    /// the fit. Like [`verify`](Self::verify), may be repeated with any
    /// number of points.
    pub fn verify_points(&mut self, points: &[Vec2]) -> Result<Residual> {
        self.require(
            "verify the pointing model",
            self.stage >= CalibrationStage::Applied,
        )?;
        if points.is_empty() {
            return Err(PoaError::ShapeMismatch(
                "no verification points given".into(),
            ));
        }
        if let Some(p) = points.iter().find(|p| self.points.contains(p)) {
            return Err(PoaError::FitPointReused { x: p.x, y: p.y });
        }

        self.sampler.process_points(points)?;
        let err_sq = self.sampler.error_sq();
        let residual = Residual {
            mse: err_sq.iter().sum::<f64>() / err_sq.len() as f64,
            max_se: err_sq.iter().copied().fold(0.0, f64::max),
        };
        self.stage = CalibrationStage::Verified;
        info!(
            "Calibration verified at {} points: RMS {:.3e} m, max {:.3e} m",
            points.len(),
            residual.mse.sqrt(),
            residual.max_se.sqrt()
        );
        Ok(residual)
    }

    fn residual(&mut self) -> Result<Residual> {
        let stats: SamplerStats = self.sampler.process()?;
        debug!(
            "Residual map: {} tiles in {:.3} s",
            stats.tiles, stats.total_secs
        );
        Ok(Residual {
            mse: self.sampler.mean_error_sq(),
            max_se: self.sampler.max_error_sq(),
        })
    }

    // ── One-shot operations ─────────────────────────────────────────────

    /// Measure at `points` and fit; the fit becomes the current coefficients.
    pub fn calibrate(&mut self, points: &[Vec2]) -> Result<Vec<Complex<f64>>> {
        self.measure_at(points)?;
        self.solve_pointing_model()
    }

    /// Full-field residual with `coefficients` installed. The previously
    /// installed correction is restored afterwards.
    pub fn evaluate(&mut self, coefficients: &[Complex<f64>]) -> Result<Residual> {
        let previous = self.installed.take();
        self.install(Some(coefficients.to_vec()));
        let residual = self.residual();
        self.install(previous);
        residual
    }

    /// Mean squared field error with `coefficients` installed (m²).
    pub fn get_mse(&mut self, coefficients: &[Complex<f64>]) -> Result<f64> {
        Ok(self.evaluate(coefficients)?.mse)
    }

    /// Largest squared field error with `coefficients` installed (m²).
    pub fn get_max_se(&mut self, coefficients: &[Complex<f64>]) -> Result<f64> {
        Ok(self.evaluate(coefficients)?.max_se)
    }

    /// Monte Carlo prior of the pointing model: `count` independent
    /// instruments, each measured over the whole mask and fitted.
    pub fn sample_pointing_model(&mut self, count: usize) -> Result<Vec<Vec<Complex<f64>>>> {
        let mut samples = Vec::with_capacity(count);
        for i in 1..=count {
            self.manufacture();
            self.start_session()?;
            self.measure_displacements()?;
            samples.push(self.solve_pointing_model()?);
            if i % 100 == 0 {
                info!("Sampling: {i:5}/{count:5} done");
            }
        }
        Ok(samples)
    }

    /// Calibration points from the named strategy (see
    /// [`StrategyRegistry`]), using `cal.number` points.
    pub fn generate_points(&mut self, strategy: &str, scale: f64) -> Result<Vec<Vec2>> {
        self.strategies
            .generate_points(strategy, &self.mask, &self.config, scale, &mut self.rng)
    }

    /// Calibration points from `cal.strategy` at `cal.scale`.
    pub fn configured_points(&mut self) -> Result<Vec<Vec2>> {
        let strategy = self.config.get_str("cal.strategy")?.to_string();
        let scale = self.config.get_f64("cal.scale")?;
        self.generate_points(&strategy, scale)
    }

    /// Arm trajectory visiting `points`.
    pub fn get_calibration_path(
        &mut self,
        points: &[Vec2],
        opts: &PathOptions,
    ) -> Result<CalibrationPath> {
        plan_path(&self.model.arm(), points, opts, &mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::Axis;

    fn quiet_config() -> Configuration {
        let mut cfg = Configuration::new();
        cfg.set("poa.radius", "0.2 +/- 1e-4 m (flat)");
        cfg.set("poa.arm_instability", "0 m");
        for axis in Axis::ALL {
            cfg.set(&format!("poa.encoder[{axis}].bits"), 0i64);
            cfg.set(&format!("poa.encoder[{axis}].error"), "0 rad");
        }
        cfg.set("cal.cols", 80i64);
        cfg.set("cal.rows", 80i64);
        cfg.set("cal.step", 5e-3);
        cfg.set("cal.parallel", false);
        cfg.set("cal.seed", 7i64);
        cfg
    }

    #[test]
    fn test_stage_order_enforced() {
        let mut cal = Calibration::new(&quiet_config()).unwrap();
        assert_eq!(cal.stage(), CalibrationStage::Idle);
        assert!(matches!(
            cal.start_session(),
            Err(PoaError::InvalidStage { .. })
        ));
        assert!(matches!(
            cal.measure_displacements(),
            Err(PoaError::InvalidStage { .. })
        ));
        cal.manufacture();
        assert!(cal.solve_pointing_model().is_err());
        cal.start_session().unwrap();
        assert!(cal.apply_pointing_model().is_err());
        cal.measure_displacements().unwrap();
        assert!(cal.verify().is_err());
        cal.solve_pointing_model().unwrap();
        // a fit can only be solved once per measurement
        assert!(cal.solve_pointing_model().is_err());
        cal.apply_pointing_model().unwrap();
        cal.verify().unwrap();
        assert_eq!(cal.stage(), CalibrationStage::Verified);
        // verification can be repeated
        cal.verify().unwrap();
        assert_eq!(cal.stage(), CalibrationStage::Verified);

        let err = {
            cal.manufacture();
            cal.verify().unwrap_err()
        };
        assert_eq!(
            err.to_string(),
            "calibration stage error: cannot verify the pointing model while manufactured"
        );
    }

    #[test]
    fn test_verify_points_must_be_disjoint() {
        let mut cal = Calibration::new(&quiet_config()).unwrap();
        cal.manufacture();
        cal.start_session().unwrap();
        let fit_points: Vec<Vec2> = cal.mask_points().iter().step_by(3).copied().collect();
        let others: Vec<Vec2> = cal
            .mask_points()
            .iter()
            .skip(1)
            .step_by(3)
            .copied()
            .collect();
        cal.calibrate(&fit_points).unwrap();
        assert!(matches!(
            cal.verify_points(&others),
            Err(PoaError::InvalidStage { .. })
        ));
        cal.apply_pointing_model().unwrap();

        assert!(matches!(
            cal.verify_points(&[]),
            Err(PoaError::ShapeMismatch(_))
        ));
        let mixed = [others[0], fit_points[2]];
        match cal.verify_points(&mixed) {
            Err(PoaError::FitPointReused { x, y }) => {
                assert_eq!(Vec2::new(x, y), fit_points[2]);
            }
            other => panic!("expected FitPointReused, got {other:?}"),
        }
        assert_eq!(cal.stage(), CalibrationStage::Applied);

        let residual = cal.verify_points(&others).unwrap();
        assert_eq!(cal.stage(), CalibrationStage::Verified);
        assert!(residual.max_se >= residual.mse);
        // second order in the radius error: |p|·(δR/R)² < 1e-7 m
        assert!(residual.max_se < 1e-12, "{residual:?}");
    }

    #[test]
    fn test_radius_error_is_pure_tilt() {
        let mut cal = Calibration::new(&quiet_config()).unwrap();
        cal.manufacture();
        cal.start_session().unwrap();
        cal.measure_displacements().unwrap();
        let a = cal.solve_pointing_model().unwrap();
        assert_eq!(a.len(), 3);
        // e(p) = (1 − R'/R)·p = (1 − R'/R)·R·Z(1,1)
        let r_true = cal.model().arm().manufactured_radius();
        let expected = (0.2 - r_true) / 0.2 * 0.2;
        assert!(a[0].norm() < 1e-12, "{}", a[0]);
        assert!(a[1].norm() < 1e-12, "{}", a[1]);
        assert!((a[2].re - expected).abs() < 1e-12, "{} vs {expected}", a[2]);
        assert!(a[2].im.abs() < 1e-12);
    }

    #[test]
    fn test_coefficient_stats() {
        let samples = vec![
            vec![Complex::new(1.0, 0.0), Complex::new(0.0, 2.0)],
            vec![Complex::new(3.0, 0.0), Complex::new(0.0, 4.0)],
        ];
        let stats = CoefficientStats::from_samples(&samples);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].re_mean, 2.0);
        assert_eq!(stats[0].re_std, 1.0);
        assert_eq!(stats[1].im_mean, 3.0);
        assert_eq!(stats[1].im_std, 1.0);
        assert_eq!(stats[1].label(), "a(-1, 1)");
    }
}
