//! End-to-end calibration tests: select points on the mask, measure a
//! simulated arm, fit a Zernike model and check the residual field error.

use nalgebra::Complex;
use poacal::calibration::{factory, CalibrationStrategy, DistanceNorm, PathOptions};
use poacal::{Calibration, CalibrationStage, CoefficientStats, Configuration, GcuMask, PoaError, Vec2};
use rand::RngCore;

/// Arm whose only imperfection is its manufactured radius.
fn radius_error_config(seed: i64) -> Configuration {
    let mut cfg = Configuration::new();
    cfg.set("poa.radius", "0.2 +/- 1e-4 m (flat)");
    cfg.set("poa.arm_instability", "0 m");
    for axis in ["theta", "phi"] {
        cfg.set(&format!("poa.encoder[{axis}].bits"), 0i64);
        cfg.set(&format!("poa.encoder[{axis}].error"), "0 rad");
    }
    cfg.set("cal.cols", 100i64);
    cfg.set("cal.rows", 100i64);
    cfg.set("cal.step", 4e-3);
    cfg.set("cal.seed", seed);
    cfg
}

fn installed_model(cal: &Calibration) -> Option<Vec<Complex<f64>>> {
    cal.model()
        .arm()
        .error_model()
        .map(|z| z.coefficients().to_vec())
}

#[test]
fn test_strategies_return_points_inside_mask() {
    let mut cfg = radius_error_config(1);
    cfg.set("cal.number", 15i64);
    let mut cal = Calibration::new(&cfg).unwrap();
    let lattice = cal.mask_points().to_vec();

    for name in ["random", "spiral", "ring"] {
        let points = cal.generate_points(name, 0.95).unwrap();
        assert_eq!(points.len(), 15, "strategy {name}");
        for p in &points {
            assert!(cal.mask().contains(*p), "{name}: {p} outside the mask");
            assert!(lattice.contains(p), "{name}: {p} is not a mask point");
        }
    }

    assert!(matches!(
        cal.generate_points("grid", 1.0),
        Err(PoaError::UnknownStrategy(_))
    ));
}

#[test]
fn test_calibration_reduces_field_error() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let mut cal = Calibration::new(&radius_error_config(3)).unwrap();
    cal.manufacture();
    cal.start_session().unwrap();

    let points = cal.generate_points("spiral", 0.9).unwrap();
    let coefficients = cal.calibrate(&points).unwrap();
    assert_eq!(coefficients.len(), cal.order());
    assert_eq!(cal.stage(), CalibrationStage::Fitted);

    let before = cal.get_mse(&[Complex::new(0.0, 0.0); 3]).unwrap();
    let max_before = cal.get_max_se(&[Complex::new(0.0, 0.0); 3]).unwrap();
    cal.apply_pointing_model().unwrap();
    let residual = cal.verify().unwrap();

    println!(
        "RMS before {:.3e} m, after {:.3e} m",
        before.sqrt(),
        residual.mse.sqrt()
    );
    assert!(before > 0.0);
    assert!(max_before >= before);
    assert!(
        residual.mse < 1e-3 * before,
        "residual {:.3e} not below {:.3e}",
        residual.mse,
        before
    );
    assert!(residual.max_se < 1e-3 * max_before);
}

#[test]
fn test_repeated_verification_keeps_fit() {
    let mut cal = Calibration::new(&radius_error_config(8)).unwrap();
    cal.manufacture();
    cal.start_session().unwrap();
    let points = cal.generate_points("spiral", 0.9).unwrap();
    let fitted = cal.calibrate(&points).unwrap();
    cal.apply_pointing_model().unwrap();
    let model = installed_model(&cal);
    assert_eq!(model.as_deref(), Some(fitted.as_slice()));

    let first = cal.verify().unwrap();
    let second = cal.verify().unwrap();
    assert_eq!(first, second);
    assert_eq!(cal.stage(), CalibrationStage::Verified);

    // two disjoint sets of different sizes, none of them fit points
    let unused: Vec<Vec2> = cal
        .mask_points()
        .iter()
        .filter(|p| !points.contains(p))
        .copied()
        .collect();
    for set in [&unused[..20], &unused[20..60]] {
        let residual = cal.verify_points(set).unwrap();
        assert!(residual.mse <= residual.max_se);
        assert!(residual.max_se < 1e-12, "{residual:?}");
    }
    assert!(matches!(
        cal.verify_points(&points[..1]),
        Err(PoaError::FitPointReused { .. })
    ));

    assert_eq!(cal.verify().unwrap(), first);
    assert_eq!(cal.coefficients(), Some(fitted.as_slice()));
    assert_eq!(installed_model(&cal), model);
    assert_eq!(cal.stage(), CalibrationStage::Verified);
}

#[test]
fn test_evaluate_restores_installed_model() {
    let mut cal = Calibration::new(&radius_error_config(5)).unwrap();
    cal.manufacture();
    cal.start_session().unwrap();
    cal.measure_displacements().unwrap();
    cal.solve_pointing_model().unwrap();
    cal.apply_pointing_model().unwrap();

    let installed = cal.model().arm().error_model().map(|z| z.coefficients().to_vec());
    cal.get_mse(&[Complex::new(1e-3, 0.0)]).unwrap();
    let after = cal.model().arm().error_model().map(|z| z.coefficients().to_vec());
    assert_eq!(installed, after);
    assert_eq!(cal.stage(), CalibrationStage::Applied);
}

#[test]
fn test_monte_carlo_prior() {
    let mut cal = Calibration::new(&radius_error_config(11)).unwrap();
    let samples = cal.sample_pointing_model(20).unwrap();
    assert_eq!(samples.len(), 20);
    assert!(samples.iter().all(|s| s.len() == 3));

    let stats = CoefficientStats::from_samples(&samples);
    assert_eq!(stats.len(), 3);
    // Radius errors only produce a real tilt: |a(1,1)| ≤ 1e-4 m
    let tilt = &stats[2];
    assert_eq!((tilt.m, tilt.n), (1, 1));
    assert!(tilt.re_std > 0.0 && tilt.re_std < 1e-4);
    assert!(tilt.re_mean.abs() < 1e-4);
    assert!(tilt.im_std < 1e-12);
    assert!(stats[0].re_std < 1e-12 && stats[1].re_std < 1e-12);

    // Same seed, same instruments
    let mut again = Calibration::new(&radius_error_config(11)).unwrap();
    assert_eq!(again.sample_pointing_model(20).unwrap(), samples);
}

#[test]
fn test_default_instrument() {
    let mut cfg = Configuration::new();
    cfg.set("cal.seed", 2i64);
    cfg.set("cal.parallel", false);
    let mut cal = Calibration::new(&cfg).unwrap();
    assert_eq!(cal.order(), 3);
    assert!(cal.mask_points().len() > 100);

    let samples = cal.sample_pointing_model(3).unwrap();
    for a in samples.iter().flatten() {
        assert!(a.re.is_finite() && a.im.is_finite());
        // encoder quantization and alignment keep errors well under 1 cm
        assert!(a.norm() < 1e-2, "{a}");
    }
}

#[test]
fn test_calibration_path_through_strategy_points() {
    let mut cal = Calibration::new(&radius_error_config(4)).unwrap();
    let points = cal.generate_points("ring", 0.8).unwrap();
    let opts = PathOptions {
        norm: DistanceNorm::Max,
        random_start: true,
        settle_time: 2.0,
        ..Default::default()
    };
    let path = cal.get_calibration_path(&points, &opts).unwrap();

    assert_eq!(path.ordered_points.len(), points.len());
    assert_eq!(path.segment_bounds.len(), points.len());
    assert!(path.times.windows(2).all(|w| w[1] >= w[0]));
    for (&k, p) in path.segment_bounds.iter().zip(&path.ordered_points) {
        assert!((path.xy[k] - p).norm() < 1e-9);
    }
    assert!(path.duration() >= 2.0 * points.len() as f64);
}

#[derive(Debug)]
struct Corners(GcuMask);

impl CalibrationStrategy for Corners {
    fn name(&self) -> &str {
        "corners"
    }

    fn count(&self) -> usize {
        4
    }

    fn generate_points(&self, scale: f64, _rng: &mut dyn RngCore) -> poacal::Result<Vec<Vec2>> {
        let s = scale / 2f64.sqrt();
        let pattern = [
            Vec2::new(s, s),
            Vec2::new(-s, s),
            Vec2::new(-s, -s),
            Vec2::new(s, -s),
        ];
        Ok(self.0.closest(&self.0.unnormalize_all(&pattern)))
    }
}

#[test]
fn test_custom_strategy() {
    let mut cal = Calibration::new(&radius_error_config(6)).unwrap();
    cal.strategies_mut()
        .register(
            "corners",
            factory(|mask: &GcuMask, _: &Configuration| Ok(Corners(mask.clone()))),
        )
        .unwrap();
    assert!(cal
        .strategies_mut()
        .register(
            "corners",
            factory(|mask: &GcuMask, _: &Configuration| Ok(Corners(mask.clone())))
        )
        .is_err());

    let points = cal.generate_points("corners", 0.9).unwrap();
    assert_eq!(points.len(), 4);
    assert!(points.iter().all(|p| cal.mask().contains(*p)));

    // four points are enough for J = 3
    cal.manufacture();
    cal.start_session().unwrap();
    assert_eq!(cal.calibrate(&points).unwrap().len(), 3);
}
