//! Detector rendering through the pick-off image chain.

use poacal::{Configuration, DetectorGeometry, GcuMask, ImageSampler, JointAngles, OpticalModel};

fn detector_sampler(angles: JointAngles) -> ImageSampler {
    let mut cfg = Configuration::new();
    cfg.set("ccd.width", 32i64);
    cfg.set("ccd.height", 32i64);
    cfg.set("ccd.pixel_width", "10 um");
    cfg.set("ccd.pixel_height", "10 um");
    OpticalModel::defaults(&mut cfg);
    GcuMask::defaults(&mut cfg);
    DetectorGeometry::defaults(&mut cfg);

    let model = OpticalModel::from_config(&cfg).unwrap();
    model.move_to(angles);
    let mut sampler = ImageSampler::new(GcuMask::from_config(&cfg).unwrap(), model.transform());
    sampler.set_detector(&DetectorGeometry::from_config(&cfg).unwrap());
    sampler.plane_mut().set_oversampling(4);
    sampler
}

#[test]
fn test_parked_arm_sees_central_pinhole() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    // at θ = φ = 0 the pick-off is centered on the mask
    let mut sampler = detector_sampler(JointAngles::new(0.0, 0.0));
    sampler.integrate().unwrap();
    let flux = sampler.total_flux();
    assert!(flux > 0.0);

    let ccd = sampler.ccd();
    assert_eq!(ccd[(0, 0)], 0.0);
    assert!(ccd[(16, 16)] > 0.0);

    let path = std::env::temp_dir().join(format!("poacal_sgsim_{}.png", std::process::id()));
    sampler.save_png(&path).unwrap();
    let img = image::open(&path).unwrap();
    assert_eq!((img.width(), img.height()), (32, 32));
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_arm_between_pinholes_sees_nothing() {
    // pick-off center ≈ (0.14 mm, 7.5 mm), halfway between two pinholes
    let alpha = (0.0075f64 / 0.2).asin();
    let mut sampler = detector_sampler(JointAngles::new(0.0, alpha));
    sampler.integrate().unwrap();
    assert_eq!(sampler.total_flux(), 0.0);
}
