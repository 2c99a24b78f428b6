//! Secondary guiding simulator.
//!
//! Parks the pick-off arm at fixed joint angles, renders the GCU mask through
//! the image chain onto a detector and saves the integrated frame as a PNG.
//!
//! Usage:
//! ```text
//! cargo run --release --bin sgsim -- --parallel
//! cargo run --release --bin sgsim -- --theta "10 deg" --phi "20 deg" --width 512 --height 512
//! cargo run --release --bin sgsim -- --px-width "7 um" --px-height "7 um" --focal-length "2 m" -o frame.png
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use poacal::quantity::Dimension;
use poacal::{Configuration, DetectorGeometry, GcuMask, ImageSampler, JointAngles, OpticalModel};

#[derive(Parser)]
#[command(name = "sgsim")]
#[command(about = "Simulate the GCU mask as projected on the guiding detector")]
#[command(version)]
struct Args {
    /// Model configuration (JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override a configuration entry (`section.key=value`); repeatable
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    tweaks: Vec<String>,

    /// Output PNG file (default: generated from the time and detector size)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Detector width in pixels
    #[arg(long)]
    width: Option<usize>,

    /// Detector height in pixels
    #[arg(long)]
    height: Option<usize>,

    /// Pixel width, e.g. "14 um"
    #[arg(long)]
    px_width: Option<String>,

    /// Pixel height, e.g. "14 um"
    #[arg(long)]
    px_height: Option<String>,

    /// Detector focal length, e.g. "1 m"
    #[arg(long)]
    focal_length: Option<String>,

    /// Observed source
    #[arg(long, default_value = "gcu")]
    source: String,

    /// Pick-off arm theta angle, e.g. "10 deg"
    #[arg(long, default_value = "0 rad")]
    theta: String,

    /// Pick-off arm phi angle, e.g. "10 deg"
    #[arg(long, default_value = "0 rad")]
    phi: String,

    /// Sub-samples per pixel edge
    #[arg(long, default_value_t = 8)]
    oversampling: usize,

    /// Integrate on the worker pool
    #[arg(long)]
    parallel: bool,
}

fn model_config(args: &Args) -> Result<Configuration> {
    let mut config = match &args.config {
        Some(path) => Configuration::load_json(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => Configuration::new(),
    };
    for tweak in &args.tweaks {
        config
            .apply_override(tweak)
            .with_context(|| format!("invalid override `{tweak}`"))?;
    }
    if let Some(width) = args.width {
        config.set("ccd.width", width);
    }
    if let Some(height) = args.height {
        config.set("ccd.height", height);
    }
    if let Some(px) = &args.px_width {
        config.set("ccd.pixel_width", px.as_str());
    }
    if let Some(px) = &args.px_height {
        config.set("ccd.pixel_height", px.as_str());
    }
    if let Some(f) = &args.focal_length {
        config.set("ccd.focal_length", f.as_str());
    }
    config.set("poa.theta", args.theta.as_str());
    config.set("poa.phi", args.phi.as_str());
    config.set("integrator.oversampling", args.oversampling);
    config.set("integrator.parallel", args.parallel);

    OpticalModel::defaults(&mut config);
    GcuMask::defaults(&mut config);
    DetectorGeometry::defaults(&mut config);
    Ok(config)
}

fn default_output(detector: &DetectorGeometry) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    PathBuf::from(format!(
        "sgsim_{stamp}_{}x{}.png",
        detector.cols, detector.rows
    ))
}

struct Simulator {
    angles: JointAngles,
    detector: DetectorGeometry,
    oversampling: usize,
    parallel: bool,
    output: PathBuf,
    sampler: ImageSampler,
}

impl Simulator {
    fn new(args: &Args, config: &Configuration) -> Result<Self> {
        if args.source != "gcu" {
            bail!("unsupported source image plane `{}`", args.source);
        }
        let angles = JointAngles::new(
            config.get_si_quantity("poa.theta", Dimension::Angle)?.value(),
            config.get_si_quantity("poa.phi", Dimension::Angle)?.value(),
        );
        let detector = DetectorGeometry::from_config(config)?;
        let oversampling = config.get_usize("integrator.oversampling")?;
        let parallel = config.get_bool("integrator.parallel")?;

        let model = OpticalModel::from_config(config).context("failed to build optical model")?;
        model.move_to(angles);
        let mut sampler = ImageSampler::new(GcuMask::from_config(config)?, model.transform());
        sampler.set_detector(&detector);
        sampler.plane_mut().set_oversampling(oversampling);
        sampler.plane_mut().set_parallel(parallel)?;

        let output = args
            .output
            .clone()
            .unwrap_or_else(|| default_output(&detector));

        Ok(Self {
            angles,
            detector,
            oversampling,
            parallel,
            output,
            sampler,
        })
    }

    fn print_summary(&self) {
        let d = &self.detector;
        println!("SGSim: the secondary guiding simulator");
        println!("  Pick-off arm configuration:");
        println!("    theta = {:.4}º", self.angles.theta.to_degrees());
        println!("    phi   = {:.4}º", self.angles.phi.to_degrees());
        println!("  CCD geometry: {}x{}", d.cols, d.rows);
        println!(
            "  Pixel size: {} µm x {} µm",
            d.pixel_width * 1e6,
            d.pixel_height * 1e6
        );
        println!("  Plate scale: {:.4} \"/mm", d.plate_scale());
        println!(
            "  Oversampling: {0}x{0} ({1})",
            self.oversampling,
            self.oversampling * self.oversampling
        );
        println!("  Parallelize: {}", if self.parallel { "yes" } else { "no" });
        println!("  Output file: {}", self.output.display());
        println!();
    }

    fn run(&mut self) -> Result<()> {
        let stats = self.sampler.integrate().context("integration failed")?;
        info!("Total flux: {:.4e}", self.sampler.total_flux());
        self.sampler
            .save_png(&self.output)
            .with_context(|| format!("failed to save {}", self.output.display()))?;

        println!(
            "{} slices, {:.3e} ± {:.1e} s per slice",
            stats.tiles, stats.mean_tile_secs, stats.std_tile_secs
        );
        println!("Total execution time: {:.2} s", stats.total_secs);
        Ok(())
    }
}

fn run(args: &Args) -> Result<()> {
    let config = model_config(args)?;
    let mut sim = Simulator::new(args, &config)?;
    sim.print_summary();

    println!("Tracing...");
    sim.run()
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Simulator error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
