//! Pointing error simulator.
//!
//! Runs a Monte Carlo over manufactured instruments and prints the prior of
//! the fitted pointing model, one line per real and imaginary part of every
//! Zernike coefficient. With `--residual`, also calibrates one instrument
//! with the chosen strategy and reports the residual field error.
//!
//! Usage:
//! ```text
//! cargo run --release --bin pointingsim -- -N 1000
//! cargo run --release --bin pointingsim -- --config poa.json --set poa.radius="0.2 +/- 5e-5 m (gauss)"
//! cargo run --release --bin pointingsim -- -N 200 --order 6 --strategy ring --points 21 --residual
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use nalgebra::Complex;
use tracing_subscriber::EnvFilter;

use poacal::{Calibration, CoefficientStats, Configuration};

#[derive(Parser)]
#[command(name = "pointingsim")]
#[command(about = "Simulate the pointing error of a pick-off arm")]
#[command(version)]
struct Args {
    /// Model configuration (JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override a configuration entry (`section.key=value`); repeatable
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    tweaks: Vec<String>,

    /// Number of simulated instruments
    #[arg(short = 'N', long, default_value_t = 1000)]
    number: usize,

    /// Number of Zernike coefficients fitted
    #[arg(short = 'J', long)]
    order: Option<usize>,

    /// Calibration point strategy for `--residual`
    #[arg(long)]
    strategy: Option<String>,

    /// Number of calibration points for `--residual`
    #[arg(short, long)]
    points: Option<usize>,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Sample the field on a single thread
    #[arg(long)]
    serial: bool,

    /// Calibrate one instrument and report the residual field error
    #[arg(short, long)]
    residual: bool,
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
    if let Some(order) = args.order {
        config.set("cal.order", order);
    }
    if let Some(strategy) = &args.strategy {
        config.set("cal.strategy", strategy.as_str());
    }
    if let Some(points) = args.points {
        config.set("cal.number", points);
    }
    if let Some(seed) = args.seed {
        config.set("cal.seed", seed as i64);
    }
    if args.serial {
        config.set("cal.parallel", false);
    }
    Ok(config)
}

fn print_summary(args: &Args, cal: &Calibration) -> Result<()> {
    let config = cal.config();
    println!("PointingSim: the pointing error simulator");
    match &args.config {
        Some(path) => println!("  Model configuration file: {}", path.display()),
        None => println!("  Model configuration file: (built-in defaults)"),
    }
    if !args.tweaks.is_empty() {
        println!("  Model overrides:");
        for tweak in &args.tweaks {
            println!("    {tweak}");
        }
    }
    println!(
        "  Arm radius:            {}",
        config.as_string("poa.radius").unwrap_or_default()
    );
    println!("  Mask points:           {}", cal.mask_points().len());
    println!("  Zernike coefficients:  {}", cal.order());
    println!("  Number of simulations: {}", args.number);
    if args.residual {
        println!(
            "  Residual check:        {} strategy, {} points",
            config.get_str("cal.strategy")?,
            config.get_usize("cal.number")?
        );
    }
    println!();
    Ok(())
}

fn run_prior(cal: &mut Calibration, count: usize) -> Result<()> {
    let samples = cal
        .sample_pointing_model(count)
        .context("Monte Carlo sampling failed")?;
    println!("Prior for the pointing model (J = {}):", cal.order());
    for s in CoefficientStats::from_samples(&samples) {
        let label = s.label();
        for (part, mean, std) in [("Re", s.re_mean, s.re_std), ("Im", s.im_mean, s.im_std)] {
            println!(
                "  {part}[{label:8}] = {mean:+.5e} ± {std:.1e} ({:.2}%)",
                std / mean.abs() * 100.0
            );
        }
        println!();
    }
    Ok(())
}

fn run_residual(cal: &mut Calibration) -> Result<()> {
    cal.manufacture();
    cal.start_session()?;
    let points = cal.configured_points()?;
    let coefficients = cal.calibrate(&points)?;
    let uncorrected = cal.get_mse(&vec![Complex::new(0.0, 0.0); coefficients.len()])?;
    cal.apply_pointing_model()?;
    let residual = cal.verify()?;

    println!("Residual after calibration ({} points):", points.len());
    println!("  RMS before:  {:.3e} m", uncorrected.sqrt());
    println!("  RMS after:   {:.3e} m", residual.mse.sqrt());
    println!("  MSE:         {:.3e} m²", residual.mse);
    println!("  Max SE:      {:.3e} m²", residual.max_se);
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let config = model_config(args)?;
    let mut cal = Calibration::new(&config).context("failed to build calibration model")?;
    print_summary(args, &cal)?;

    println!("Running...");
    run_prior(&mut cal, args.number)?;
    if args.residual {
        run_residual(&mut cal).context("calibration cycle failed")?;
    }
    Ok(())
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
