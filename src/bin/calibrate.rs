use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use vehicle_calibration_rs::{
    discover_trips, BatchOptions, BatchRunner, CalibrationConfig, CancelToken, TripCalibrator,
};

#[derive(Parser, Debug)]
#[command(about = "Compute per-trip vehicle calibration bases")]
struct Args {
    /// Root directory; every directory below it holding raw_acc.txt[.gz] is a trip
    #[arg(long)]
    data_dir: PathBuf,

    /// Only accept OBD speed (skip trips without a usable raw_obd.txt)
    #[arg(long, default_value_t = false)]
    obd: bool,

    /// Recompute even when calibration_para.txt already exists
    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Worker threads (defaults to available parallelism)
    #[arg(long)]
    workers: Option<usize>,

    /// Per-trip time limit in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// JSON file overriding calibration parameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the batch summary as JSON here
    #[arg(long)]
    summary: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    if !args.data_dir.is_dir() {
        bail!("data directory {} does not exist", args.data_dir.display());
    }

    let config = match &args.config {
        Some(path) => CalibrationConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CalibrationConfig::default(),
    };

    let workers = args.workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });

    let trips = discover_trips(&args.data_dir)
        .with_context(|| format!("scanning {}", args.data_dir.display()))?;
    log::info!(
        "found {} trips under {} ({} workers, obd only: {})",
        trips.len(),
        args.data_dir.display(),
        workers,
        args.obd
    );

    let runner = BatchRunner::new(
        TripCalibrator::new(config),
        BatchOptions {
            require_obd: args.obd,
            overwrite: args.overwrite,
            workers,
            trip_timeout: args.timeout_secs.map(Duration::from_secs),
        },
    );
    let summary = runner.run(&trips, &CancelToken::new());

    println!(
        "{} trips: {} computed, {} cached, {} skipped ({} with placeholder forward axis) in {:.1}s",
        summary.total,
        summary.computed,
        summary.cached,
        summary.skipped,
        summary.forward_fallbacks,
        summary.elapsed_secs
    );
    for (kind, count) in &summary.skipped_by_kind {
        println!("  {:<28} {}", kind, count);
    }

    if let Some(path) = &args.summary {
        summary
            .save(path)
            .with_context(|| format!("writing summary {}", path.display()))?;
        log::info!("summary written to {}", path.display());
    }
    Ok(())
}
