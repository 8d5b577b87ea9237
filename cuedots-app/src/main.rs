mod display;
mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use cuedots_experiment::{
    CsvDesign, EndReason, JsonLinesSink, MarkerLog, Rig, SessionController, TaskMode,
};
use cuedots_timing::HighPrecisionTimer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::settings::{AppConfig, OutputPaths, SessionInfo};

/// Cued color/motion discrimination with random-dot stimuli.
#[derive(Debug, Parser)]
#[command(name = "cuedots", version)]
#[command(after_help = "Example: cuedots --sub 12 --run 1 --mode instruct")]
struct Args {
    /// Subject ID
    #[arg(short, long, default_value_t = 999)]
    sub: u32,

    /// Run ID
    #[arg(short, long, default_value_t = 999)]
    run: u32,

    /// test: a few trials without instructions; instruct: first block; main: everything
    #[arg(long, default_value = "main")]
    mode: TaskMode,

    /// Skip the demographics questions
    #[arg(long)]
    no_demographics: bool,

    /// Counterbalanced design table
    #[arg(long, default_value = "stimuli/design.csv")]
    design: PathBuf,

    /// TOML file with [experiment] and [render] tables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for trial records, flip markers and session metadata
    #[arg(long, default_value = "data")]
    out: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;
    let design = CsvDesign::open(&args.design, Some(args.sub))
        .with_context(|| format!("opening design {}", args.design.display()))?;

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("creating output directory {}", args.out.display()))?;
    let paths = OutputPaths::new(&args.out, args.sub, args.run);

    let clock = HighPrecisionTimer::new();
    let experiment = config.experiment;
    let feedback_text = (
        experiment.feedback_text(true).to_string(),
        experiment.feedback_text(false).to_string(),
    );
    let (screen, keyboard) = display::open(config.render, feedback_text, clock)?;

    let reported_refresh_hz = screen.refresh_hz();
    if let Some(hz) = reported_refresh_hz {
        if (hz - experiment.refresh_hz).abs() > 1.0 {
            tracing::warn!(
                reported = hz,
                configured = experiment.refresh_hz,
                "monitor refresh rate differs from the configured one"
            );
        }
    }

    SessionInfo {
        subject: args.sub,
        run: args.run,
        mode: args.mode,
        demographics: !args.no_demographics,
        version: env!("CARGO_PKG_VERSION"),
        started: Local::now(),
        design: args.design.clone(),
        reported_refresh_hz,
        config: experiment.clone(),
    }
    .write(&paths.session)?;

    let sink = JsonLinesSink::append_to(&paths.trials)
        .with_context(|| format!("opening {}", paths.trials.display()))?;
    let markers = MarkerLog::create(&paths.markers)
        .with_context(|| format!("creating {}", paths.markers.display()))?;
    let mut rig = Rig::acquire(screen, keyboard, markers, sink);

    tracing::info!(sub = args.sub, run = args.run, mode = %args.mode, "starting session");
    let summary = SessionController::new(experiment, args.mode, clock).run(&mut rig, design)?;

    match summary.end {
        EndReason::Completed => tracing::info!(
            trials = summary.trials_run,
            correct = summary.correct,
            overruns = summary.overruns,
            "session complete, records in {}",
            paths.trials.display()
        ),
        EndReason::Aborted => tracing::warn!(
            trials = summary.trials_run,
            "session ended early at the participant's request"
        ),
    }
    Ok(())
}
