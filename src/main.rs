//! # RDMA Sweep - Main Entry Point
//!
//! 1. Parse arguments and initialize logging
//! 2. Merge defaults, the optional JSON settings file and command-line flags,
//!    then validate before any process is launched
//! 3. Run the selected experiment(s), render charts, or show the menu
//! 4. Log a summary of every experiment run and optionally write it as JSON
//!
//! Any fatal error (handshake input closed, unparseable client output,
//! aborted baseline, I/O failure on the result file) ends the program with a
//! non-zero exit status.

use anyhow::Result;
use clap::Parser;
use rdma_sweep::{
    benchmark::{ExperimentKind, SweepReport, SweepRunner},
    cli::{Args, Command},
    config::SweepSettings,
    coordination::OperatorInput,
    logging,
    menu::{Menu, MenuChoice},
    report::ReportRenderer,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Held until exit so the file writer flushes
    let _log_guard = logging::init(args.verbose, args.log_file.as_deref())?;

    info!("Starting RDMA Sweep v{}", rdma_sweep::VERSION);
    let settings = SweepSettings::from_args(&args)?;
    info!("Settings: {:?}", settings);

    let input = OperatorInput::stdin();
    let mut reports = Vec::new();

    match args.command.unwrap_or(Command::Menu) {
        Command::Baseline => {
            reports.push(run_one(ExperimentKind::Baseline, &settings, &input).await?);
        }
        Command::MsgSweep => {
            reports.push(run_one(ExperimentKind::MsgSweep, &settings, &input).await?);
        }
        Command::WindowSweep => {
            reports.push(run_one(ExperimentKind::WindowSweep, &settings, &input).await?);
        }
        Command::All => {
            reports.extend(run_all(&settings, &input).await?);
        }
        Command::Plot => {
            plot(&settings)?;
        }
        Command::Menu => {
            reports.extend(run_menu(&settings, &input).await?);
        }
    }

    for report in &reports {
        info!(
            "Summary: {} - {} points, {} failed, {} rows written to {:?}",
            report.experiment,
            report.points,
            report.failed.len(),
            report.rows_written,
            report.output
        );
        for point in &report.failed {
            warn!("  failed: {} ({})", point.config, point.reason);
        }
    }

    if let Some(path) = &args.summary_json {
        SweepReport::write_json(&reports, path)?;
    }

    info!("RDMA Sweep finished");
    Ok(())
}

/// Run one experiment with a fresh runner
async fn run_one(
    kind: ExperimentKind,
    settings: &SweepSettings,
    input: &OperatorInput,
) -> Result<SweepReport> {
    let mut runner = SweepRunner::from_settings(settings, input.clone());
    runner.run_experiment(kind, settings).await
}

/// Run every experiment in order, sharing one runner; stops at the first error
async fn run_all(settings: &SweepSettings, input: &OperatorInput) -> Result<Vec<SweepReport>> {
    let mut runner = SweepRunner::from_settings(settings, input.clone());
    let mut reports = Vec::with_capacity(ExperimentKind::ALL.len());
    for kind in ExperimentKind::ALL {
        reports.push(runner.run_experiment(kind, settings).await?);
    }
    Ok(reports)
}

/// Render charts from the configured result file
fn plot(settings: &SweepSettings) -> Result<()> {
    let store = rdma_sweep::ResultStore::new(&settings.output);
    let written = ReportRenderer::new(&settings.plot_dir).render(&store)?;
    if written.is_empty() {
        warn!("No charts written; {:?} has no usable rows", settings.output);
    }
    Ok(())
}

/// Interactive loop; returns the reports of everything run before `quit`.
///
/// Any fatal error from a chosen action ends the loop and the program.
async fn run_menu(settings: &SweepSettings, input: &OperatorInput) -> Result<Vec<SweepReport>> {
    Menu::print_banner(settings);
    let menu = Menu::new(input.clone());
    let mut reports = Vec::new();

    loop {
        match menu.next_choice(settings).await? {
            MenuChoice::Run(kind) => reports.push(run_one(kind, settings, input).await?),
            MenuChoice::RunAll => reports.extend(run_all(settings, input).await?),
            MenuChoice::Plot => plot(settings)?,
            MenuChoice::Quit => {
                info!("Exiting.");
                return Ok(reports);
            }
        }
    }
}
