//! Chart Tiles Pipeline
//!
//! Turns published aeronautical chart rasters into single-file tiled map
//! databases. The raster work itself (reprojection, tiling, quantization,
//! packaging) is done by external tools; this crate decides what runs, in which
//! order, on which files, and what gets cached between runs.
//!
//! # Architecture
//!
//! - **Dates**: pick the one valid chart cycle date for the run
//! - **Naming**: normalize chart file names and discover chart areas
//! - **Workspace**: per-run folder tree and the persistent download cache
//! - **Tools**: external command construction and execution
//! - **Pipeline**: per-chart stage sequencing, command batches, run report
//!
//! # Usage
//!
//! ```no_run
//! use chart_tiles::{Config, run_pipeline};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file(&"settings.yaml".into())?;
//!     run_pipeline(&config)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dates;
pub mod error;
pub mod job;
pub mod naming;
pub mod pipeline;
pub mod tools;
pub mod workspace;

pub use config::Config;
pub use dates::{resolve_chart_date, ChartDate};
pub use error::{PipelineError, ToolError};
pub use job::ChartJob;
pub use pipeline::{JobSummary, RunReport, Sequencer, Stage, StageOutcome};
pub use tools::{CommandRunner, ProcessRunner};
pub use workspace::Workspace;

use anyhow::Result;
use chrono::{Local, NaiveDate};

/// Resolve the chart date for `today` from the configured candidates.
pub fn resolve_run_date(config: &Config, today: NaiveDate) -> Result<ChartDate> {
    let candidates = config.candidate_dates()?;
    Ok(resolve_chart_date(today, &candidates)?)
}

/// Resolve the date and the jobs a run would process, without touching disk.
pub fn plan_jobs(config: &Config, today: NaiveDate) -> Result<(ChartDate, Workspace, Vec<ChartJob>)> {
    config.validate()?;
    let date = resolve_run_date(config, today)?;
    let workspace = Workspace::new(&config.workspace, &date);
    let jobs = config
        .selected_charts()
        .into_iter()
        .map(|entry| ChartJob::new(entry, &config.download, &workspace, &date))
        .collect();
    Ok((date, workspace, jobs))
}

/// Run the full pipeline for today with real external tools.
pub fn run_pipeline(config: &Config) -> Result<RunReport> {
    run_pipeline_with(config, Local::now().date_naive(), &ProcessRunner)
}

/// Run the full pipeline for `today`, executing commands through `runner`.
pub fn run_pipeline_with(
    config: &Config,
    today: NaiveDate,
    runner: &dyn CommandRunner,
) -> Result<RunReport> {
    config.validate()?;

    // Without a cycle date nothing can be downloaded or named.
    let date = resolve_run_date(config, today)?;
    tracing::info!("Using chart date {}", date);

    let mut report = RunReport::start();

    let workspace = Workspace::new(&config.workspace, &date);
    workspace.prepare()?;

    let sequencer = Sequencer::new(config, &workspace, date, runner)?;
    for summary in sequencer.run_all()? {
        report.add_job(summary);
    }

    if config.workspace.clean_process_folders {
        if let Err(e) = workspace.clean() {
            tracing::warn!("Cleanup of {} failed: {}", workspace.root().display(), e);
        }
    }

    report.finish();
    report.log();

    Ok(report)
}
