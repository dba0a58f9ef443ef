//! Runs the stages of every selected chart job, in order, past failures.

use crate::config::{ChartEntry, Config, ZoomRange};
use crate::dates::ChartDate;
use crate::error::Result;
use crate::job::ChartJob;
use crate::pipeline::{JobSummary, Stage, StageContext, StageStatus};
use crate::tools::{CommandRunner, Toolchain};
use crate::workspace::Workspace;
use std::time::Instant;

/// Sequential stage runner for chart jobs.
pub struct Sequencer<'a> {
    config: &'a Config,
    workspace: &'a Workspace,
    date: ChartDate,
    zoom: ZoomRange,
    runner: &'a dyn CommandRunner,
}

impl<'a> Sequencer<'a> {
    pub fn new(
        config: &'a Config,
        workspace: &'a Workspace,
        date: ChartDate,
        runner: &'a dyn CommandRunner,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            workspace,
            date,
            zoom: config.tiles.zoom()?,
            runner,
        })
    }

    /// Build the job context for a chart entry.
    pub fn job_for(&self, entry: &ChartEntry) -> ChartJob {
        ChartJob::new(entry, &self.config.download, self.workspace, &self.date)
    }

    /// Run every stage for one chart.
    ///
    /// Recoverable stage errors are logged and recorded; only a fatal error is
    /// returned.
    pub fn run_job(&self, entry: &ChartEntry) -> Result<JobSummary> {
        let job = self.job_for(entry);
        let mut summary = JobSummary::new(&job.chart_name);

        tracing::info!(
            "Processing {} chart {} (work name {})",
            job.category,
            job.chart_name,
            job.work_name
        );

        tracing::info!("Creating working area subfolders");
        if let Err(e) = self.workspace.prepare_chart(job.stage_dirs()) {
            tracing::error!("Skipping {}: {}", job.chart_name, e);
            summary.setup_error = Some(e.to_string());
            return Ok(summary);
        }

        let ctx = StageContext {
            job: &job,
            tiles: &self.config.tiles,
            zoom: self.zoom,
            tools: Toolchain::new(&self.config.tools),
            runner: self.runner,
            cache_dir: self.workspace.cache(),
        };

        for stage in Stage::ORDER {
            let start = Instant::now();
            match stage.run(&ctx) {
                Ok(outcome) => {
                    tracing::info!(
                        "[{}] {}: {} in {:.1}s",
                        job.chart_name,
                        stage,
                        outcome,
                        start.elapsed().as_secs_f64()
                    );
                    summary.record(stage, StageStatus::Done(outcome));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!("[{}] {} failed: {}", job.chart_name, stage, e);
                    summary.record(stage, StageStatus::Failed(e.to_string()));
                }
            }
        }

        Ok(summary)
    }

    /// Run all selected charts in configuration order.
    pub fn run_all(&self) -> Result<Vec<JobSummary>> {
        self.config
            .selected_charts()
            .into_iter()
            .map(|entry| self.run_job(entry))
            .collect()
    }
}
