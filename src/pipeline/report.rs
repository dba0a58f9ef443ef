//! Per-job stage outcomes and the end-of-run timing report.

use crate::pipeline::{Stage, StageOutcome};
use chrono::{Duration, Local, NaiveDateTime};
use std::fmt;

/// How one stage of one job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Done(StageOutcome),
    Failed(String),
}

/// Stage results for one chart job.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub chart_name: String,
    pub stages: Vec<(Stage, StageStatus)>,
    /// Set when the job could not start (working folders not created)
    pub setup_error: Option<String>,
}

impl JobSummary {
    pub fn new(chart_name: impl Into<String>) -> Self {
        Self {
            chart_name: chart_name.into(),
            stages: Vec::new(),
            setup_error: None,
        }
    }

    pub fn record(&mut self, stage: Stage, status: StageStatus) {
        self.stages.push((stage, status));
    }

    pub fn status(&self, stage: Stage) -> Option<&StageStatus> {
        self.stages.iter().find(|(s, _)| *s == stage).map(|(_, status)| status)
    }

    pub fn failed_stages(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|(_, status)| matches!(status, StageStatus::Failed(_)))
            .map(|(stage, _)| *stage)
            .collect()
    }

    /// Stages that completed with some failed units (an area, an image).
    pub fn partial_stages(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|(_, status)| matches!(status, StageStatus::Done(outcome) if outcome.has_failures()))
            .map(|(stage, _)| *stage)
            .collect()
    }

    /// Whether anything in this job went wrong.
    pub fn has_problems(&self) -> bool {
        self.setup_error.is_some()
            || !self.failed_stages().is_empty()
            || !self.partial_stages().is_empty()
    }
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(err) = &self.setup_error {
            return write!(f, "{}: not started ({})", self.chart_name, err);
        }

        let failed = self.failed_stages();
        write!(
            f,
            "{}: {} stages ok, {} failed",
            self.chart_name,
            self.stages.len() - failed.len(),
            failed.len()
        )?;
        if !failed.is_empty() {
            let names: Vec<_> = failed.iter().map(Stage::name).collect();
            write!(f, " ({})", names.join(", "))?;
        }
        let partial = self.partial_stages();
        if !partial.is_empty() {
            let names: Vec<_> = partial.iter().map(Stage::name).collect();
            write!(f, "; partial: {}", names.join(", "))?;
        }
        Ok(())
    }
}

/// Format a duration as `H:MM:SS`.
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Wall-clock timing and job summaries for one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    started: NaiveDateTime,
    finished: Option<NaiveDateTime>,
    jobs: Vec<JobSummary>,
}

impl RunReport {
    /// Start timing now (local time).
    pub fn start() -> Self {
        Self::started_at(Local::now().naive_local())
    }

    pub fn started_at(started: NaiveDateTime) -> Self {
        Self {
            started,
            finished: None,
            jobs: Vec::new(),
        }
    }

    pub fn add_job(&mut self, job: JobSummary) {
        self.jobs.push(job);
    }

    pub fn jobs(&self) -> &[JobSummary] {
        &self.jobs
    }

    /// Stop timing now (local time).
    pub fn finish(&mut self) {
        self.finish_at(Local::now().naive_local());
    }

    pub fn finish_at(&mut self, finished: NaiveDateTime) {
        self.finished = Some(finished);
    }

    pub fn started(&self) -> NaiveDateTime {
        self.started
    }

    /// End time, moved forward a day when local time wrapped past midnight.
    pub fn finished(&self) -> Option<NaiveDateTime> {
        self.finished.map(|end| {
            if end < self.started {
                end + Duration::days(1)
            } else {
                end
            }
        })
    }

    /// Elapsed time, available once finished.
    pub fn elapsed(&self) -> Option<Duration> {
        self.finished().map(|end| end - self.started)
    }

    /// Log the job summaries and the timing lines.
    pub fn log(&self) {
        for job in &self.jobs {
            if job.has_problems() {
                tracing::warn!("{}", job);
            } else {
                tracing::info!("{}", job);
            }
        }

        tracing::info!("Start time: {}", self.started().format("%Y-%m-%d %H:%M:%S"));
        if let (Some(end), Some(elapsed)) = (self.finished(), self.elapsed()) {
            tracing::info!("End time: {}", end.format("%Y-%m-%d %H:%M:%S"));
            tracing::info!("Total processing time: {}", format_hms(elapsed));
        }
    }
}
