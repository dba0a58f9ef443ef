//! Error types for the chart pipeline.
//!
//! Two classes of failure exist. A fatal error stops the whole run before any
//! chart job starts; everything else is recoverable and is logged by the
//! sequencer before it moves on to the next unit of work.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single external tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The program could not be started at all (missing binary, permissions).
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran but exited unsuccessfully.
    #[error("`{command}` exited with {}: {stderr}", describe_exit(.code))]
    Exit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "signal".to_string(),
    }
}

/// Errors produced by pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No candidate publication date falls inside the valid window.
    #[error("no chart cycle date within [-20, +36] days of {today} among {candidates} candidates")]
    NoValidCycle { today: NaiveDate, candidates: usize },

    /// A candidate date string could not be parsed.
    #[error("unrecognized chart date '{0}'")]
    InvalidDate(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the run instead of being logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NoValidCycle { .. } | Self::InvalidDate(_))
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
