//! Synchronous execution of external commands.
//!
//! Every raster operation is delegated to an external program. A failed
//! invocation is returned as a `ToolError` for the caller to log; nothing here
//! retries or times out.

use crate::error::ToolError;
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::process::Command;

/// A fully built external command: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<OsString>,
}

impl ToolCommand {
    /// Start a command from a configured prefix (program followed by leading args).
    ///
    /// An empty prefix yields an empty program name, which fails at launch.
    pub fn from_prefix(prefix: &[String]) -> Self {
        let mut parts = prefix.iter();
        let program = parts.next().cloned().unwrap_or_default();
        Self {
            program,
            args: parts.map(OsString::from).collect(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// Arguments as lossy strings, for inspection and logging.
    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Executes external commands.
///
/// Implementations return the combined stdout/stderr text on success.
pub trait CommandRunner {
    fn run(&self, command: &ToolCommand) -> Result<String, ToolError>;
}

/// Runs commands as child processes and waits for them to exit.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &ToolCommand) -> Result<String, ToolError> {
        tracing::debug!("exec: {}", command);

        let output = Command::new(&command.program)
            .args(&command.args)
            .output()
            .map_err(|source| ToolError::Launch {
                command: command.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(ToolError::Exit {
                command: command.to_string(),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        let mut combined = stdout.into_owned();
        if !stderr.trim().is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        Ok(combined)
    }
}

/// Run a command and log its output; failures are logged and handed back.
pub fn run_logged<R: CommandRunner + ?Sized>(runner: &R, command: &ToolCommand) -> Result<(), ToolError> {
    match runner.run(command) {
        Ok(output) => {
            let output = output.trim();
            if !output.is_empty() {
                tracing::debug!("{}", output);
            }
            Ok(())
        }
        Err(e) => {
            tracing::warn!("{}", e);
            Err(e)
        }
    }
}
