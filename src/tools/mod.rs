//! External tool invocation: command construction and execution.

mod commands;
mod runner;

pub use commands::{Toolchain, TARGET_SRS};
pub use runner::{run_logged, CommandRunner, ProcessRunner, ToolCommand};
