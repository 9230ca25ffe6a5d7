use jobhost_packages::PackageError;
use thiserror::Error;

use crate::sink::SinkError;

/// Errors that end a package run.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// No package with this name exists. Raised before anything touches disk.
    #[error("Package not found: {name}")]
    PackageNotFound { name: String },

    /// Loading or extracting the package failed.
    #[error("Package staging failed: {0}")]
    Staging(#[from] PackageError),

    /// The entry file could not be started.
    #[error("Failed to start {program}: {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The child exited with a non-zero code (`-1` when killed by a signal).
    #[error("Process exited with code {exit_code}")]
    ExecutionFailed { exit_code: i32 },

    /// The run was cancelled and the child killed.
    #[error("Run cancelled")]
    Cancelled,

    /// Recording the child's output failed.
    #[error("Failed to record run output: {0}")]
    Output(#[source] SinkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
