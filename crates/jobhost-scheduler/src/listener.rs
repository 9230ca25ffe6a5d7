use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::types::FireContext;

/// Observer of job firings, registered with the engine for all jobs.
///
/// Methods return nothing: a listener cannot fail a firing or disturb the
/// engine. Implementations handle their own errors (log and move on).
/// They are called from the firing's task, concurrently across unrelated
/// firings, and must be cheap and non-blocking.
pub trait JobListener: Send + Sync {
    /// Used in log correlation.
    fn name(&self) -> &str;

    /// The job is about to run (or be vetoed).
    fn job_to_be_executed(&self, ctx: &FireContext);

    /// The engine decided not to run this firing.
    fn job_execution_vetoed(&self, ctx: &FireContext);

    /// The executor returned. `ctx.run_time` is set.
    fn job_was_executed(&self, ctx: &FireContext, failure: Option<&JobFailure>);
}

/// The work performed for every firing.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Run one firing to completion. `cancel` fires when the engine shuts down.
    async fn execute(&self, ctx: &FireContext, cancel: CancellationToken) -> Result<(), JobFailure>;
}

/// Why a firing failed, as recorded in history.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct JobFailure {
    /// One-line summary.
    pub message: String,
    /// Full error text including every underlying cause.
    pub details: String,
}

impl JobFailure {
    pub fn new(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: details.into(),
        }
    }

    /// Build from any error, walking its `source()` chain for the details.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let message = err.to_string();
        let mut details = message.clone();
        let mut source = err.source();
        while let Some(cause) = source {
            details.push_str("\nCaused by: ");
            details.push_str(&cause.to_string());
            source = cause.source();
        }
        Self { message, details }
    }
}
