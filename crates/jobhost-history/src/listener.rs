use std::sync::Arc;

use jobhost_scheduler::{FireContext, JobFailure, JobListener};
use tracing::error;

use crate::store::HistoryStore;

/// Scheduler listener that keeps `job_history` in step with every firing.
///
/// Storage failures are logged here and never reach the scheduler.
pub struct HistoryListener {
    store: Arc<HistoryStore>,
}

impl HistoryListener {
    pub fn new(store: Arc<HistoryStore>) -> Self {
        Self { store }
    }
}

impl JobListener for HistoryListener {
    fn name(&self) -> &str {
        "history"
    }

    fn job_to_be_executed(&self, ctx: &FireContext) {
        if let Err(e) = self.store.record_started(ctx) {
            error!(fire_id = %ctx.fire_instance_id, job = %ctx.job_name, "failed to record job start: {e}");
        }
    }

    fn job_execution_vetoed(&self, ctx: &FireContext) {
        if let Err(e) = self.store.record_vetoed(&ctx.fire_instance_id) {
            error!(fire_id = %ctx.fire_instance_id, job = %ctx.job_name, "failed to record veto: {e}");
        }
    }

    fn job_was_executed(&self, ctx: &FireContext, failure: Option<&JobFailure>) {
        let run_time = ctx.run_time.unwrap_or_default();
        if let Err(e) = self
            .store
            .record_completed(&ctx.fire_instance_id, run_time, failure)
        {
            error!(fire_id = %ctx.fire_instance_id, job = %ctx.job_name, "failed to record job completion: {e}");
        }
    }
}
