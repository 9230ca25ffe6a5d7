use std::sync::Arc;

use async_trait::async_trait;
use jobhost_scheduler::{FireContext, JobExecutor, JobFailure};
use tokio_util::sync::CancellationToken;

use crate::runner::PackageRunner;

/// Scheduler executor that runs the package named in the job's data.
///
/// The fire instance id becomes the job run id, so log lines, emails and
/// history rows of one firing share a key.
pub struct PackageJob {
    runner: Arc<PackageRunner>,
}

impl PackageJob {
    pub fn new(runner: Arc<PackageRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl JobExecutor for PackageJob {
    async fn execute(&self, ctx: &FireContext, cancel: CancellationToken) -> Result<(), JobFailure> {
        if ctx.data.package_name.is_empty() {
            return Err(JobFailure::new(
                "Job has no package",
                format!("job {} ({}) carries no packageName in its data", ctx.job_name, ctx.job_id),
            ));
        }
        self.runner
            .run(
                &ctx.fire_instance_id,
                &ctx.data.package_name,
                &ctx.data.arguments,
                cancel,
            )
            .await
            .map_err(|e| JobFailure::from_error(&e))
    }
}
