use std::sync::Arc;
use std::time::Duration;

use jobhost_core::JobhostConfig;
use jobhost_history::{HistoryListener, HistoryStore, RunOutputStore};
use jobhost_packages::PackageStore;
use jobhost_runner::{BroadcastEventBus, LogMailTransport, PackageJob, PackageRunner};
use jobhost_scheduler::{JobListener, SchedulerEngine, SchedulerIdentity};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::open_db;

/// Wire packages, runner and history into the scheduler and run until Ctrl-C.
pub async fn run(config: JobhostConfig) -> anyhow::Result<()> {
    let db_path = &config.database.path;

    let identity = SchedulerIdentity {
        sched_name: config.scheduler.name.clone(),
        instance_name: config
            .scheduler
            .instance_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
    };

    // build subsystems, each with its own connection
    let packages = Arc::new(PackageStore::new(open_db(db_path)?));
    let history = Arc::new(HistoryStore::new(
        open_db(db_path)?,
        Duration::from_secs(config.history.signal_timeout_secs),
    ));
    let output = Arc::new(RunOutputStore::new(open_db(db_path)?));
    let events = Arc::new(BroadcastEventBus::new());

    // mirror live console output into the daemon log
    let mut console = events.subscribe();
    tokio::spawn(async move {
        loop {
            match console.recv().await {
                Ok(event) => debug!(
                    job_run_id = %event.job_run_id,
                    is_error = event.is_error,
                    "console: {}",
                    event.content
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "console mirror lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let runner = Arc::new(PackageRunner::new(
        packages,
        output,
        Arc::new(LogMailTransport),
        events,
        &config.runner.temp_root,
        config.mail.from.clone(),
    ));

    let listeners: Vec<Arc<dyn JobListener>> = vec![Arc::new(HistoryListener::new(history))];
    let engine = SchedulerEngine::new(
        open_db(db_path)?,
        identity.clone(),
        Arc::new(PackageJob::new(runner)),
        listeners,
    )?
    .with_intervals(
        Duration::from_millis(config.scheduler.poll_interval_ms),
        Duration::from_secs(config.scheduler.checkin_interval_secs),
    );

    // spawn scheduler engine loop in background
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_task = tokio::spawn(engine.run(shutdown_rx));
    info!(
        sched = %identity.sched_name,
        instance = %identity.instance_name,
        temp_root = %config.runner.temp_root,
        "jobhost serving, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    // signal scheduler to stop; it cancels running jobs and waits for them
    let _ = shutdown_tx.send(true);
    engine_task.await?;
    Ok(())
}
