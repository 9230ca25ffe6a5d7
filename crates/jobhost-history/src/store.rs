use std::sync::Mutex;
use std::time::Duration;

use jobhost_core::time::to_db;
use jobhost_scheduler::{FireContext, JobFailure};
use rusqlite::Connection;
use tracing::debug;

use crate::error::{HistoryError, Result};

/// Reads and writes `job_history` and the run output tables.
///
/// Writes come from [`HistoryListener`](crate::HistoryListener); queries
/// live in [`query`](crate::query).
pub struct HistoryStore {
    pub(crate) db: Mutex<Connection>,
    pub(crate) signal_timeout: Duration,
}

impl HistoryStore {
    /// Wrap an initialised connection. `signal_timeout` is the watchdog window
    /// used to flag runs that stopped signalling.
    pub fn new(conn: Connection, signal_timeout: Duration) -> Self {
        Self {
            db: Mutex::new(conn),
            signal_timeout,
        }
    }

    /// Insert the row for a firing about to run. The signal time starts at
    /// the scheduled time.
    pub fn record_started(&self, ctx: &FireContext) -> Result<()> {
        let sched_time = to_db(ctx.scheduled_time);
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO job_history
             (id, sched_name, instance_name, job_name, job_group, package_name,
              trigger_name, trigger_group, fired_time, sched_time, last_signal_time,
              next_fire_time, cron_expression)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?10,?11,?12)",
            rusqlite::params![
                ctx.fire_instance_id,
                ctx.sched_name,
                ctx.instance_name,
                ctx.job_name,
                ctx.job_group,
                ctx.data.package_name,
                ctx.trigger_name,
                ctx.trigger_group,
                to_db(ctx.fired_time),
                sched_time,
                ctx.next_fire_time.map(to_db),
                ctx.schedule_expression
            ],
        )?;
        debug!(fire_id = %ctx.fire_instance_id, job = %ctx.job_name, "history entry started");
        Ok(())
    }

    /// Mark a firing vetoed. Only a row that has not completed can be vetoed.
    pub fn record_vetoed(&self, fire_instance_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE job_history SET vetoed = 1 WHERE id = ?1 AND completed = 0",
            [fire_instance_id],
        )?;
        if n == 0 {
            return Err(HistoryError::NotFound {
                id: fire_instance_id.to_string(),
            });
        }
        Ok(())
    }

    /// Mark a firing completed, with the failure if there was one.
    pub fn record_completed(
        &self,
        fire_instance_id: &str,
        run_time: Duration,
        failure: Option<&JobFailure>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE job_history
             SET completed = 1, run_time = ?1, has_error = ?2, error_message = ?3, error_details = ?4
             WHERE id = ?5 AND vetoed = 0",
            rusqlite::params![
                run_time.as_millis() as i64,
                failure.is_some(),
                failure.map(|f| f.message.as_str()),
                failure.map(|f| f.details.as_str()),
                fire_instance_id
            ],
        )?;
        if n == 0 {
            return Err(HistoryError::NotFound {
                id: fire_instance_id.to_string(),
            });
        }
        Ok(())
    }
}
