use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use jobhost_core::time::{from_db, now_db, to_db};
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
    listener::{JobExecutor, JobListener},
    schedule::{compute_next_run, validate},
    types::{FireContext, Job, JobData, JobStatus, NewJob, Schedule, SchedulerIdentity, STATE_EXECUTING},
};

/// A firing later than this at startup counts as missed rather than late.
const MISFIRE_THRESHOLD_SECS: i64 = 60;

const JOB_COLUMNS: &str = "id, name, job_group, schedule, job_data, allow_concurrent, status,
     last_run, next_run, run_count, max_runs, created_at, updated_at";

/// Shared handle for job management (list/add/remove/trigger) while the engine loop runs.
#[derive(Clone)]
pub struct SchedulerHandle {
    conn: Arc<Mutex<Connection>>,
}

impl SchedulerHandle {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn add_job(&self, new: NewJob) -> Result<Job> {
        validate(&new.schedule).map_err(SchedulerError::InvalidSchedule)?;
        let now = Utc::now();
        let now_str = to_db(now);
        let next = compute_next_run(&new.schedule, now).map(to_db);
        let id = Uuid::new_v4().to_string();
        let schedule_json = serde_json::to_string(&new.schedule)?;
        let data_json = serde_json::to_string(&new.data)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs
             (id, name, job_group, schedule, job_data, allow_concurrent, status,
              last_run, next_run, run_count, max_runs, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,'pending',NULL,?7,0,?8,?9,?9)",
            rusqlite::params![
                id,
                new.name,
                new.group,
                schedule_json,
                data_json,
                new.allow_concurrent,
                next,
                new.max_runs,
                now_str
            ],
        )?;
        info!(job_id = %id, name = %new.name, package = %new.data.package_name, "job added");

        Ok(Job {
            id,
            name: new.name,
            group: new.group,
            schedule: new.schedule,
            data: new.data,
            allow_concurrent: new.allow_concurrent,
            status: JobStatus::Pending,
            last_run: None,
            next_run: next,
            run_count: 0,
            max_runs: new.max_runs,
            created_at: now_str.clone(),
            updated_at: now_str,
        })
    }

    /// Remove a job by ID. Returns `JobNotFound` if no row is deleted.
    pub fn remove_job(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::JobNotFound { id: id.to_string() });
        }
        info!(job_id = %id, "job removed");
        Ok(())
    }

    pub fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                [id],
                read_job_row,
            )
            .optional()?;
        Ok(row.and_then(job_from_row))
    }

    /// Return all known jobs ordered by creation time.
    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at"))?;
        let jobs = stmt
            .query_map([], read_job_row)?
            .filter_map(|r| r.ok().and_then(job_from_row))
            .collect();
        Ok(jobs)
    }

    /// Make a job due immediately. Works for every schedule kind, including `Cron`.
    pub fn trigger_now(&self, id: &str) -> Result<()> {
        let now = now_db();
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE jobs SET next_run = ?1, status = 'pending', updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, id],
        )?;
        if n == 0 {
            return Err(SchedulerError::JobNotFound { id: id.to_string() });
        }
        info!(job_id = %id, "job triggered manually");
        Ok(())
    }
}

type JobRow = (
    String,
    String,
    String,
    String,
    String,
    bool,
    String,
    Option<String>,
    Option<String>,
    u32,
    Option<u32>,
    String,
    String,
);

fn read_job_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRow> {
    Ok((
        row.get(0)?,  // id
        row.get(1)?,  // name
        row.get(2)?,  // job_group
        row.get(3)?,  // schedule JSON
        row.get(4)?,  // job_data JSON
        row.get(5)?,  // allow_concurrent
        row.get(6)?,  // status
        row.get(7)?,  // last_run
        row.get(8)?,  // next_run
        row.get(9)?,  // run_count
        row.get(10)?, // max_runs
        row.get(11)?, // created_at
        row.get(12)?, // updated_at
    ))
}

/// Rows with undecodable JSON are skipped rather than failing the whole listing.
fn job_from_row(row: JobRow) -> Option<Job> {
    let (
        id,
        name,
        group,
        sched_json,
        data_json,
        allow_concurrent,
        status_str,
        last_run,
        next_run,
        run_count,
        max_runs,
        created_at,
        updated_at,
    ) = row;
    let schedule: Schedule = serde_json::from_str(&sched_json).ok()?;
    let data: JobData = serde_json::from_str(&data_json).ok()?;
    let status: JobStatus = status_str.parse().ok()?;
    Some(Job {
        id,
        name,
        group,
        schedule,
        data,
        allow_concurrent,
        status,
        last_run,
        next_run,
        run_count,
        max_runs,
        created_at,
        updated_at,
    })
}

/// State shared by every in-flight firing.
struct Dispatcher {
    conn: Arc<Mutex<Connection>>,
    identity: SchedulerIdentity,
    executor: Arc<dyn JobExecutor>,
    listeners: Vec<Arc<dyn JobListener>>,
    cancel: CancellationToken,
}

impl Dispatcher {
    async fn fire(self: Arc<Self>, mut ctx: FireContext, allow_concurrent: bool) {
        for listener in &self.listeners {
            listener.job_to_be_executed(&ctx);
        }

        match self.acquire(&ctx, allow_concurrent) {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    job = %ctx.job_name,
                    fire_id = %ctx.fire_instance_id,
                    "job already executing, firing vetoed"
                );
                for listener in &self.listeners {
                    listener.job_execution_vetoed(&ctx);
                }
                return;
            }
            // Tracking is bookkeeping; losing it must not cost the run.
            Err(e) => error!(fire_id = %ctx.fire_instance_id, "failed to record firing: {e}"),
        }

        info!(job = %ctx.job_name, fire_id = %ctx.fire_instance_id, "executing job");
        let started = Instant::now();
        let result = self.executor.execute(&ctx, self.cancel.child_token()).await;
        ctx.run_time = Some(started.elapsed());

        if let Err(e) = self.release(&ctx) {
            error!(fire_id = %ctx.fire_instance_id, "failed to clear firing record: {e}");
        }

        match &result {
            Ok(()) => info!(
                job = %ctx.job_name,
                fire_id = %ctx.fire_instance_id,
                run_ms = ctx.run_time.unwrap_or_default().as_millis() as u64,
                "job finished"
            ),
            Err(failure) => warn!(
                job = %ctx.job_name,
                fire_id = %ctx.fire_instance_id,
                error = %failure,
                "job failed"
            ),
        }

        for listener in &self.listeners {
            listener.job_was_executed(&ctx, result.as_ref().err());
        }
    }

    /// Record the firing as executing. `Ok(false)` means it must be vetoed.
    fn acquire(&self, ctx: &FireContext, allow_concurrent: bool) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        if !allow_concurrent {
            let running: i64 = conn.query_row(
                "SELECT COUNT(*) FROM fired_triggers WHERE job_id = ?1 AND state = ?2",
                rusqlite::params![ctx.job_id, STATE_EXECUTING],
                |row| row.get(0),
            )?;
            if running > 0 {
                return Ok(false);
            }
        }
        conn.execute(
            "INSERT INTO fired_triggers
             (entry_id, sched_name, instance_name, job_id, job_name, job_group,
              trigger_name, trigger_group, fired_time, sched_time, state)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            rusqlite::params![
                ctx.fire_instance_id,
                self.identity.sched_name,
                self.identity.instance_name,
                ctx.job_id,
                ctx.job_name,
                ctx.job_group,
                ctx.trigger_name,
                ctx.trigger_group,
                to_db(ctx.fired_time),
                to_db(ctx.scheduled_time),
                STATE_EXECUTING
            ],
        )?;
        Ok(true)
    }

    fn release(&self, ctx: &FireContext) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM fired_triggers WHERE entry_id = ?1",
            [&ctx.fire_instance_id],
        )?;
        Ok(())
    }
}

/// Core scheduler: fires due jobs and drives every firing through listeners and executor.
pub struct SchedulerEngine {
    conn: Arc<Mutex<Connection>>,
    dispatcher: Arc<Dispatcher>,
    tracker: TaskTracker,
    poll_interval: Duration,
    checkin_interval: Duration,
}

impl SchedulerEngine {
    /// Create a new engine, initialising the DB schema if needed.
    pub fn new(
        conn: Connection,
        identity: SchedulerIdentity,
        executor: Arc<dyn JobExecutor>,
        listeners: Vec<Arc<dyn JobListener>>,
    ) -> Result<Self> {
        init_db(&conn)?;
        let conn = Arc::new(Mutex::new(conn));
        let dispatcher = Arc::new(Dispatcher {
            conn: Arc::clone(&conn),
            identity,
            executor,
            listeners,
            cancel: CancellationToken::new(),
        });
        Ok(Self {
            conn,
            dispatcher,
            tracker: TaskTracker::new(),
            poll_interval: Duration::from_secs(1),
            checkin_interval: Duration::from_secs(15),
        })
    }

    pub fn with_intervals(mut self, poll: Duration, checkin: Duration) -> Self {
        self.poll_interval = poll;
        self.checkin_interval = checkin;
        self
    }

    /// A management handle sharing the engine's connection.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            conn: Arc::clone(&self.conn),
        }
    }

    pub fn identity(&self) -> &SchedulerIdentity {
        &self.dispatcher.identity
    }

    /// Main event loop. Runs until `shutdown` broadcasts `true`, then cancels
    /// in-flight firings and waits for them to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            sched = %self.identity().sched_name,
            instance = %self.identity().instance_name,
            "scheduler engine started"
        );
        self.recover_on_startup();

        let mut poll = tokio::time::interval(self.poll_interval);
        let mut checkin = tokio::time::interval(self.checkin_interval);
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.fire_due(Utc::now()) {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = checkin.tick() => {
                    if let Err(e) = self.check_in(Utc::now()) {
                        error!("scheduler check-in failed: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }

        self.dispatcher.cancel.cancel();
        self.drain().await;
        info!("scheduler engine stopped");
    }

    async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    // --- private helpers ---------------------------------------------------

    /// Clear firings this instance left behind and reschedule jobs whose time
    /// passed while it was offline. Once jobs in the past become Missed.
    /// Jobs due within the misfire threshold (e.g. just triggered) still fire.
    fn recover_on_startup(&self) {
        let identity = &self.dispatcher.identity;
        let now = Utc::now();
        let now_str = to_db(now);
        let cutoff = to_db(now - chrono::Duration::seconds(MISFIRE_THRESHOLD_SECS));
        let conn = self.conn.lock().unwrap();

        match conn.execute(
            "DELETE FROM fired_triggers WHERE sched_name = ?1 AND instance_name = ?2",
            rusqlite::params![identity.sched_name, identity.instance_name],
        ) {
            Ok(n) if n > 0 => warn!(count = n, "stale firings from a previous run cleared"),
            Err(e) => error!("stale firing cleanup failed: {e}"),
            _ => {}
        }

        let overdue: Vec<(String, String)> = match conn
            .prepare(
                "SELECT id, schedule FROM jobs
                 WHERE status = 'pending' AND next_run IS NOT NULL AND next_run < ?1",
            )
            .and_then(|mut stmt| {
                let rows = stmt
                    .query_map([&cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>();
                rows
            }) {
            Ok(rows) => rows,
            Err(e) => {
                error!("overdue job query failed: {e}");
                return;
            }
        };

        for (id, sched_json) in overdue {
            let Ok(schedule) = serde_json::from_str::<Schedule>(&sched_json) else {
                error!(job_id = %id, "bad schedule JSON");
                continue;
            };
            let result = match &schedule {
                Schedule::Once { .. } => conn.execute(
                    "UPDATE jobs SET status = 'missed', updated_at = ?1 WHERE id = ?2",
                    rusqlite::params![now_str, id],
                ),
                recurring => conn.execute(
                    "UPDATE jobs SET next_run = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![compute_next_run(recurring, now).map(to_db), now_str, id],
                ),
            };
            match result {
                Ok(_) => warn!(job_id = %id, "job was overdue at startup"),
                Err(e) => error!(job_id = %id, "overdue job update failed: {e}"),
            }
        }
    }

    /// Upsert this instance's heartbeat row.
    fn check_in(&self, now: DateTime<Utc>) -> Result<()> {
        let identity = &self.dispatcher.identity;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO scheduler_state (sched_name, instance_name, last_checkin_time, checkin_interval)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(sched_name, instance_name) DO UPDATE SET
                last_checkin_time = excluded.last_checkin_time,
                checkin_interval  = excluded.checkin_interval",
            rusqlite::params![
                identity.sched_name,
                identity.instance_name,
                to_db(now),
                self.checkin_interval.as_millis() as i64
            ],
        )?;
        Ok(())
    }

    /// Fire every job whose next_run has arrived. Returns how many fired.
    fn fire_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let now_str = to_db(now);
        let due: Vec<Job> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs
                 WHERE status = 'pending' AND next_run IS NOT NULL AND next_run <= ?1
                 ORDER BY next_run"
            ))?;
            let rows: Vec<JobRow> = stmt
                .query_map([&now_str], read_job_row)?
                .filter_map(|r| r.ok())
                .collect();
            rows.into_iter().filter_map(job_from_row).collect()
        };

        let mut fired = 0;
        for job in due {
            let new_count = job.run_count + 1;
            // next is None when the schedule is exhausted (Once after first fire,
            // Cron, or max_runs reached).
            let next = if job.max_runs.is_some_and(|m| new_count >= m) {
                None
            } else {
                compute_next_run(&job.schedule, now)
            };
            let new_status = if next.is_none() {
                JobStatus::Completed
            } else {
                JobStatus::Pending
            };

            self.conn.lock().unwrap().execute(
                "UPDATE jobs SET status=?1, last_run=?2, next_run=?3, run_count=?4, updated_at=?2
                 WHERE id=?5",
                rusqlite::params![new_status.to_string(), now_str, next.map(to_db), new_count, job.id],
            )?;

            let scheduled_time = job.next_run.as_deref().and_then(from_db).unwrap_or(now);
            let ctx = FireContext {
                fire_instance_id: Uuid::now_v7().to_string(),
                sched_name: self.dispatcher.identity.sched_name.clone(),
                instance_name: self.dispatcher.identity.instance_name.clone(),
                job_id: job.id.clone(),
                job_name: job.name,
                job_group: job.group.clone(),
                trigger_name: job.id,
                trigger_group: job.group,
                scheduled_time,
                fired_time: now,
                next_fire_time: next,
                schedule_expression: job.schedule.expression(),
                data: job.data,
                run_time: None,
            };
            self.tracker
                .spawn(Arc::clone(&self.dispatcher).fire(ctx, job.allow_concurrent));
            fired += 1;
        }
        Ok(fired)
    }
}
