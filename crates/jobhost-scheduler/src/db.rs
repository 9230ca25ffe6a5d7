use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `jobs`, `fired_triggers` and `scheduler_state` tables
/// (idempotent) and an index on `next_run` so the polling query stays cheap.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id               TEXT    NOT NULL PRIMARY KEY,
            name             TEXT    NOT NULL,
            job_group        TEXT    NOT NULL DEFAULT 'DEFAULT',
            schedule         TEXT    NOT NULL,   -- JSON-encoded Schedule enum
            job_data         TEXT    NOT NULL,   -- JSON-encoded JobData
            allow_concurrent INTEGER NOT NULL DEFAULT 1,
            status           TEXT    NOT NULL DEFAULT 'pending',
            last_run         TEXT,               -- RFC3339 or NULL
            next_run         TEXT,               -- RFC3339 or NULL
            run_count        INTEGER NOT NULL DEFAULT 0,
            max_runs         INTEGER,            -- NULL means unlimited
            created_at       TEXT    NOT NULL,
            updated_at       TEXT    NOT NULL
        ) STRICT;

        -- Efficient polling: SELECT … WHERE next_run <= ?  ORDER BY next_run
        CREATE INDEX IF NOT EXISTS idx_jobs_next_run ON jobs (next_run);

        -- One row per firing that is currently executing.
        CREATE TABLE IF NOT EXISTS fired_triggers (
            entry_id       TEXT NOT NULL PRIMARY KEY,
            sched_name     TEXT NOT NULL,
            instance_name  TEXT NOT NULL,
            job_id         TEXT NOT NULL,
            job_name       TEXT NOT NULL,
            job_group      TEXT NOT NULL,
            trigger_name   TEXT NOT NULL,
            trigger_group  TEXT NOT NULL,
            fired_time     TEXT NOT NULL,
            sched_time     TEXT NOT NULL,
            state          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_fired_triggers_job ON fired_triggers (job_id, state);

        -- Cluster membership heartbeats.
        CREATE TABLE IF NOT EXISTS scheduler_state (
            sched_name         TEXT    NOT NULL,
            instance_name      TEXT    NOT NULL,
            last_checkin_time  TEXT    NOT NULL,
            checkin_interval   INTEGER NOT NULL,  -- milliseconds
            PRIMARY KEY (sched_name, instance_name)
        );
        ",
    )?;
    Ok(())
}
