use rusqlite::Connection;

use crate::error::Result;

/// Initialise the history tables. Idempotent.
///
/// Every table is keyed by the fire instance id of the run (`job_history.id`,
/// `job_run_id` elsewhere). Attachments with a NULL `email_id` belong to the
/// run directly rather than to one of its emails.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS job_history (
            id                TEXT    NOT NULL PRIMARY KEY,
            sched_name        TEXT    NOT NULL,
            instance_name     TEXT    NOT NULL,
            job_name          TEXT    NOT NULL,
            job_group         TEXT    NOT NULL,
            package_name      TEXT    NOT NULL,
            trigger_name      TEXT    NOT NULL,
            trigger_group     TEXT    NOT NULL,
            fired_time        TEXT    NOT NULL,
            sched_time        TEXT    NOT NULL,
            last_signal_time  TEXT    NOT NULL,
            run_time          INTEGER,            -- milliseconds, NULL until completed
            has_error         INTEGER NOT NULL DEFAULT 0,
            error_message     TEXT,
            error_details     TEXT,
            vetoed            INTEGER NOT NULL DEFAULT 0,
            completed         INTEGER NOT NULL DEFAULT 0,
            next_fire_time    TEXT,
            cron_expression   TEXT    NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_job_history_sched_time ON job_history (sched_time);
        CREATE INDEX IF NOT EXISTS idx_job_history_fired_time ON job_history (fired_time);
        CREATE INDEX IF NOT EXISTS idx_job_history_job_name ON job_history (job_name);

        CREATE TABLE IF NOT EXISTS job_run_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            job_run_id  TEXT    NOT NULL,
            content     TEXT    NOT NULL,
            is_error    INTEGER NOT NULL DEFAULT 0,
            create_time TEXT    NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_job_run_log_run ON job_run_log (job_run_id);

        CREATE TABLE IF NOT EXISTS job_run_email (
            id           TEXT    NOT NULL PRIMARY KEY,
            job_run_id   TEXT    NOT NULL,
            subject      TEXT    NOT NULL,
            body         TEXT    NOT NULL,
            message_to   TEXT    NOT NULL,
            message_cc   TEXT    NOT NULL,
            message_bcc  TEXT    NOT NULL,
            is_sent      INTEGER NOT NULL DEFAULT 0,
            create_time  TEXT    NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_job_run_email_run ON job_run_email (job_run_id);

        CREATE TABLE IF NOT EXISTS job_run_attachment (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            job_run_id    TEXT    NOT NULL,
            email_id      TEXT    REFERENCES job_run_email (id) ON DELETE CASCADE,
            name          TEXT    NOT NULL,
            content_type  TEXT    NOT NULL,
            content       BLOB    NOT NULL,
            create_time   TEXT    NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_job_run_attachment_run ON job_run_attachment (job_run_id);
        ",
    )?;
    Ok(())
}
