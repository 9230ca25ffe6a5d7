use std::sync::Mutex;

use chrono::{DateTime, Utc};
use jobhost_core::time::{now_db, to_db};
use jobhost_protocol::EmailRequest;
use jobhost_runner::{RunOutputSink, SinkError};
use rusqlite::Connection;
use uuid::Uuid;

use crate::error::Result;

/// Write side for the output of running jobs.
///
/// Has its own connection so the runner's hot write path does not queue
/// behind dashboard queries.
pub struct RunOutputStore {
    db: Mutex<Connection>,
}

impl RunOutputStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Store an attachment that belongs to the run itself, not to an email.
    pub fn save_attachment(
        &self,
        job_run_id: &str,
        file_name: &str,
        content_type: &str,
        content: &[u8],
    ) -> Result<i64> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO job_run_attachment
             (job_run_id, email_id, name, content_type, content, create_time)
             VALUES (?1, NULL, ?2, ?3, ?4, ?5)",
            rusqlite::params![job_run_id, file_name, content_type, content, now_db()],
        )?;
        Ok(db.last_insert_rowid())
    }
}

impl RunOutputSink for RunOutputStore {
    fn append_log(&self, job_run_id: &str, content: &str, is_error: bool) -> std::result::Result<(), SinkError> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO job_run_log (job_run_id, content, is_error, create_time)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![job_run_id, content, is_error, now_db()],
        )?;
        Ok(())
    }

    fn create_email(&self, job_run_id: &str, email: &EmailRequest) -> std::result::Result<String, SinkError> {
        let id = Uuid::new_v4().to_string();
        let now = now_db();
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute(
            "INSERT INTO job_run_email
             (id, job_run_id, subject, body, message_to, message_cc, message_bcc, is_sent, create_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
            rusqlite::params![
                id,
                job_run_id,
                email.subject,
                email.body,
                email.to,
                email.cc,
                email.bcc,
                now
            ],
        )?;
        for attachment in &email.attachments {
            tx.execute(
                "INSERT INTO job_run_attachment
                 (job_run_id, email_id, name, content_type, content, create_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    job_run_id,
                    id,
                    attachment.file_name,
                    attachment.content_type,
                    attachment.content,
                    now
                ],
            )?;
        }
        tx.commit()?;
        Ok(id)
    }

    fn mark_email_sent(&self, email_id: &str) -> std::result::Result<(), SinkError> {
        let db = self.db.lock().unwrap();
        db.execute("UPDATE job_run_email SET is_sent = 1 WHERE id = ?1", [email_id])?;
        Ok(())
    }

    fn refresh_signal(&self, job_run_id: &str, at: DateTime<Utc>) -> std::result::Result<(), SinkError> {
        let at = to_db(at);
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE job_history SET last_signal_time = ?1
             WHERE id = ?2 AND last_signal_time < ?1",
            rusqlite::params![at, job_run_id],
        )?;
        Ok(())
    }
}
