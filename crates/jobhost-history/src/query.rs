use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use jobhost_core::time::{from_db, to_db};
use jobhost_scheduler::types::STATE_EXECUTING;
use rusqlite::OptionalExtension;
use tracing::instrument;

use crate::{
    error::Result,
    store::HistoryStore,
    types::{
        ChartBucket, ExecutionHistoryEntry, HistoryDetail, HistoryEntryView, HistoryStatistics,
        RunAttachment, RunEmail, RunLogLine,
    },
};

const BUCKET_MINUTES: u32 = 15;

const ENTRY_COLUMNS: &str = "id, sched_name, instance_name, job_name, job_group, package_name,
     trigger_name, trigger_group, fired_time, sched_time, last_signal_time, run_time,
     has_error, error_message, vetoed, completed, next_fire_time, cron_expression";

/// True when a run is neither completed nor vetoed and its last signal is
/// more than `window` before `now`. Exactly `window` is not a timeout.
pub fn has_signal_timeout(entry: &ExecutionHistoryEntry, now: DateTime<Utc>, window: Duration) -> bool {
    if entry.completed || entry.vetoed {
        return false;
    }
    let Some(last_signal) = from_db(&entry.last_signal_time) else {
        return false;
    };
    let Ok(window) = chrono::Duration::from_std(window) else {
        return false;
    };
    now.signed_duration_since(last_signal) > window
}

/// Start of the 15-minute window containing `ts`.
fn bucket_start(ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let minute = ts.minute() - ts.minute() % BUCKET_MINUTES;
    ts.date_naive()
        .and_hms_opt(ts.hour(), minute, 0)
        .map(|naive| naive.and_utc())
}

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionHistoryEntry> {
    Ok(ExecutionHistoryEntry {
        id: row.get(0)?,
        sched_name: row.get(1)?,
        instance_name: row.get(2)?,
        job_name: row.get(3)?,
        job_group: row.get(4)?,
        package_name: row.get(5)?,
        trigger_name: row.get(6)?,
        trigger_group: row.get(7)?,
        fired_time: row.get(8)?,
        sched_time: row.get(9)?,
        last_signal_time: row.get(10)?,
        run_time_ms: row.get(11)?,
        has_error: row.get(12)?,
        error_message: row.get(13)?,
        vetoed: row.get(14)?,
        completed: row.get(15)?,
        next_fire_time: row.get(16)?,
        cron_expression: row.get(17)?,
    })
}

impl HistoryStore {
    fn view(&self, entry: ExecutionHistoryEntry, now: DateTime<Utc>) -> HistoryEntryView {
        let has_signal_timeout = has_signal_timeout(&entry, now, self.signal_timeout);
        HistoryEntryView {
            entry,
            has_signal_timeout,
        }
    }

    /// One page of history, newest scheduled time first, plus the total count.
    ///
    /// An empty `job_name` matches every job. `page` is 1-based; values below
    /// 1 are treated as the first page.
    #[instrument(skip(self))]
    pub fn list_history(
        &self,
        job_name: &str,
        page_size: usize,
        page: usize,
    ) -> Result<(Vec<HistoryEntryView>, usize)> {
        let offset = page.saturating_sub(1).saturating_mul(page_size);
        let now = Utc::now();
        let db = self.db.lock().unwrap();

        let total: i64 = db.query_row(
            "SELECT COUNT(*) FROM job_history WHERE (?1 = '' OR job_name = ?1)",
            [job_name],
            |row| row.get(0),
        )?;
        let mut stmt = db.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM job_history
             WHERE (?1 = '' OR job_name = ?1)
             ORDER BY sched_time DESC, fired_time DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let entries = stmt
            .query_map(
                rusqlite::params![job_name, sql_count(page_size), sql_count(offset)],
                read_entry,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let items = entries.into_iter().map(|e| self.view(e, now)).collect();
        Ok((items, total as usize))
    }

    /// The entry with its log lines, emails and attachments.
    pub fn get_detail(&self, id: &str) -> Result<Option<HistoryDetail>> {
        let db = self.db.lock().unwrap();
        let Some(entry) = db
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM job_history WHERE id = ?1"),
                [id],
                read_entry,
            )
            .optional()?
        else {
            return Ok(None);
        };

        let logs = db
            .prepare(
                "SELECT id, job_run_id, content, is_error, create_time
                 FROM job_run_log WHERE job_run_id = ?1 ORDER BY id",
            )?
            .query_map([id], |row| {
                Ok(RunLogLine {
                    id: row.get(0)?,
                    job_run_id: row.get(1)?,
                    content: row.get(2)?,
                    is_error: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let emails = db
            .prepare(
                "SELECT id, job_run_id, subject, body, message_to, message_cc, message_bcc,
                        is_sent, create_time
                 FROM job_run_email WHERE job_run_id = ?1 ORDER BY create_time, id",
            )?
            .query_map([id], |row| {
                Ok(RunEmail {
                    id: row.get(0)?,
                    job_run_id: row.get(1)?,
                    subject: row.get(2)?,
                    body: row.get(3)?,
                    to: row.get(4)?,
                    cc: row.get(5)?,
                    bcc: row.get(6)?,
                    is_sent: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let attachments = db
            .prepare(
                "SELECT id, job_run_id, email_id, name, content_type, content, create_time
                 FROM job_run_attachment WHERE job_run_id = ?1 ORDER BY id",
            )?
            .query_map([id], |row| {
                let content: Vec<u8> = row.get(5)?;
                Ok(RunAttachment {
                    id: row.get(0)?,
                    job_run_id: row.get(1)?,
                    email_id: row.get(2)?,
                    file_name: row.get(3)?,
                    content_type: row.get(4)?,
                    size: content.len(),
                    content,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(HistoryDetail {
            entry: self.view(entry, Utc::now()),
            logs,
            emails,
            attachments,
        }))
    }

    /// Full failure text of a run. `None` when the run is unknown or did not fail.
    pub fn get_error_detail(&self, id: &str) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        let details: Option<Option<String>> = db
            .query_row(
                "SELECT error_details FROM job_history WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(details.flatten())
    }

    /// Totals over the whole history, plus the firings executing right now.
    pub fn get_statistics(&self) -> Result<HistoryStatistics> {
        let db = self.db.lock().unwrap();
        let (executed, vetoed, succeeded, failed): (i64, i64, i64, i64) = db.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN vetoed = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN vetoed = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN completed = 1 AND has_error = 0 AND vetoed = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN has_error = 1 THEN 1 ELSE 0 END), 0)
             FROM job_history",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        let running: i64 = db.query_row(
            "SELECT COUNT(*) FROM fired_triggers WHERE state = ?1",
            [STATE_EXECUTING],
            |row| row.get(0),
        )?;

        Ok(HistoryStatistics {
            executed: executed as u64,
            running: running as u64,
            vetoed: vetoed as u64,
            succeeded: succeeded as u64,
            failed: failed as u64,
        })
    }

    /// Firings of the UTC day `day` counted per 15-minute window.
    ///
    /// Only windows with at least one firing are returned, earliest first.
    pub fn chart_data(&self, day: NaiveDate) -> Result<Vec<ChartBucket>> {
        let Some(start) = day.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()) else {
            return Ok(Vec::new());
        };
        let end = start + chrono::Duration::days(1);

        let fired: Vec<String> = {
            let db = self.db.lock().unwrap();
            let mut stmt = db.prepare(
                "SELECT fired_time FROM job_history WHERE fired_time >= ?1 AND fired_time < ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![to_db(start), to_db(end)], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut buckets: BTreeMap<DateTime<Utc>, u64> = BTreeMap::new();
        for bucket in fired.iter().filter_map(|s| from_db(s)).filter_map(bucket_start) {
            *buckets.entry(bucket).or_default() += 1;
        }

        Ok(buckets
            .into_iter()
            .map(|(start, count)| ChartBucket {
                bucket_start: to_db(start),
                count,
            })
            .collect())
    }
}

/// SQLite takes signed counts; anything past `i64::MAX` is "everything".
fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
