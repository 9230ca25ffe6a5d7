use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use jobhost_core::time::to_db;
use jobhost_history::{db::init_db, HistoryListener, HistoryStore, RunOutputStore};
use jobhost_protocol::{EmailAttachment, EmailRequest};
use jobhost_runner::RunOutputSink;
use jobhost_scheduler::{FireContext, JobData, JobFailure, JobListener};
use rusqlite::Connection;
use tempfile::TempDir;

fn open(path: &Path) -> Connection {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
        .unwrap();
    conn
}

struct Fixture {
    _dir: TempDir,
    store: Arc<HistoryStore>,
    listener: HistoryListener,
    output: RunOutputStore,
    raw: Connection,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobhost.db");
    let conn = open(&path);
    init_db(&conn).unwrap();
    jobhost_scheduler::db::init_db(&conn).unwrap();

    let store = Arc::new(HistoryStore::new(conn, Duration::from_secs(60)));
    Fixture {
        listener: HistoryListener::new(store.clone()),
        output: RunOutputStore::new(open(&path)),
        raw: open(&path),
        store,
        _dir: dir,
    }
}

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

fn firing(id: &str, job: &str, scheduled: DateTime<Utc>) -> FireContext {
    FireContext {
        fire_instance_id: id.into(),
        sched_name: "jobhost".into(),
        instance_name: "node-1".into(),
        job_id: format!("{job}-id"),
        job_name: job.into(),
        job_group: "DEFAULT".into(),
        trigger_name: format!("{job}-id"),
        trigger_group: "DEFAULT".into(),
        scheduled_time: scheduled,
        fired_time: scheduled + chrono::Duration::milliseconds(250),
        next_fire_time: Some(scheduled + chrono::Duration::hours(1)),
        schedule_expression: "every 3600s".into(),
        data: JobData {
            package_name: "p1".into(),
            arguments: "--y".into(),
        },
        run_time: None,
    }
}

fn finished(mut ctx: FireContext, ms: u64) -> FireContext {
    ctx.run_time = Some(Duration::from_millis(ms));
    ctx
}

#[test]
fn successful_run_goes_from_started_to_completed() {
    let f = fixture();
    let scheduled = at(2026, 3, 2, 9, 0, 0);
    let ctx = firing("run-1", "export", scheduled);

    f.listener.job_to_be_executed(&ctx);
    let detail = f.store.get_detail("run-1").unwrap().expect("row inserted");
    let entry = &detail.entry.entry;
    assert!(!entry.completed && !entry.vetoed && !entry.has_error);
    assert_eq!(entry.package_name, "p1");
    assert_eq!(entry.last_signal_time, to_db(scheduled));
    assert_eq!(entry.fired_time, "2026-03-02T09:00:00.250Z");
    assert_eq!(entry.cron_expression, "every 3600s");
    assert!(entry.run_time_ms.is_none());

    f.listener.job_was_executed(&finished(ctx, 1500), None);
    let entry = f.store.get_detail("run-1").unwrap().unwrap().entry.entry;
    assert!(entry.completed);
    assert!(!entry.has_error);
    assert_eq!(entry.run_time_ms, Some(1500));
    assert!(f.store.get_error_detail("run-1").unwrap().is_none());
}

#[test]
fn failed_run_keeps_message_and_details() {
    let f = fixture();
    let ctx = firing("run-2", "export", at(2026, 3, 2, 9, 0, 0));
    f.listener.job_to_be_executed(&ctx);

    let failure = JobFailure::new(
        "Process exited with code 2",
        "Process exited with code 2\nCaused by: something upstream",
    );
    f.listener.job_was_executed(&finished(ctx, 40), Some(&failure));

    let detail = f.store.get_detail("run-2").unwrap().unwrap();
    let entry = detail.entry.entry;
    assert!(entry.completed && entry.has_error && !entry.vetoed);
    assert_eq!(entry.error_message.as_deref(), Some("Process exited with code 2"));
    assert_eq!(
        f.store.get_error_detail("run-2").unwrap().as_deref(),
        Some("Process exited with code 2\nCaused by: something upstream")
    );
}

#[test]
fn vetoed_run_never_completes() {
    let f = fixture();
    let ctx = firing("run-3", "export", at(2026, 3, 2, 9, 0, 0));
    f.listener.job_to_be_executed(&ctx);
    f.listener.job_execution_vetoed(&ctx);
    // A stray completion must not turn the veto into a run; the listener swallows it.
    f.listener.job_was_executed(&finished(ctx, 10), None);

    let entry = f.store.get_detail("run-3").unwrap().unwrap().entry.entry;
    assert!(entry.vetoed);
    assert!(!entry.completed);
    assert!(entry.run_time_ms.is_none());
}

#[test]
fn listener_swallows_storage_errors() {
    let f = fixture();
    let ctx = firing("ghost", "export", at(2026, 3, 2, 9, 0, 0));
    f.listener.job_execution_vetoed(&ctx);
    f.listener.job_was_executed(&finished(ctx.clone(), 1), None);

    f.listener.job_to_be_executed(&ctx);
    // Duplicate fire instance id: the insert fails and is only logged.
    f.listener.job_to_be_executed(&ctx);
    assert_eq!(f.store.list_history("", 10, 1).unwrap().1, 1);
}

#[test]
fn history_is_paged_filtered_and_newest_first() {
    let f = fixture();
    for (i, job) in ["export", "import", "export", "export"].iter().enumerate() {
        let ctx = firing(&format!("run-{i}"), job, at(2026, 3, 2, 9, i as u32, 0));
        f.listener.job_to_be_executed(&ctx);
        f.listener.job_was_executed(&finished(ctx, 5), None);
    }

    let (all, total) = f.store.list_history("", 10, 1).unwrap();
    assert_eq!(total, 4);
    let ids: Vec<_> = all.iter().map(|v| v.entry.id.as_str()).collect();
    assert_eq!(ids, vec!["run-3", "run-2", "run-1", "run-0"]);

    let (page, total) = f.store.list_history("export", 2, 2).unwrap();
    assert_eq!(total, 3);
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].entry.id, "run-0");

    let (first, _) = f.store.list_history("export", 2, 0).unwrap();
    assert_eq!(first[0].entry.id, "run-3", "page 0 is treated as page 1");
}

#[test]
fn a_page_far_past_the_end_is_empty() {
    let f = fixture();
    let ctx = firing("run-0", "export", at(2026, 3, 2, 9, 0, 0));
    f.listener.job_to_be_executed(&ctx);

    for page in [usize::MAX / 2, usize::MAX] {
        let (items, total) = f.store.list_history("", 10, page).unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 1);
    }
}

#[test]
fn statistics_count_each_outcome() {
    let f = fixture();
    let base = at(2026, 3, 2, 9, 0, 0);

    let ok = firing("ok", "export", base);
    f.listener.job_to_be_executed(&ok);
    f.listener.job_was_executed(&finished(ok, 5), None);

    let bad = firing("bad", "export", base);
    f.listener.job_to_be_executed(&bad);
    f.listener
        .job_was_executed(&finished(bad, 5), Some(&JobFailure::new("boom", "boom")));

    let vetoed = firing("vetoed", "export", base);
    f.listener.job_to_be_executed(&vetoed);
    f.listener.job_execution_vetoed(&vetoed);

    let running = firing("running", "export", base);
    f.listener.job_to_be_executed(&running);
    f.raw
        .execute(
            "INSERT INTO fired_triggers VALUES
             ('running', 'jobhost', 'node-1', 'export-id', 'export', 'DEFAULT',
              'export-id', 'DEFAULT', ?1, ?1, 'EXECUTING')",
            [to_db(base)],
        )
        .unwrap();

    let stats = f.store.get_statistics().unwrap();
    assert_eq!(stats.executed, 3);
    assert_eq!(stats.running, 1);
    assert_eq!(stats.vetoed, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 1);
}

fn fire_at(f: &Fixture, id: &str, fired: DateTime<Utc>) {
    let mut ctx = firing(id, "export", fired);
    ctx.fired_time = fired;
    f.listener.job_to_be_executed(&ctx);
}

#[test]
fn chart_groups_firings_in_the_same_quarter_hour() {
    let f = fixture();
    fire_at(&f, "a", at(2026, 3, 2, 9, 0, 0));
    fire_at(&f, "b", at(2026, 3, 2, 9, 0, 10));
    fire_at(&f, "other-day", at(2026, 3, 3, 9, 0, 0));

    let buckets = f
        .store
        .chart_data(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap())
        .unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].bucket_start, "2026-03-02T09:00:00.000Z");
    assert_eq!(buckets[0].count, 2);
}

#[test]
fn chart_splits_firings_across_a_quarter_hour_boundary() {
    let f = fixture();
    fire_at(&f, "late", at(2026, 3, 2, 9, 15, 1));
    fire_at(&f, "early", at(2026, 3, 2, 9, 14, 59));

    let buckets = f
        .store
        .chart_data(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap())
        .unwrap();
    let summary: Vec<_> = buckets
        .iter()
        .map(|b| (b.bucket_start.as_str(), b.count))
        .collect();
    assert_eq!(
        summary,
        vec![("2026-03-02T09:00:00.000Z", 1), ("2026-03-02T09:15:00.000Z", 1)]
    );
    assert!(f
        .store
        .chart_data(NaiveDate::from_ymd_opt(2026, 3, 4).unwrap())
        .unwrap()
        .is_empty());
}

#[test]
fn run_output_shows_up_in_detail() {
    let f = fixture();
    let ctx = firing("run-9", "export", at(2026, 3, 2, 9, 0, 0));
    f.listener.job_to_be_executed(&ctx);

    f.output.append_log("run-9", "[stderr] E1", true).unwrap();
    f.output.append_log("run-9", "L1", false).unwrap();
    let email_id = f
        .output
        .create_email(
            "run-9",
            &EmailRequest {
                subject: "report".into(),
                body: "attached".into(),
                to: "x@example.com".into(),
                cc: "cc@example.com".into(),
                bcc: String::new(),
                attachments: vec![EmailAttachment {
                    file_name: "a.csv".into(),
                    content_type: "text/csv".into(),
                    content: b"a,b\n1,2\n".to_vec(),
                }],
            },
        )
        .unwrap();
    f.output.mark_email_sent(&email_id).unwrap();
    f.output
        .save_attachment("run-9", "dump.bin", "application/octet-stream", &[1, 2, 3])
        .unwrap();
    f.output.append_log("other-run", "not mine", false).unwrap();

    let detail = f.store.get_detail("run-9").unwrap().unwrap();
    let logs: Vec<_> = detail
        .logs
        .iter()
        .map(|l| (l.content.as_str(), l.is_error))
        .collect();
    assert_eq!(logs, vec![("[stderr] E1", true), ("L1", false)]);

    assert_eq!(detail.emails.len(), 1);
    assert!(detail.emails[0].is_sent);
    assert_eq!(detail.emails[0].cc, "cc@example.com");

    assert_eq!(detail.attachments.len(), 2);
    assert_eq!(detail.attachments[0].email_id.as_deref(), Some(email_id.as_str()));
    assert_eq!(detail.attachments[0].content, b"a,b\n1,2\n");
    assert_eq!(detail.attachments[1].email_id, None);
    assert_eq!(detail.attachments[1].size, 3);

    assert!(f.store.get_detail("missing").unwrap().is_none());
}

#[test]
fn signal_only_moves_forward_and_clears_the_timeout() {
    let f = fixture();
    let scheduled = Utc::now() - chrono::Duration::hours(2);
    f.listener.job_to_be_executed(&firing("stuck", "export", scheduled));

    let (items, _) = f.store.list_history("", 10, 1).unwrap();
    assert!(items[0].has_signal_timeout, "no signal for two hours");

    let now = Utc::now();
    f.output.refresh_signal("stuck", now).unwrap();
    f.output.refresh_signal("stuck", scheduled).unwrap();

    let detail = f.store.get_detail("stuck").unwrap().unwrap();
    assert_eq!(detail.entry.entry.last_signal_time, to_db(now));
    assert!(!detail.entry.has_signal_timeout);
}
