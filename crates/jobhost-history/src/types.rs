use serde::{Deserialize, Serialize};

/// One firing of one job, as recorded by the lifecycle hooks.
///
/// `error_details` is deliberately absent: it can be large and is loaded
/// only through `HistoryStore::get_error_detail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHistoryEntry {
    /// Fire instance id.
    pub id: String,
    pub sched_name: String,
    pub instance_name: String,
    pub job_name: String,
    pub job_group: String,
    pub package_name: String,
    pub trigger_name: String,
    pub trigger_group: String,
    pub fired_time: String,
    pub sched_time: String,
    /// Heartbeat; starts at the scheduled time and only moves forward.
    pub last_signal_time: String,
    pub run_time_ms: Option<i64>,
    pub has_error: bool,
    pub error_message: Option<String>,
    pub vetoed: bool,
    pub completed: bool,
    pub next_fire_time: Option<String>,
    pub cron_expression: String,
}

/// A history entry plus the health flag derived at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntryView {
    #[serde(flatten)]
    pub entry: ExecutionHistoryEntry,
    pub has_signal_timeout: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogLine {
    pub id: i64,
    pub job_run_id: String,
    pub content: String,
    pub is_error: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEmail {
    pub id: String,
    pub job_run_id: String,
    pub subject: String,
    pub body: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
    pub is_sent: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAttachment {
    pub id: i64,
    pub job_run_id: String,
    /// `None` for attachments that belong to the run rather than an email.
    pub email_id: Option<String>,
    pub file_name: String,
    pub content_type: String,
    pub size: usize,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub created_at: String,
}

/// Everything recorded for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryDetail {
    pub entry: HistoryEntryView,
    /// In insertion order.
    pub logs: Vec<RunLogLine>,
    pub emails: Vec<RunEmail>,
    pub attachments: Vec<RunAttachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStatistics {
    /// Firings that were not vetoed.
    pub executed: u64,
    /// Firings the scheduler currently reports as executing.
    pub running: u64,
    pub vetoed: u64,
    /// Completed without error.
    pub succeeded: u64,
    pub failed: u64,
}

/// Number of firings whose fired time falls in one 15-minute window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartBucket {
    /// Window start, RFC3339 UTC.
    pub bucket_start: String,
    pub count: u64,
}

/// Heartbeat row of one scheduler instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerInstance {
    pub sched_name: String,
    pub instance_id: String,
    pub checkin_interval_ms: i64,
    pub checkin_timestamp: String,
}
