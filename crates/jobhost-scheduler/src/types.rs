use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State written to `fired_triggers.state` while a firing runs.
pub const STATE_EXECUTING: &str = "EXECUTING";

pub const DEFAULT_GROUP: &str = "DEFAULT";

/// When a job becomes due. Stored as JSON in `jobs.schedule`; all times UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    Once { at: DateTime<Utc> },

    Interval { every_secs: u64 },

    Daily { hour: u8, minute: u8 },

    /// `day` counts from Monday = 0.
    Weekly { day: u8, hour: u8, minute: u8 },

    /// Kept for display only. Fire it with `trigger_now`.
    Cron { expression: String },
}

impl Schedule {
    /// Human-readable snapshot recorded alongside each firing.
    pub fn expression(&self) -> String {
        match self {
            Schedule::Once { at } => format!("once {}", at.to_rfc3339()),
            Schedule::Interval { every_secs } => format!("every {every_secs}s"),
            Schedule::Daily { hour, minute } => format!("daily {hour:02}:{minute:02}"),
            Schedule::Weekly { day, hour, minute } => {
                format!("weekly {day} {hour:02}:{minute:02}")
            }
            Schedule::Cron { expression } => expression.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    /// Ran out of runs.
    Completed,
    /// A one-shot job that was overdue at startup.
    Missed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Completed => "completed",
            JobStatus::Missed => "missed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [JobStatus::Pending, JobStatus::Completed, JobStatus::Missed]
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("job status `{s}` is not recognised"))
    }
}

/// Data attached to a job and handed to the executor on every firing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobData {
    /// Package to run.
    pub package_name: String,
    /// Caller arguments appended after the package's static arguments.
    #[serde(default)]
    pub arguments: String,
}

/// A persisted job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// UUID v4 string, primary key. Doubles as the trigger name.
    pub id: String,
    pub name: String,
    pub group: String,
    pub schedule: Schedule,
    pub data: JobData,
    /// When false, a firing is vetoed while another firing of this job executes.
    pub allow_concurrent: bool,
    pub status: JobStatus,
    /// RFC3339 timestamp of the most recent firing, if any.
    pub last_run: Option<String>,
    /// RFC3339 timestamp of the next planned firing, if any.
    pub next_run: Option<String>,
    pub run_count: u32,
    /// If set, the job is marked Completed after this many runs.
    pub max_runs: Option<u32>,
    pub created_at: String,
    pub updated_at: String,
}

/// Parameters for [`SchedulerHandle::add_job`](crate::engine::SchedulerHandle::add_job).
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub group: String,
    pub schedule: Schedule,
    pub data: JobData,
    pub allow_concurrent: bool,
    pub max_runs: Option<u32>,
}

impl NewJob {
    pub fn new(name: impl Into<String>, schedule: Schedule, data: JobData) -> Self {
        Self {
            name: name.into(),
            group: DEFAULT_GROUP.to_string(),
            schedule,
            data,
            allow_concurrent: true,
            max_runs: None,
        }
    }

    pub fn disallow_concurrent(mut self) -> Self {
        self.allow_concurrent = false;
        self
    }

    pub fn with_max_runs(mut self, max_runs: u32) -> Self {
        self.max_runs = Some(max_runs);
        self
    }
}

/// Which scheduler (cluster name) and which process in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerIdentity {
    pub sched_name: String,
    pub instance_name: String,
}

/// Everything known about one firing of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FireContext {
    /// Unique per firing; the job run id used by history, logs and attachments.
    pub fire_instance_id: String,
    pub sched_name: String,
    pub instance_name: String,
    pub job_id: String,
    pub job_name: String,
    pub job_group: String,
    pub trigger_name: String,
    pub trigger_group: String,
    pub scheduled_time: DateTime<Utc>,
    pub fired_time: DateTime<Utc>,
    pub next_fire_time: Option<DateTime<Utc>>,
    /// Snapshot of the schedule as it was when the job fired.
    pub schedule_expression: String,
    pub data: JobData,
    /// Wall-clock execution time; set only once the executor has returned.
    pub run_time: Option<std::time::Duration>,
}
