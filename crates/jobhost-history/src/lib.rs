//! `jobhost-history`: durable execution history of job firings.
//!
//! - [`HistoryListener`] hooks into the scheduler and writes one row per
//!   firing: inserted before the job runs, then marked vetoed or completed.
//! - [`RunOutputStore`] records what a running job produces (log lines,
//!   emails, attachments) and refreshes its last signal time.
//! - [`HistoryStore`] answers the dashboard queries: paged history, run
//!   details, statistics and 15-minute chart buckets. Whether a run has
//!   stopped signalling is derived on every read, never stored.
//! - [`ClusterStateReader`] lists the scheduler instances' heartbeats.

pub mod cluster;
pub mod db;
pub mod error;
pub mod listener;
pub mod output;
pub mod query;
pub mod store;
pub mod types;

pub use cluster::ClusterStateReader;
pub use error::{HistoryError, Result};
pub use listener::HistoryListener;
pub use output::RunOutputStore;
pub use query::has_signal_timeout;
pub use store::HistoryStore;
pub use types::{
    ChartBucket, ExecutionHistoryEntry, HistoryDetail, HistoryEntryView, HistoryStatistics,
    RunAttachment, RunEmail, RunLogLine, SchedulerInstance,
};
