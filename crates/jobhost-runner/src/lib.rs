//! `jobhost-runner`: runs packaged console programs for scheduled jobs.
//!
//! [`PackageRunner::run`] stages a package into a fresh directory, starts its
//! entry file without a shell and relays the child's output while it runs:
//!
//! - every stderr line becomes an error log line prefixed with `[stderr] `;
//! - stdout lines are decoded with [`jobhost_protocol::decode`]; structured
//!   log messages become log lines, email requests are stored and handed to
//!   the [`MailTransport`], everything else is dropped.
//!
//! Each stream has one sequential consumer, so lines of one stream are
//! recorded in the order the child wrote them. The staging directory is
//! removed whatever the outcome. [`PackageJob`] plugs the runner into the
//! scheduler as its [`JobExecutor`](jobhost_scheduler::JobExecutor).

pub mod error;
pub mod events;
pub mod job;
pub mod mail;
pub mod runner;
pub mod sink;

pub use error::{Result, RunnerError};
pub use events::{BroadcastEventBus, JobConsoleLogEvent, LiveEventBus};
pub use job::PackageJob;
pub use mail::{LogMailTransport, MailError, MailMessage, MailTransport};
pub use runner::PackageRunner;
pub use sink::{RunOutputSink, SinkError};
