//! `jobhost-scheduler`: Tokio-based job scheduler with SQLite persistence.
//!
//! # Overview
//!
//! Jobs are persisted to a SQLite `jobs` table. The [`engine::SchedulerEngine`]
//! polls the database and fires any job whose `next_run` has arrived. Each
//! firing gets a unique fire instance id and runs on its own Tokio task:
//!
//! 1. every [`JobListener`] hears `job_to_be_executed`;
//! 2. a job that disallows concurrency while another firing of it is still
//!    executing is vetoed (`job_execution_vetoed`) and stops here;
//! 3. otherwise the [`JobExecutor`] runs and listeners hear `job_was_executed`
//!    with the failure, if any.
//!
//! Executing firings are tracked in `fired_triggers`; every engine instance
//! checks in to `scheduler_state` on a fixed interval.
//!
//! # Schedule variants
//!
//! | Variant    | Behaviour                                          |
//! |------------|----------------------------------------------------|
//! | `Once`     | Single fire at an absolute UTC instant             |
//! | `Interval` | Repeat every N seconds                             |
//! | `Daily`    | Fire at HH:MM UTC every day                        |
//! | `Weekly`   | Fire at HH:MM UTC on a specific weekday            |
//! | `Cron`     | Stored for reference only; fires via `trigger_now` |

pub mod db;
pub mod engine;
pub mod error;
pub mod listener;
pub mod schedule;
pub mod types;

pub use engine::{SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use listener::{JobExecutor, JobFailure, JobListener};
pub use types::{FireContext, Job, JobData, JobStatus, NewJob, Schedule, SchedulerIdentity};
