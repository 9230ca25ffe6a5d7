use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler store: {0}")]
    Database(#[from] rusqlite::Error),

    /// Rejected by `schedule::validate`.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Schedule or job data could not be written as JSON.
    #[error("job encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("no job with id {id}")]
    JobNotFound { id: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
