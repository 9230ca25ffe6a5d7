use chrono::{DateTime, Utc};
use jobhost_protocol::EmailRequest;

/// Error type returned by sink implementations.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Durable destination for everything a run produces.
///
/// Called concurrently from the stdout and stderr consumers of a run, and
/// from many runs at once.
pub trait RunOutputSink: Send + Sync {
    /// Append one log line to the run's ordered log.
    fn append_log(&self, job_run_id: &str, content: &str, is_error: bool) -> Result<(), SinkError>;

    /// Store an email request and its attachments, unsent. Returns the email id.
    fn create_email(&self, job_run_id: &str, email: &EmailRequest) -> Result<String, SinkError>;

    fn mark_email_sent(&self, email_id: &str) -> Result<(), SinkError>;

    /// Move the run's last signal time forward to `at`. Never moves it back.
    fn refresh_signal(&self, job_run_id: &str, at: DateTime<Utc>) -> Result<(), SinkError>;
}
