use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobhostError {
    /// The file or a `JOBHOST_*` override could not be parsed.
    #[error("config could not be loaded: {0}")]
    Config(String),

    /// Parsed, but unusable at runtime.
    #[error("config value `{field}` {reason}")]
    InvalidSetting {
        field: &'static str,
        reason: &'static str,
    },
}

impl JobhostError {
    /// Short machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            JobhostError::Config(_) => "CONFIG_ERROR",
            JobhostError::InvalidSetting { .. } => "INVALID_SETTING",
        }
    }
}

pub type Result<T> = std::result::Result<T, JobhostError>;
