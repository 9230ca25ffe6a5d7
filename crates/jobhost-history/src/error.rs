use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history store: {0}")]
    Database(#[from] rusqlite::Error),

    /// No history row for this fire instance id, or it is already terminal.
    #[error("no history entry with id {id}")]
    NotFound { id: String },
}

pub type Result<T> = std::result::Result<T, HistoryError>;
