use thiserror::Error;

/// Errors raised by the package store and run staging.
#[derive(Debug, Error)]
pub enum PackageError {
    /// No package is registered under this name.
    #[error("package not found: {name}")]
    NotFound { name: String },

    /// A required manifest field is missing or null.
    #[error("invalid package manifest: `{field}` is required")]
    Validation { field: String },

    /// The archive has no manifest at its root.
    #[error("package archive has no {0}")]
    MissingManifest(&'static str),

    /// The upload is not a readable zip archive.
    #[error("package archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The manifest is not valid JSON.
    #[error("manifest is not valid JSON: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PackageError>;
