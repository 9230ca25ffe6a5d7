use serde::{Deserialize, Serialize};

/// The current version of a named package, including its zip content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDefinition {
    /// Unique package name, primary key.
    pub name: String,
    pub author: String,
    pub version: String,
    pub description: String,
    /// Program to start, from `startInfo.fileName`.
    pub entry_file: String,
    /// Arguments always passed before the caller's, from `startInfo.arguments`.
    pub static_arguments: String,
    /// Raw zip bytes.
    #[serde(skip)]
    pub content: Vec<u8>,
    /// RFC3339 timestamp of the last save.
    pub modified_at: String,
}

/// Package metadata without the archive, used for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSummary {
    pub name: String,
    pub author: String,
    pub version: String,
    pub description: String,
    pub modified_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDetails {
    pub name: String,
    pub modified_at: String,
}
