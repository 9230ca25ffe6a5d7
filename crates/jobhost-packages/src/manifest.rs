use std::io::{Cursor, Read};

use serde::Deserialize;

use crate::error::{PackageError, Result};

/// Location of the manifest inside every package archive.
pub const MANIFEST_PATH: &str = "manifest.json";

/// Validated contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub description: String,
    pub author: String,
    pub version: String,
    pub file_name: String,
    pub arguments: String,
}

// Every field is optional on the wire so a missing one can be reported by name.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    name: Option<String>,
    description: Option<String>,
    author: Option<String>,
    version: Option<String>,
    start_info: Option<RawStartInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStartInfo {
    file_name: Option<String>,
    arguments: Option<String>,
}

/// Open `zip_bytes` and read the manifest at [`MANIFEST_PATH`].
pub fn read_manifest(zip_bytes: &[u8]) -> Result<Manifest> {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes))?;
    let mut entry = match archive.by_name(MANIFEST_PATH) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(PackageError::MissingManifest(MANIFEST_PATH))
        }
        Err(e) => return Err(e.into()),
    };
    let mut json = String::new();
    entry.read_to_string(&mut json)?;
    parse_manifest(&json)
}

/// Parse and validate manifest JSON.
pub fn parse_manifest(json: &str) -> Result<Manifest> {
    let raw: RawManifest = serde_json::from_str(json)?;
    let start_info = required(raw.start_info, "startInfo")?;

    Ok(Manifest {
        name: required(raw.name, "name")?,
        description: required(raw.description, "description")?,
        author: required(raw.author, "author")?,
        version: required(raw.version, "version")?,
        file_name: required(start_info.file_name, "startInfo.fileName")?,
        arguments: required(start_info.arguments, "startInfo.arguments")?,
    })
}

/// A package name is also a directory name under the staging root, so it
/// must be a single plain path component.
pub fn validate_name(name: &str) -> Result<()> {
    let plain = !name.trim().is_empty()
        && !name.contains(['/', '\\', '\0'])
        && name != "."
        && name != "..";
    if plain {
        Ok(())
    } else {
        Err(PackageError::Validation {
            field: "name".to_string(),
        })
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| PackageError::Validation {
        field: field.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "name": "nightly-export",
        "description": "exports yesterday's orders",
        "author": "ops",
        "version": "1.4.0",
        "startInfo": { "fileName": "./export.sh", "arguments": "--gzip" }
    }"#;

    #[test]
    fn complete_manifest_parses() {
        let m = parse_manifest(FULL).unwrap();
        assert_eq!(m.name, "nightly-export");
        assert_eq!(m.file_name, "./export.sh");
        assert_eq!(m.arguments, "--gzip");
    }

    #[test]
    fn empty_arguments_are_allowed() {
        let json = FULL.replace("--gzip", "");
        assert_eq!(parse_manifest(&json).unwrap().arguments, "");
    }

    #[test]
    fn null_field_is_reported_by_name() {
        let json = FULL.replace(r#""author": "ops""#, r#""author": null"#);
        match parse_manifest(&json) {
            Err(PackageError::Validation { field }) => assert_eq!(field, "author"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn missing_start_info_field_is_reported_with_path() {
        let json = FULL.replace(r#""fileName": "./export.sh", "#, "");
        match parse_manifest(&json) {
            Err(PackageError::Validation { field }) => assert_eq!(field, "startInfo.fileName"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn missing_start_info_block_is_reported() {
        let json = r#"{"name":"a","description":"b","author":"c","version":"d"}"#;
        match parse_manifest(json) {
            Err(PackageError::Validation { field }) => assert_eq!(field, "startInfo"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
