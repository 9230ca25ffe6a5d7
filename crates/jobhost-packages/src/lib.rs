//! `jobhost-packages`: zip packages of console programs and their per-run staging.
//!
//! A package is a zip archive with a `manifest.json` at its root describing
//! how to start the program. The [`store::PackageStore`] keeps the latest
//! upload per package name; [`staging::PackageRunStaging`] extracts one
//! package into a fresh directory for a single run and removes it afterwards.

pub mod args;
pub mod db;
pub mod error;
pub mod manifest;
pub mod staging;
pub mod store;
pub mod types;

pub use error::{PackageError, Result};
pub use staging::PackageRunStaging;
pub use store::PackageStore;
pub use types::{PackageDefinition, PackageDetails, PackageSummary};
