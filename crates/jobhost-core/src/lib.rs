//! `jobhost-core`: configuration, shared error type and timestamp encoding
//! for every jobhost crate.

pub mod config;
pub mod error;
pub mod time;

pub use config::JobhostConfig;
pub use error::{JobhostError, Result};
