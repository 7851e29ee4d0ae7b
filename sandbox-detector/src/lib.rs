//! Rebuild/relaunch detection for `sandbox-detector`.
//!
//! - [`deps`] compares dependency manifests between the deployed tree and an
//!   incoming one, ignoring line order and blank lines.
//! - [`plan`] turns that comparison plus a change set into a [`ReloadPlan`].
//! - [`procfile`] reads the application's process types.

use std::path::PathBuf;

use thiserror::Error;

pub mod deps;
pub mod plan;
pub mod procfile;

pub use deps::{compare, dependencies_changed, manifests_changed, same_lines};
pub use plan::ReloadPlan;
pub use procfile::{parse_procfile, read_procfile};

/// Errors from manifest comparison and Procfile parsing.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} line {line}: {message}")]
    ParseError {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("invalid process type(s) in {path}: {}", .types.join(", "))]
    InvalidProcessTypes { path: PathBuf, types: Vec<String> },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DetectError {
    DetectError::Io {
        path: path.into(),
        source,
    }
}
