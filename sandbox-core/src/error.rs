//! Error types for sandbox-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the [`ResultStore`](crate::store::ResultStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem failure, annotated with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No status record exists for the event.
    #[error("no reload event with id '{id}'")]
    NotFound { id: String },

    /// The id cannot be used as a single file name.
    #[error("invalid event id '{id}'")]
    InvalidId { id: String },

    /// The status file holds something other than a known terminal or
    /// processing status.
    #[error("corrupt status record for '{id}': {content:?}")]
    Corrupt { id: String, content: String },

    /// `Unknown` is a query result only, never a persisted state.
    #[error("refusing to persist status 'unknown' for '{id}'")]
    UnknownNotWritable { id: String },
}

/// Errors raised while loading or saving [`SandboxConfig`](crate::config::SandboxConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, including file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, so we cannot locate `~/.sandbox/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn store_io(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn config_io(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
