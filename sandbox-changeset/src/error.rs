//! Error types for sandbox-changeset.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from change tracking.
#[derive(Debug, Error)]
pub enum ChangeSetError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A git subprocess exited unsuccessfully.
    #[error("git {args} failed ({status}): {stderr}")]
    Git {
        args: String,
        status: String,
        stderr: String,
    },

    /// Content was requested for a file that is not UTF-8 text.
    #[error("{path} is not UTF-8 text")]
    NotText { path: PathBuf },

    /// Commit messages must carry some text.
    #[error("commit message cannot be empty")]
    EmptyMessage,
}

/// Convenience constructor for [`ChangeSetError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ChangeSetError {
    ChangeSetError::Io {
        path: path.into(),
        source,
    }
}
