use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime, deploy path and socket protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] sandbox_core::ConfigError),

    #[error("result store error: {0}")]
    Store(#[from] sandbox_core::StoreError),

    #[error("change tracking error: {0}")]
    ChangeSet(#[from] sandbox_changeset::ChangeSetError),

    #[error("render error: {0}")]
    Render(#[from] sandbox_supervisor::RenderError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },

    /// A reload is in flight; the deploy was not staged.
    #[error("reload in progress, try again later")]
    Busy,

    #[error("invalid deploy source {path}: {reason}")]
    InvalidSource { path: PathBuf, reason: String },
}

/// Failure of one reload step. Recorded in the event log, never fatal to the
/// daemon.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    CommandFailed { program: String, status: String },

    #[error(transparent)]
    Detect(#[from] sandbox_detector::DetectError),

    #[error(transparent)]
    Render(#[from] sandbox_supervisor::RenderError),

    #[error(transparent)]
    Supervisor(#[from] sandbox_supervisor::SupervisorError),

    /// Worker-side failure outside any step (e.g. a panicking step).
    #[error("{0}")]
    Internal(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn step_io(path: impl Into<PathBuf>, source: std::io::Error) -> StepError {
    StepError::Io {
        path: path.into(),
        source,
    }
}
