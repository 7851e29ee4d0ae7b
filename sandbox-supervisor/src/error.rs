//! Error types for sandbox-supervisor.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while rendering or writing the supervisor configuration.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// JSON serialization error (building tera context).
    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while loading templates or writing the config.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Environment values that cannot be expressed in supervisor syntax.
    #[error("unsafe environment values for: {}", names.join(", "))]
    UnsafeEnvironment { names: Vec<String> },

    /// Process types containing characters reserved by the supervisor.
    #[error("invalid process types: {}", types.join(", "))]
    InvalidProcessTypes { types: Vec<String> },
}

/// Errors raised while talking to, or converging, a running supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Transport failure: connection refused, timeout, non-200 status.
    #[error("supervisor request {method} failed: {message}")]
    Http { method: String, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Response body is not well-formed XML-RPC.
    #[error("malformed XML-RPC response: {0}")]
    Xml(String),

    /// The supervisor answered with an XML-RPC fault.
    #[error("{method} fault {code}: {message}")]
    Fault {
        method: String,
        code: i64,
        message: String,
    },

    /// The call went through but the supervisor answered `false`.
    #[error("{method} rejected for '{name}'")]
    Rejected { method: String, name: String },

    /// The supervisor binary exited unsuccessfully while starting.
    #[error("failed to launch {binary}: {status}: {stderr}")]
    LaunchFailed {
        binary: PathBuf,
        status: String,
        stderr: String,
    },

    /// The daemon never reported `RUNNING`.
    #[error("supervisor not ready after {attempts} attempt(s)")]
    NotReady { attempts: u32 },

    /// Well-formed response with an unexpected shape.
    #[error("unexpected {method} response: {detail}")]
    UnexpectedResponse { method: String, detail: String },
}

impl SupervisorError {
    /// XML-RPC fault code, when the supervisor answered with a fault.
    pub fn fault_code(&self) -> Option<i64> {
        match self {
            SupervisorError::Fault { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the supervisor could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, SupervisorError::Http { .. })
    }
}

pub(crate) fn render_io(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn supervisor_io(path: impl Into<PathBuf>, source: std::io::Error) -> SupervisorError {
    SupervisorError::Io {
        path: path.into(),
        source,
    }
}
