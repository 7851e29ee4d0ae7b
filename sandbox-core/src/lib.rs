//! Sandbox core library: domain types, configuration, result store, errors.
//!
//! - [`types`]: reload events, statuses, file changes, process descriptors
//! - [`config`]: [`SandboxConfig`] load / save
//! - [`store`]: [`ResultStore`], the durable per-event status and log store
//! - [`error`]: [`StoreError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::{EnvVar, SandboxConfig, SupervisorSettings};
pub use error::{ConfigError, StoreError};
pub use store::ResultStore;
pub use types::{
    DirTree, EventId, FileAction, FileChange, ProcessDescriptor, ReloadEvent, ReloadResult,
    ReloadStatus,
};
