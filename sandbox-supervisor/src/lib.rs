//! # sandbox-supervisor
//!
//! Everything between the sandbox and its process supervisor (supervisord):
//!
//! - [`render`]: desired process set + environment → `supervisord.conf`
//! - [`env`]: strict `environment=` escaping
//! - [`xmlrpc`] / [`rpc`]: XML-RPC codec and the [`SupervisorRpc`] client
//! - [`reconcile`]: converge live process groups to the rendered config
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use sandbox_core::{ProcessDescriptor, SandboxConfig};
//! use sandbox_supervisor::{ConfigRenderer, Reconciler, SupervisorConfig};
//!
//! fn relaunch(config: &SandboxConfig, procs: &[ProcessDescriptor]) -> anyhow::Result<()> {
//!     let settings = &config.supervisor;
//!     let desired = SupervisorConfig::build(settings, procs, &config.environment, &config.app_dir)?;
//!     ConfigRenderer::new(settings.template_dir.as_deref())?
//!         .write(&desired, &settings.config_path())?;
//!     Reconciler::from_settings(settings).reconcile(&desired.group_names())?;
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod error;
pub mod reconcile;
pub mod render;
pub mod rpc;
pub mod xmlrpc;

pub use env::escape_environment;
pub use error::{RenderError, SupervisorError};
pub use reconcile::{Launch, Reconciler, Reconciliation, SupervisordLauncher};
pub use render::{write_config, ConfigRenderer, ProgramEntry, SupervisorConfig};
pub use rpc::{ConfigDiff, SupervisorClient, SupervisorRpc, SupervisorState};
