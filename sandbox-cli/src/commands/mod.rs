pub mod changes;
pub mod daemon;
pub mod deploy;
pub mod init;
pub mod render;
pub mod result;
pub mod supervisor;

use std::path::PathBuf;

use anyhow::{Context, Result};
use sandbox_core::{config, SandboxConfig};

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

pub(crate) fn load_config(home: &std::path::Path) -> Result<SandboxConfig> {
    config::load_at(home).with_context(|| {
        format!(
            "failed to load {}",
            config::config_path_at(home).display()
        )
    })
}
