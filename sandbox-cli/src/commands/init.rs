//! `sandbox init [--app-dir <path>] [--port <n>] [--build <cmd>...]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use sandbox_core::config;

/// Write (or update) `~/.sandbox/config.yaml`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory the deployed application lives in.
    #[arg(long)]
    pub app_dir: Option<PathBuf>,

    /// XML-RPC port of the process supervisor.
    #[arg(long)]
    pub port: Option<u16>,

    /// Build command run when dependency manifests change (repeat per argument).
    #[arg(long = "build", value_name = "ARG", num_args = 1..)]
    pub build: Vec<String>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let mut cfg = super::load_config(&home)?;

        if let Some(app_dir) = self.app_dir {
            cfg.app_dir = if app_dir.is_absolute() {
                app_dir
            } else {
                std::env::current_dir()
                    .context("cannot determine current directory")?
                    .join(app_dir)
            };
        }
        if let Some(port) = self.port {
            cfg.supervisor.port = port;
        }
        if !self.build.is_empty() {
            cfg.build_command = self.build;
        }

        let path = config::save_at(&home, &cfg).context("failed to save sandbox config")?;
        println!("✓ Saved sandbox config");
        println!("  Config:   {}", path.display());
        println!("  App dir:  {}", cfg.app_dir.display());
        println!("  Results:  {}", cfg.results_dir.display());
        println!("  RPC:      {}", cfg.supervisor.rpc_url());
        Ok(())
    }
}
