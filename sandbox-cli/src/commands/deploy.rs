//! `sandbox deploy <dir> [--json]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use sandbox_daemon::{request_deploy, DaemonError};

/// Hand an extracted source tree to the running daemon.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Directory holding the new application tree.
    pub source: PathBuf,

    /// Print the deploy receipt as JSON.
    #[arg(long)]
    pub json: bool,
}

impl DeployArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let source = self
            .source
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", self.source.display()))?;

        let receipt = match request_deploy(&home, &source) {
            Ok(receipt) => receipt,
            Err(DaemonError::DaemonNotRunning { socket }) => {
                anyhow::bail!(
                    "daemon is not running (no socket at {}); start it with `sandbox daemon start`",
                    socket.display()
                );
            }
            Err(err) => return Err(err).context("deploy failed"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&receipt).context("failed to render receipt JSON")?
            );
            return Ok(());
        }

        println!("{} {}", "✓ Accepted".green().bold(), receipt.id.to_string().bold());
        println!("  Changes:  {}", receipt.changes);
        println!("  Rebuild:  {}", yes_no(receipt.rebuild));
        println!("  Relaunch: {}", yes_no(receipt.relaunch));
        println!("  Follow with: sandbox result {} --log", receipt.id);
        Ok(())
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
