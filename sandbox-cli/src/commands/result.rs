//! `sandbox result <id> [--log] [--json]`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use sandbox_core::{EventId, ReloadResult, ReloadStatus, ResultStore};
use sandbox_daemon::{request_result, DaemonError};

/// Query a reload event.
///
/// Goes through the daemon when it is running and reads the result store
/// directly otherwise, so results survive daemon restarts.
#[derive(Args, Debug)]
pub struct ResultArgs {
    /// Event id printed by `sandbox deploy`.
    pub id: String,

    /// Include the event log.
    #[arg(long)]
    pub log: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Event")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl ResultArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let id = EventId::from(self.id.as_str());

        let result = match request_result(&home, &id, self.log) {
            Ok(result) => result,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let cfg = super::load_config(&home)?;
                let store = ResultStore::open(&cfg.results_dir)
                    .context("failed to open result store")?;
                store
                    .query(&id, self.log)
                    .with_context(|| format!("failed to query event '{id}'"))?
            }
            Err(err) => return Err(err).with_context(|| format!("failed to query event '{id}'")),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&result).context("failed to render result JSON")?
            );
            return Ok(());
        }
        print_result(&result);
        Ok(())
    }
}

fn print_result(result: &ReloadResult) {
    let status = match result.status {
        ReloadStatus::Success => result.status.as_str().green().to_string(),
        ReloadStatus::Failed => result.status.as_str().red().to_string(),
        ReloadStatus::Processing => result.status.as_str().yellow().to_string(),
        ReloadStatus::Unknown => result.status.as_str().dimmed().to_string(),
    };
    let row = ResultRow {
        id: result.id.to_string(),
        status,
    };
    println!("{}", Table::new([row]).with(Style::rounded()));

    if let Some(log) = &result.log {
        if log.is_empty() {
            println!("{}", "(log is empty)".dimmed());
        } else {
            print!("{log}");
            if !log.ends_with('\n') {
                println!();
            }
        }
    }
}
