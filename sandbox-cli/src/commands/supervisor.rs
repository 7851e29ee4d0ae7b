//! `sandbox supervisor`: direct process-supervisor control.

use anyhow::{Context, Result};
use clap::Subcommand;

use sandbox_supervisor::Reconciler;

#[derive(Subcommand, Debug)]
pub enum SupervisorCommand {
    /// Restart the supervisor daemon and every program it runs.
    Restart,
    /// Stop every supervised program.
    Stop,
    /// Print the supervisor's state.
    State,
}

pub fn run(command: SupervisorCommand) -> Result<()> {
    let home = super::home()?;
    let cfg = super::load_config(&home)?;
    let reconciler = Reconciler::from_settings(&cfg.supervisor);

    match command {
        SupervisorCommand::Restart => {
            reconciler.restart().context("failed to restart supervisor")?;
            println!("supervisor restarted");
        }
        SupervisorCommand::Stop => {
            if reconciler.stop_all().context("failed to stop programs")? {
                println!("all programs stopped");
            } else {
                println!("supervisor is not running");
            }
        }
        SupervisorCommand::State => {
            let state = reconciler
                .rpc()
                .get_state()
                .with_context(|| format!("failed to reach {}", cfg.supervisor.rpc_url()))?;
            println!("{} ({})", state.name, state.code);
        }
    }
    Ok(())
}
