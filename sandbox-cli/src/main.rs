//! Sandbox: hot-reload control plane for a development sandbox.
//!
//! # Usage
//!
//! ```text
//! sandbox init [--app-dir <path>] [--port <n>] [--build <cmd>...]
//! sandbox daemon start|stop|status
//! sandbox deploy <dir> [--json]
//! sandbox result <id> [--log] [--json]
//! sandbox changes [--content] [--json]
//! sandbox render
//! sandbox supervisor restart
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    changes::ChangesArgs, daemon::DaemonCommand, deploy::DeployArgs, init::InitArgs,
    render::RenderArgs, result::ResultArgs, supervisor::SupervisorCommand,
};

#[derive(Parser, Debug)]
#[command(
    name = "sandbox",
    version,
    about = "Deploy, rebuild and relaunch applications in a development sandbox",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write ~/.sandbox/config.yaml.
    Init(InitArgs),

    /// Run or control the sandbox daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Deploy an extracted source tree through the daemon.
    Deploy(DeployArgs),

    /// Show the status (and log) of a reload event.
    Result(ResultArgs),

    /// Show changes in the app directory since the last deploy.
    Changes(ChangesArgs),

    /// Print the supervisor configuration a relaunch would write.
    Render(RenderArgs),

    /// Talk to the process supervisor directly.
    Supervisor {
        #[command(subcommand)]
        command: SupervisorCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Deploy(args) => args.run(),
        Commands::Result(args) => args.run(),
        Commands::Changes(args) => args.run(),
        Commands::Render(args) => args.run(),
        Commands::Supervisor { command } => commands::supervisor::run(command),
    }
}
