//! Ledgerlink CLI - bank connection sync and recovery from the terminal

use std::io::IsTerminal;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod commands;
mod output;

use commands::{connections, init, logs, recover, refresh, sweep, sync, worker};

/// Ledgerlink - keep bank connections synced and healthy
#[derive(Parser)]
#[command(name = "ledgerlink", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, settings file and database
    Init {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage bank connections
    Connections {
        #[command(subcommand)]
        command: connections::ConnectionsCommands,
    },

    /// Sync one connection and run its follow-up jobs
    Sync {
        /// Connection ID
        connection_id: Uuid,
        /// Treat as a user-initiated sync
        #[arg(long)]
        manual: bool,
        /// Only run the connection check and list the jobs it dispatches
        #[arg(long)]
        plan: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Try to recover a connection in an error state
    Recover {
        /// Connection ID
        connection_id: Uuid,
        /// Recovery attempts already made
        #[arg(long, default_value = "0")]
        retry_count: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Refresh a connection's access token
    Refresh {
        /// Connection ID
        connection_id: Uuid,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a daily sweep now
    Sweep {
        #[command(subcommand)]
        command: sweep::SweepCommands,
    },

    /// Run the job worker with the cron schedule until interrupted
    Worker,

    /// View and manage the job event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

/// Diagnostics go to stderr: human-readable on a terminal, JSON otherwise
fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if std::io::stderr().is_terminal() {
        builder.init();
    } else {
        builder.json().init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(match cli.command {
        Commands::Worker => "info",
        _ => "warn",
    });

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { json } => init::run(json),
        Commands::Connections { command } => connections::run(command).await,
        Commands::Sync {
            connection_id,
            manual,
            plan,
            json,
        } => sync::run(connection_id, manual, plan, json).await,
        Commands::Recover {
            connection_id,
            retry_count,
            json,
        } => recover::run(connection_id, retry_count, json).await,
        Commands::Refresh {
            connection_id,
            json,
        } => refresh::run(connection_id, json).await,
        Commands::Sweep { command } => sweep::run(command).await,
        Commands::Worker => worker::run().await,
        Commands::Logs { command } => logs::run(command),
    }
}
