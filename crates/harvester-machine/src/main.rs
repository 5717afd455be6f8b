mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use harvester_driver::CreateFlags;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "harvester-machine", version, about = "Provision and manage machines on Harvester")]
struct Cli {
    /// Directory holding per-machine state (default: ~/.harvester-machine)
    #[arg(long, global = true, env = "MACHINE_STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a machine and wait until it has an IP address
    Create {
        name: String,

        #[command(flatten)]
        flags: CreateFlags,
    },

    /// Start a stopped machine
    Start { name: String },

    /// Stop a machine gracefully
    Stop { name: String },

    /// Restart a machine
    Restart { name: String },

    /// Stop a machine immediately
    Kill { name: String },

    /// Remove a machine and its disks
    Rm {
        name: String,

        /// Drop local state even if the cluster side cannot be removed
        #[arg(long, short)]
        force: bool,
    },

    /// Print the machine state
    State { name: String },

    /// Print the machine IP address
    Ip { name: String },

    /// Print the docker daemon URL
    Url { name: String },

    /// Print the host name to ssh into
    SshHostname { name: String },

    /// List known machines
    Ls,
}

fn default_storage_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".harvester-machine")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let storage_path = cli.storage_path.unwrap_or_else(default_storage_path);
    let ctx = commands::Context::new(storage_path, shutdown_token());

    match cli.command {
        Commands::Create { name, flags } => ctx.create(&name, flags).await,
        Commands::Start { name } => ctx.start(&name).await,
        Commands::Stop { name } => ctx.stop(&name).await,
        Commands::Restart { name } => ctx.restart(&name).await,
        Commands::Kill { name } => ctx.kill(&name).await,
        Commands::Rm { name, force } => ctx.remove(&name, force).await,
        Commands::State { name } => ctx.state(&name).await,
        Commands::Ip { name } => ctx.ip(&name).await,
        Commands::Url { name } => ctx.url(&name).await,
        Commands::SshHostname { name } => ctx.ssh_hostname(&name).await,
        Commands::Ls => ctx.list().await,
    }
}

/// Cancelled on ctrl-c so in-flight waits stop cleanly.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            trigger.cancel();
        }
    });
    cancel
}
