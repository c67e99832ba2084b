//! `foehn`: launch a local process group and run bootstrap workers.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod launch;
mod wait;
mod worker;

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bootstrap error
    #[error(transparent)]
    Bootstrap(#[from] foehn_bootstrap::Error),

    /// A `--set` entry is not `KEY=VALUE`
    #[error("invalid entry {0:?}, expected KEY=VALUE")]
    InvalidEntry(String),

    /// IO operation failed
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// Store error
    #[error(transparent)]
    Store(#[from] foehn_store_tcp::Error),
}

#[derive(Debug, Parser)]
#[command(name = "foehn", version, about = "Rendezvous store for process-group bootstrap")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start N local processes as one group and wait for all of them
    Launch(launch::LaunchArgs),

    /// Join a group started by `launch` and exchange readiness with every peer
    Worker(worker::WorkerArgs),

    /// Wait for keys on a privately hosted store
    Wait(wait::WaitArgs),
}

/// Shared group settings.
#[derive(Clone, Debug, clap::Args)]
struct GroupArgs {
    /// Address rank 0 hosts the store on
    #[arg(long, default_value = "127.0.0.1:29500", env = "FOEHN_MASTER_ADDR")]
    master_addr: SocketAddr,

    /// Bound for every blocking store call
    #[arg(long, default_value_t = 30, env = "FOEHN_TIMEOUT_SECONDS")]
    timeout_seconds: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Stdout is reserved for worker markers.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();
    let result = match args.command {
        Command::Launch(args) => launch::run(args).await,
        Command::Worker(args) => worker::run(args).await,
        Command::Wait(args) => wait::run(args).await,
    };

    result.unwrap_or_else(|e| {
        error!("{}", e);
        ExitCode::FAILURE
    })
}
