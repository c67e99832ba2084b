use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::process::ExitCode;

use tokio::process::Command;
use tracing::{info, warn};

use crate::Error;

#[derive(Clone, Debug, clap::Args)]
pub struct LaunchArgs {
    /// Number of processes
    #[arg(short = 'n', long = "processes", default_value_t = 2)]
    processes: u32,

    /// Store address handed to every process (a free loopback port if unset)
    #[arg(long, env = "FOEHN_MASTER_ADDR")]
    master_addr: Option<SocketAddr>,

    /// Bound for every blocking store call
    #[arg(long, default_value_t = 30, env = "FOEHN_TIMEOUT_SECONDS")]
    timeout_seconds: u64,

    /// Command to run in each process (default: `foehn worker`)
    #[arg(last = true)]
    command: Vec<String>,
}

pub async fn run(args: LaunchArgs) -> Result<ExitCode, Error> {
    let master_addr = match args.master_addr {
        Some(addr) => addr,
        None => free_loopback_addr()?,
    };
    let (program, program_args) = match args.command.split_first() {
        Some((program, rest)) => (program.clone(), rest.to_vec()),
        None => {
            let exe = std::env::current_exe()
                .map_err(|e| Error::Io("error locating foehn executable", e))?;
            (exe.to_string_lossy().into_owned(), vec!["worker".to_string()])
        }
    };
    info!(
        processes = args.processes,
        %master_addr,
        program = %program,
        "launching process group"
    );

    let mut children = Vec::new();
    for rank in 0..args.processes {
        let child = Command::new(&program)
            .args(&program_args)
            .env("FOEHN_RANK", rank.to_string())
            .env("FOEHN_WORLD_SIZE", args.processes.to_string())
            .env("FOEHN_MASTER_ADDR", master_addr.to_string())
            .env("FOEHN_TIMEOUT_SECONDS", args.timeout_seconds.to_string())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Io("error spawning process", e))?;
        children.push((rank, child));
    }

    let mut failed = 0;
    for (rank, mut child) in children {
        let status = child
            .wait()
            .await
            .map_err(|e| Error::Io("error waiting for process", e))?;

        if status.success() {
            info!(rank, "process exited cleanly");
        } else {
            warn!(rank, %status, "process failed");
            failed += 1;
        }
    }

    if failed == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(failed, "process group did not complete");
        Ok(ExitCode::FAILURE)
    }
}

fn free_loopback_addr() -> Result<SocketAddr, Error> {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .and_then(|listener| listener.local_addr())
        .map_err(|e| Error::Io("error reserving a port", e))
}
