use std::process::ExitCode;
use std::time::Duration;

use foehn_bootstrap::{Bootstrap, BootstrapConfig, PeerExchange, TcpConnector};
use foehn_membership_env::EnvMembership;
use tracing::info;

use crate::{Error, GroupArgs};

#[derive(Clone, Debug, clap::Args)]
pub struct WorkerArgs {
    #[command(flatten)]
    group: GroupArgs,

    /// Payload published to every peer
    #[arg(long, default_value = "ready")]
    payload: String,
}

pub async fn run(args: WorkerArgs) -> Result<ExitCode, Error> {
    let config = BootstrapConfig {
        timeout: Duration::from_secs(args.group.timeout_seconds),
        master_addr: args.group.master_addr,
    };
    let membership = EnvMembership::from_env();
    if let Some(source) = membership.source() {
        info!(source, "membership from launcher environment");
    }

    let bootstrap = Bootstrap::new(
        TcpConnector::new(config.master_addr),
        membership,
        PeerExchange::new(args.payload),
        config,
    );

    let group = bootstrap.init().await?;
    info!(
        rank = group.rank(),
        world_size = group.world_size(),
        joined = group.group().joined(),
        "joined process group"
    );
    println!("WORKER_SUCCESS_RANK_{}", group.rank());

    group.shutdown().await?;
    println!("WORKER_CLEAN_EXIT");

    Ok(ExitCode::SUCCESS)
}
