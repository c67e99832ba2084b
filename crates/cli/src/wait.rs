use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use std::time::Duration;

use bytes::Bytes;
use foehn_store::{RendezvousStore, StoreError, StoreErrorKind};
use foehn_store_tcp::{TcpStore, TcpStoreConfig};
use tracing::{info, warn};

use crate::Error;

/// Exit code when the keys did not all appear in time.
const WAIT_TIMEOUT_EXIT: u8 = 2;

#[derive(Clone, Debug, clap::Args)]
pub struct WaitArgs {
    /// Keys to wait for
    #[arg(long = "key", required = true)]
    keys: Vec<String>,

    /// Entries to set before waiting
    #[arg(long = "set", value_name = "KEY=VALUE")]
    entries: Vec<String>,

    /// How long to wait
    #[arg(long, default_value_t = 30, env = "FOEHN_TIMEOUT_SECONDS")]
    timeout_seconds: u64,
}

pub async fn run(args: WaitArgs) -> Result<ExitCode, Error> {
    let timeout = Duration::from_secs(args.timeout_seconds);
    let config = TcpStoreConfig::new(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .with_default_timeout(timeout);
    let store = TcpStore::host(config).await?;

    for entry in &args.entries {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| Error::InvalidEntry(entry.clone()))?;
        store
            .set(key, Bytes::copy_from_slice(value.as_bytes()))
            .await?;
    }

    let result = store.wait(args.keys.as_slice(), Some(timeout)).await;
    store.shutdown().await;

    match result {
        Ok(()) => {
            info!(keys = ?args.keys, "all keys present");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.kind() == StoreErrorKind::WaitTimeout => {
            warn!("{}", e);
            Ok(ExitCode::from(WAIT_TIMEOUT_EXIT))
        }
        Err(e) => Err(e.into()),
    }
}
