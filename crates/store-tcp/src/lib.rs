//! TCP implementation of the rendezvous store.
//!
//! One rank hosts a [`StoreServer`]; every rank (the host included) talks to it
//! through a [`TcpStore`] client. The server keeps the group's key space in a
//! `MemoryStore`, so all ranks see one consistent, append-only map.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod client;
mod error;
mod protocol;
mod server;

pub use client::TcpStore;
pub use error::Error;
pub use protocol::MAX_FRAME_SIZE;
pub use server::StoreServer;

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use foehn_store::DEFAULT_TIMEOUT;

/// Port the store server listens on when none is configured.
pub const DEFAULT_PORT: u16 = 29500;

/// TCP store configuration
#[derive(Clone, Debug)]
pub struct TcpStoreConfig {
    /// Address of the store server.
    pub addr: SocketAddr,

    /// Timeout for `wait` calls that pass none, and for the initial connect.
    pub default_timeout: Duration,

    /// Bound on a single non-blocking request (`set`, `get`, `add`, `check`).
    pub operation_timeout: Duration,

    /// First delay between retries of a failed connect or wait.
    pub retry_base_delay: Duration,

    /// Upper bound for the exponential retry delay.
    pub retry_max_delay: Duration,
}

impl TcpStoreConfig {
    /// Default configuration pointing at `addr`.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            ..Self::default()
        }
    }

    /// Sets the default timeout.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

impl Default for TcpStoreConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            default_timeout: DEFAULT_TIMEOUT,
            operation_timeout: Duration::from_secs(10),
            retry_base_delay: Duration::from_millis(50),
            retry_max_delay: Duration::from_secs(1),
        }
    }
}
