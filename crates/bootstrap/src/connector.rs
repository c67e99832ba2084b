use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use foehn_membership::{Membership, MembershipProvider};
use foehn_store::RendezvousStore;
use foehn_store_memory::MemoryStore;
use foehn_store_tcp::{TcpStore, TcpStoreConfig};
use tracing::info;

use crate::Error;

/// Builds the rendezvous store a process group coordinates through.
#[async_trait]
pub trait StoreConnector: Send + Sync + 'static {
    /// Store type handed to the runtime.
    type Store: RendezvousStore;

    /// Creates this process's store with `timeout` as its default wait bound.
    async fn connect<P: MembershipProvider>(
        &self,
        membership: &P,
        timeout: Duration,
    ) -> Result<Self::Store, Error>;

    /// Releases whatever `connect` set up.
    async fn close(&self, store: &Self::Store) {
        let _ = store;
    }
}

/// Hands out clones of one in-process `MemoryStore`.
///
/// Every "rank" bootstrapped through the same connector shares a key space,
/// which lets a single process stand in for a whole group.
#[derive(Clone, Debug, Default)]
pub struct MemoryConnector {
    store: MemoryStore,
}

impl MemoryConnector {
    /// Connector sharing `store`.
    #[must_use]
    pub const fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    /// The shared store.
    #[must_use]
    pub const fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    type Store = MemoryStore;

    async fn connect<P: MembershipProvider>(
        &self,
        _membership: &P,
        timeout: Duration,
    ) -> Result<Self::Store, Error> {
        Ok(self.store.clone().with_default_timeout(timeout))
    }
}

/// Connects over TCP; rank 0 hosts the server at the master address.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    master_addr: SocketAddr,
}

impl TcpConnector {
    /// Connector for a group whose rank 0 listens on `master_addr`.
    #[must_use]
    pub const fn new(master_addr: SocketAddr) -> Self {
        Self { master_addr }
    }
}

#[async_trait]
impl StoreConnector for TcpConnector {
    type Store = TcpStore;

    async fn connect<P: MembershipProvider>(
        &self,
        membership: &P,
        timeout: Duration,
    ) -> Result<Self::Store, Error> {
        let membership = Membership::resolve(membership)?;
        let config = TcpStoreConfig::new(self.master_addr).with_default_timeout(timeout);

        if membership.is_root() {
            info!(addr = %self.master_addr, "hosting store server");
            TcpStore::host(config).await.map_err(Error::store)
        } else {
            TcpStore::connect(config).await.map_err(Error::store)
        }
    }

    async fn close(&self, store: &Self::Store) {
        store.shutdown().await;
    }
}
