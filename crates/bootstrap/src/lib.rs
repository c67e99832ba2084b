//! Process-group bootstrap over a rendezvous store.
//!
//! [`Bootstrap::init`] walks a small state machine:
//!
//! 1. `Uninitialized`: claim the init guard and build the store through a
//!    [`StoreConnector`].
//! 2. `StoreReady`: resolve rank and world size from the membership provider.
//! 3. `GroupReady`: hand `(store, rank, world_size)` to the [`CommRuntime`].
//!
//! Any failure releases the guard and leaves the bootstrap `Failed`.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod connector;
mod error;
mod group;
mod guard;
mod peer_exchange;
mod runtime;

pub use config::{BootstrapConfig, MASTER_ADDR_VAR, TIMEOUT_SECONDS_VAR};
pub use connector::{MemoryConnector, StoreConnector, TcpConnector};
pub use error::{BoxError, Error};
pub use group::{ProcessGroup, teardown_key};
pub use guard::InitGuard;
pub use peer_exchange::{PeerExchange, PeerExchangeError, PeerTable};
pub use runtime::CommRuntime;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use foehn_membership::{Membership, MembershipProvider};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Where a [`Bootstrap`] is in forming its group.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BootstrapState {
    /// Nothing done yet.
    Uninitialized,

    /// The store exists; membership not yet resolved.
    StoreReady,

    /// The runtime group is initialized.
    GroupReady,

    /// The last attempt failed; the guard was released.
    Failed,

    /// The group was shut down.
    Destroyed,
}

/// Forms a process group from a store connector, a membership provider and
/// a communication runtime.
pub struct Bootstrap<C, P, R> {
    connector: Arc<C>,
    membership: P,
    runtime: Arc<R>,
    config: BootstrapConfig,
    guard: InitGuard,
    state: Arc<watch::Sender<BootstrapState>>,
    rounds: AtomicU32,
}

impl<C, P, R> Bootstrap<C, P, R>
where
    C: StoreConnector,
    P: MembershipProvider,
    R: CommRuntime<C::Store>,
{
    /// Creates a bootstrap bound to the process-wide init guard.
    pub fn new(connector: C, membership: P, runtime: R, config: BootstrapConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            membership,
            runtime: Arc::new(runtime),
            config,
            guard: InitGuard::process(),
            state: Arc::new(watch::Sender::new(BootstrapState::Uninitialized)),
            rounds: AtomicU32::new(0),
        }
    }

    /// Uses `guard` instead of the process-wide guard.
    #[must_use]
    pub fn with_init_guard(mut self, guard: InitGuard) -> Self {
        self.guard = guard;
        self
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> BootstrapState {
        *self.state.borrow()
    }

    /// Follows state transitions as they happen.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BootstrapState> {
        self.state.subscribe()
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Forms the group.
    ///
    /// Fails fast with [`Error::AlreadyInitialized`] while another group holds
    /// the same guard.
    pub async fn init(&self) -> Result<ProcessGroup<C, R>, Error> {
        self.guard.claim()?;
        info!(timeout = ?self.config.timeout, "bootstrapping process group");

        match self.form_group().await {
            Ok(group) => Ok(group),
            Err(e) => {
                error!(error = %e, "bootstrap failed");
                self.guard.release();
                self.state.send_replace(BootstrapState::Failed);
                Err(e)
            }
        }
    }

    async fn form_group(&self) -> Result<ProcessGroup<C, R>, Error> {
        let store = self
            .connector
            .connect(&self.membership, self.config.timeout)
            .await?;
        self.state.send_replace(BootstrapState::StoreReady);
        debug!("store ready");

        let (membership, group) = match self.init_runtime(&store).await {
            Ok(initialized) => initialized,
            Err(e) => {
                self.connector.close(&store).await;
                return Err(e);
            }
        };
        let round = self.rounds.fetch_add(1, Ordering::AcqRel);
        self.state.send_replace(BootstrapState::GroupReady);
        info!(
            rank = membership.rank(),
            world_size = membership.world_size(),
            round,
            "process group ready"
        );

        Ok(ProcessGroup {
            membership,
            store,
            group,
            connector: self.connector.clone(),
            runtime: self.runtime.clone(),
            guard: self.guard.clone(),
            state: self.state.clone(),
            timeout: self.config.timeout,
            round,
        })
    }

    async fn init_runtime(&self, store: &C::Store) -> Result<(Membership, R::Group), Error> {
        let membership = Membership::resolve(&self.membership)?;

        let group = self
            .runtime
            .init_process_group(store.clone(), membership.rank(), membership.world_size())
            .await
            .map_err(Error::runtime)?;

        Ok((membership, group))
    }
}
