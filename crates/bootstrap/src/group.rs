use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use foehn_membership::Membership;
use foehn_store::RendezvousStore;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{BootstrapState, CommRuntime, Error, InitGuard, StoreConnector};

/// Key rank `rank` sets once it has torn down its side of group `round`.
///
/// The first group a bootstrap forms tears down under `foehn/teardown/`;
/// later ones add a `round{n}/` scope so stale markers are never reused.
#[must_use]
pub fn teardown_key(round: u32, rank: u32) -> String {
    if round == 0 {
        format!("foehn/teardown/rank{rank}")
    } else {
        format!("foehn/teardown/round{round}/rank{rank}")
    }
}

/// An initialized process group.
///
/// Holds the single-initialization guard until [`ProcessGroup::shutdown`].
pub struct ProcessGroup<C, R>
where
    C: StoreConnector,
    R: CommRuntime<C::Store>,
{
    pub(crate) membership: Membership,
    pub(crate) store: C::Store,
    pub(crate) group: R::Group,
    pub(crate) connector: Arc<C>,
    pub(crate) runtime: Arc<R>,
    pub(crate) guard: InitGuard,
    pub(crate) state: Arc<watch::Sender<BootstrapState>>,
    pub(crate) timeout: Duration,
    pub(crate) round: u32,
}

impl<C, R> std::fmt::Debug for ProcessGroup<C, R>
where
    C: StoreConnector,
    R: CommRuntime<C::Store>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessGroup")
            .field("membership", &self.membership)
            .field("guard", &self.guard)
            .field("timeout", &self.timeout)
            .field("round", &self.round)
            .finish_non_exhaustive()
    }
}

impl<C, R> ProcessGroup<C, R>
where
    C: StoreConnector,
    R: CommRuntime<C::Store>,
{
    /// This process's rank.
    #[must_use]
    pub const fn rank(&self) -> u32 {
        self.membership.rank()
    }

    /// The group size.
    #[must_use]
    pub const fn world_size(&self) -> u32 {
        self.membership.world_size()
    }

    /// The rendezvous store the group formed through.
    #[must_use]
    pub const fn store(&self) -> &C::Store {
        &self.store
    }

    /// How many groups the owning bootstrap formed before this one.
    #[must_use]
    pub const fn round(&self) -> u32 {
        self.round
    }

    /// The runtime's group handle.
    #[must_use]
    pub const fn group(&self) -> &R::Group {
        &self.group
    }

    /// Destroys the runtime group and runs the teardown rendezvous.
    ///
    /// Every rank marks itself done; rank 0 then waits for all ranks before
    /// releasing the store, so a hosted server outlives its last user. The
    /// guard is released even when a step fails.
    pub async fn shutdown(self) -> Result<(), Error> {
        let Self {
            membership,
            store,
            group,
            connector,
            runtime,
            guard,
            state,
            timeout,
            round,
        } = self;

        let destroyed = runtime
            .destroy_process_group(group)
            .await
            .map_err(Error::runtime);
        let teardown = teardown(&store, membership, round, timeout).await;

        connector.close(&store).await;
        guard.release();
        state.send_replace(BootstrapState::Destroyed);

        match (&destroyed, &teardown) {
            (Ok(()), Ok(())) => info!(rank = membership.rank(), "process group destroyed"),
            _ => warn!(rank = membership.rank(), "process group destroyed with errors"),
        }

        destroyed.and(teardown)
    }
}

async fn teardown<S: RendezvousStore>(
    store: &S,
    membership: Membership,
    round: u32,
    timeout: Duration,
) -> Result<(), Error> {
    store
        .set(teardown_key(round, membership.rank()), Bytes::from_static(b"done"))
        .await
        .map_err(Error::store)?;

    if membership.is_root() {
        let keys: Vec<String> = membership
            .ranks()
            .map(|rank| teardown_key(round, rank))
            .collect();
        store
            .wait(keys.as_slice(), Some(timeout))
            .await
            .map_err(Error::store)?;
    }

    Ok(())
}
