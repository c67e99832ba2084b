use std::error::Error as StdError;

use async_trait::async_trait;
use foehn_store::RendezvousStore;

/// A communication layer that forms its group through a rendezvous store.
///
/// The runtime decides which keys it uses and when; the store only promises
/// `set`, `get`, `add` and `wait`.
#[async_trait]
pub trait CommRuntime<S: RendezvousStore>: Send + Sync + 'static {
    /// Handle to an initialized group.
    type Group: Send + Sync + 'static;

    /// Runtime-specific error type.
    type Error: StdError + Send + Sync + 'static;

    /// Forms the group. Every rank calls this with the same `world_size`.
    async fn init_process_group(
        &self,
        store: S,
        rank: u32,
        world_size: u32,
    ) -> Result<Self::Group, Self::Error>;

    /// Releases the group's resources.
    async fn destroy_process_group(&self, group: Self::Group) -> Result<(), Self::Error> {
        drop(group);
        Ok(())
    }
}
