use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use foehn_store::{RendezvousStore, StoreError, StoreErrorKind};
use thiserror::Error;
use tracing::{debug, info};

use crate::{BoxError, CommRuntime};

/// Errors from [`PeerExchange`].
#[derive(Debug, Error)]
pub enum PeerExchangeError {
    /// The number of ranks that joined does not match the world size.
    #[error("expected {expected} members, {joined} joined")]
    MemberCount {
        /// The world size.
        expected: u32,
        /// The members counter after every rank published.
        joined: i64,
    },

    /// The rendezvous store failed.
    #[error("store error ({0}): {1}")]
    Store(StoreErrorKind, #[source] BoxError),
}

impl PeerExchangeError {
    fn store<E: StoreError>(error: E) -> Self {
        Self::Store(error.kind(), Box::new(error))
    }
}

/// Minimal communication runtime: every rank publishes a payload and
/// collects everyone else's.
///
/// Rank `r` joins the `members` counter, sets `rank{r}` to its payload and
/// waits for every rank's key. Keys live under an optional prefix so
/// several exchanges can share one store.
///
/// Entries are never removed, so each group formed after the first uses a
/// fresh `round{n}/` scope. Every rank counts its own completed rounds; ranks
/// re-forming together agree on `n`.
#[derive(Debug)]
pub struct PeerExchange {
    payload: Bytes,
    prefix: Option<String>,
    rounds: AtomicU32,
}

impl PeerExchange {
    /// Exchange publishing `payload` for this rank.
    pub fn new<B: Into<Bytes>>(payload: B) -> Self {
        Self {
            payload: payload.into(),
            prefix: None,
            rounds: AtomicU32::new(0),
        }
    }

    /// Places every key under `prefix/`.
    #[must_use]
    pub fn with_prefix<P: Into<String>>(mut self, prefix: P) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Groups this exchange has formed so far.
    #[must_use]
    pub fn rounds(&self) -> u32 {
        self.rounds.load(Ordering::Acquire)
    }

    fn key(&self, round: u32, name: &str) -> String {
        let mut key = String::new();
        if let Some(prefix) = &self.prefix {
            key.push_str(prefix);
            key.push('/');
        }
        if round > 0 {
            key.push_str(&format!("round{round}/"));
        }
        key.push_str(name);
        key
    }

    fn rank_key(&self, round: u32, rank: u32) -> String {
        self.key(round, &format!("rank{rank}"))
    }
}

/// Payloads published by every rank, indexed by rank.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PeerTable {
    rank: u32,
    peers: Vec<Bytes>,
    joined: i64,
}

impl PeerTable {
    /// The local rank.
    #[must_use]
    pub const fn rank(&self) -> u32 {
        self.rank
    }

    /// Every rank's payload.
    #[must_use]
    pub fn peers(&self) -> &[Bytes] {
        &self.peers
    }

    /// The payload published by `rank`.
    #[must_use]
    pub fn peer(&self, rank: u32) -> Option<&Bytes> {
        self.peers.get(usize::try_from(rank).ok()?)
    }

    /// How many ranks joined.
    #[must_use]
    pub const fn joined(&self) -> i64 {
        self.joined
    }
}

#[async_trait]
impl<S: RendezvousStore> CommRuntime<S> for PeerExchange {
    type Group = PeerTable;
    type Error = PeerExchangeError;

    async fn init_process_group(
        &self,
        store: S,
        rank: u32,
        world_size: u32,
    ) -> Result<Self::Group, Self::Error> {
        let round = self.rounds();
        let members_key = self.key(round, "members");

        // Join before publishing: once every rank key is visible, every
        // increment has landed.
        store
            .add(members_key.clone(), 1)
            .await
            .map_err(PeerExchangeError::store)?;
        store
            .set(self.rank_key(round, rank), self.payload.clone())
            .await
            .map_err(PeerExchangeError::store)?;
        debug!(rank, round, "published payload");

        let keys: Vec<String> = (0..world_size).map(|r| self.rank_key(round, r)).collect();
        store
            .wait(keys.as_slice(), None)
            .await
            .map_err(PeerExchangeError::store)?;

        let joined = store
            .add(members_key, 0)
            .await
            .map_err(PeerExchangeError::store)?;
        if joined != i64::from(world_size) {
            return Err(PeerExchangeError::MemberCount {
                expected: world_size,
                joined,
            });
        }

        let mut peers = Vec::with_capacity(keys.len());
        for key in keys {
            peers.push(store.get(key).await.map_err(PeerExchangeError::store)?);
        }

        self.rounds.fetch_add(1, Ordering::AcqRel);
        info!(rank, world_size, round, "peer exchange complete");
        Ok(PeerTable {
            rank,
            peers,
            joined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use assert_matches::assert_matches;
    use foehn_store_memory::MemoryStore;

    #[tokio::test]
    async fn test_single_rank_exchange() {
        let store = MemoryStore::new();
        let exchange = PeerExchange::new("10.0.0.1:7000");

        let table = exchange.init_process_group(store.clone(), 0, 1).await.unwrap();

        assert_eq!(table.rank(), 0);
        assert_eq!(table.joined(), 1);
        assert_eq!(table.peer(0), Some(&Bytes::from_static(b"10.0.0.1:7000")));
        assert_eq!(table.peer(1), None);
        assert_eq!(
            store.get("rank0").await.unwrap(),
            Bytes::from_static(b"10.0.0.1:7000")
        );
    }

    #[tokio::test]
    async fn test_prefixed_keys() {
        let store = MemoryStore::new();
        let exchange = PeerExchange::new("ready").with_prefix("job1");

        exchange.init_process_group(store.clone(), 0, 1).await.unwrap();

        assert!(store.check(&["job1/rank0", "job1/members"]).await.unwrap());
        assert!(!store.check(&["rank0"]).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_round_on_same_store() {
        let store = MemoryStore::new();
        let exchange = PeerExchange::new("ready").with_prefix("job1");

        let first = exchange.init_process_group(store.clone(), 0, 1).await.unwrap();
        let second = exchange.init_process_group(store.clone(), 0, 1).await.unwrap();

        assert_eq!(first.joined(), 1);
        assert_eq!(second.joined(), 1);
        assert_eq!(exchange.rounds(), 2);
        assert!(store.check(&["job1/rank0", "job1/round1/rank0"]).await.unwrap());
    }

    #[tokio::test]
    async fn test_extra_member_detected() {
        let store = MemoryStore::new();
        store.add("members", 1).await.unwrap();

        let result = PeerExchange::new("ready")
            .init_process_group(store, 0, 1)
            .await;

        assert_matches!(
            result,
            Err(PeerExchangeError::MemberCount {
                expected: 1,
                joined: 2
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_peer_times_out() {
        let store = MemoryStore::new().with_default_timeout(Duration::from_secs(1));

        let result = PeerExchange::new("ready")
            .init_process_group(store, 0, 2)
            .await;

        assert_matches!(
            result,
            Err(PeerExchangeError::Store(StoreErrorKind::WaitTimeout, _))
        );
    }
}
