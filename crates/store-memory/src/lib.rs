//! In-memory (single process) implementation of the rendezvous store.
//!
//! Clones share one key space, so ranks simulated as tasks in one process can
//! rendezvous through it. It is also the state machine behind the TCP server.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use foehn_store::{DEFAULT_TIMEOUT, RendezvousStore, is_valid_key};
use tokio::sync::{Mutex, Notify};
use tokio::time::{Instant, timeout_at};
use tracing::debug;

// Caps deadlines so `Instant` arithmetic never overflows.
const MAX_WAIT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

#[derive(Clone, Debug)]
enum Slot {
    Counter(i64),
    Value(Bytes),
}

#[derive(Debug, Default)]
struct Shared {
    map: Mutex<HashMap<String, Slot>>,
    changed: Notify,
}

/// In-memory rendezvous store.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    default_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a new, empty `MemoryStore`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the timeout used by `wait` when the caller passes none.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    async fn missing<K: AsRef<str>>(&self, keys: &[K]) -> Vec<String> {
        let map = self.shared.map.lock().await;
        keys.iter()
            .map(AsRef::as_ref)
            .filter(|key| !map.contains_key(*key))
            .map(ToString::to_string)
            .collect()
    }
}

fn validate_keys<K: AsRef<str>>(keys: &[K]) -> Result<(), Error> {
    if keys.iter().all(|key| is_valid_key(key.as_ref())) {
        Ok(())
    } else {
        Err(Error::InvalidKey)
    }
}

#[async_trait]
impl RendezvousStore for MemoryStore {
    type Error = Error;

    async fn set<K: Into<String> + Send>(&self, key: K, value: Bytes) -> Result<(), Self::Error> {
        let key = key.into();
        if !is_valid_key(&key) {
            return Err(Error::InvalidKey);
        }

        let mut map = self.shared.map.lock().await;
        match map.entry(key) {
            Entry::Occupied(entry) => {
                return match entry.get() {
                    Slot::Value(existing) if *existing == value => {
                        debug!(key = %entry.key(), "identical value already set");
                        Ok(())
                    }
                    Slot::Value(_) => Err(Error::DuplicateKeyConflict(entry.key().clone())),
                    Slot::Counter(_) => Err(Error::KeyTypeMismatch(entry.key().clone())),
                };
            }
            Entry::Vacant(entry) => {
                debug!(key = %entry.key(), len = value.len(), "set");
                entry.insert(Slot::Value(value));
            }
        }
        drop(map);

        self.shared.changed.notify_waiters();
        Ok(())
    }

    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Bytes, Self::Error> {
        let key = key.into();
        if !is_valid_key(&key) {
            return Err(Error::InvalidKey);
        }

        let map = self.shared.map.lock().await;
        match map.get(&key) {
            Some(Slot::Value(value)) => Ok(value.clone()),
            Some(Slot::Counter(total)) => Ok(Bytes::from(total.to_string())),
            None => Err(Error::KeyNotFound(key)),
        }
    }

    async fn add<K: Into<String> + Send>(&self, key: K, amount: i64) -> Result<i64, Self::Error> {
        let key = key.into();
        if !is_valid_key(&key) {
            return Err(Error::InvalidKey);
        }

        let mut map = self.shared.map.lock().await;
        let total = match map.entry(key) {
            Entry::Occupied(mut entry) => {
                let current = match entry.get() {
                    Slot::Counter(current) => *current,
                    Slot::Value(_) => return Err(Error::KeyTypeMismatch(entry.key().clone())),
                };
                let total = current
                    .checked_add(amount)
                    .ok_or_else(|| Error::CounterOverflow(entry.key().clone()))?;
                entry.insert(Slot::Counter(total));
                total
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot::Counter(amount));
                amount
            }
        };
        drop(map);

        self.shared.changed.notify_waiters();
        Ok(total)
    }

    async fn check<K: AsRef<str> + Sync>(&self, keys: &[K]) -> Result<bool, Self::Error> {
        validate_keys(keys)?;
        Ok(self.missing(keys).await.is_empty())
    }

    async fn wait<K: AsRef<str> + Sync>(
        &self,
        keys: &[K],
        timeout: Option<Duration>,
    ) -> Result<(), Self::Error> {
        validate_keys(keys)?;

        let timeout = timeout.unwrap_or(self.default_timeout);
        let deadline = Instant::now() + timeout.min(MAX_WAIT);

        loop {
            // Register interest before checking so a concurrent `set` is not missed.
            let changed = self.shared.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if self.missing(keys).await.is_empty() {
                return Ok(());
            }

            if timeout_at(deadline, changed).await.is_err() {
                let missing = self.missing(keys).await;
                if missing.is_empty() {
                    return Ok(());
                }

                debug!(?missing, ?timeout, "wait timed out");
                return Err(Error::WaitTimeout { missing, timeout });
            }
        }
    }

    fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use foehn_store::{RendezvousStoreExt, StoreError, StoreErrorKind};

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        let value = Bytes::from_static(b"10.0.0.3:4000");

        store.set("addr/rank3", value.clone()).await.unwrap();
        let result = store.get("addr/rank3").await.unwrap();

        assert_eq!(result, value);
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = MemoryStore::new();

        let result = store.get("never-set").await;

        assert_matches!(result, Err(Error::KeyNotFound(key)) if key == "never-set");
    }

    #[tokio::test]
    async fn test_duplicate_set_conflict_keeps_first_value() {
        let store = MemoryStore::new();

        store.set("x", Bytes::from_static(b"A")).await.unwrap();
        let err = store.set("x", Bytes::from_static(b"B")).await.unwrap_err();

        assert_eq!(err.kind(), StoreErrorKind::DuplicateKeyConflict);
        assert_eq!(store.get("x").await.unwrap(), Bytes::from_static(b"A"));
    }

    #[tokio::test]
    async fn test_identical_set_is_noop() {
        let store = MemoryStore::new();

        store.set("x", Bytes::from_static(b"A")).await.unwrap();
        store.set("x", Bytes::from_static(b"A")).await.unwrap();

        assert_eq!(store.get("x").await.unwrap(), Bytes::from_static(b"A"));
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let store = MemoryStore::new();

        assert_matches!(
            store.set("", Bytes::from_static(b"v")).await,
            Err(Error::InvalidKey)
        );
        assert_matches!(store.get("").await, Err(Error::InvalidKey));
        assert_matches!(store.add("", 1).await, Err(Error::InvalidKey));
        assert_matches!(
            store.wait(&["ok", ""], Some(Duration::ZERO)).await,
            Err(Error::InvalidKey)
        );
    }

    #[tokio::test]
    async fn test_add_creates_and_accumulates() {
        let store = MemoryStore::new();

        assert_eq!(store.add("count", 5).await.unwrap(), 5);
        assert_eq!(store.add("count", -2).await.unwrap(), 3);
        assert_eq!(store.get("count").await.unwrap(), Bytes::from_static(b"3"));
    }

    #[tokio::test]
    async fn test_add_overflow() {
        let store = MemoryStore::new();

        store.add("count", i64::MAX).await.unwrap();

        assert_matches!(store.add("count", 1).await, Err(Error::CounterOverflow(_)));
        assert_eq!(
            store.get("count").await.unwrap(),
            Bytes::from(i64::MAX.to_string())
        );
    }

    #[tokio::test]
    async fn test_value_and_counter_do_not_mix() {
        let store = MemoryStore::new();

        store.set("plain", Bytes::from_static(b"v")).await.unwrap();
        store.add("counter", 1).await.unwrap();

        assert_matches!(store.add("plain", 1).await, Err(Error::KeyTypeMismatch(_)));
        assert_matches!(
            store.set("counter", Bytes::from_static(b"1")).await,
            Err(Error::KeyTypeMismatch(_))
        );
    }

    #[tokio::test]
    async fn test_concurrent_adds_lose_nothing() {
        let store = MemoryStore::new();
        let tasks = 64;

        let handles: Vec<_> = (0..tasks)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.add("count", 1).await.unwrap() })
            })
            .collect();

        let mut totals = Vec::new();
        for handle in handles {
            totals.push(handle.await.unwrap());
        }
        totals.sort_unstable();

        assert_eq!(totals, (1..=tasks).collect::<Vec<i64>>());
        assert_eq!(store.get("count").await.unwrap(), Bytes::from(tasks.to_string()));
    }

    #[tokio::test]
    async fn test_wait_returns_after_set() {
        let store = MemoryStore::new();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .wait(&["rank0", "rank1"], Some(Duration::from_secs(5)))
                    .await
            })
        };

        store.set("rank0", Bytes::from_static(b"ready")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        store.set("rank1", Bytes::from_static(b"ready")).await.unwrap();
        waiter.await.unwrap().unwrap();

        assert_eq!(
            store.get("rank1").await.unwrap(),
            Bytes::from_static(b"ready")
        );
    }

    #[tokio::test]
    async fn test_wait_on_counter_key() {
        let store = MemoryStore::new();

        store.add("joined", 1).await.unwrap();

        store.wait(&["joined"], Some(Duration::ZERO)).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_empty_key_list() {
        let store = MemoryStore::new();
        let keys: [&str; 0] = [];

        store.wait(&keys, Some(Duration::ZERO)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_after_deadline() {
        let store = MemoryStore::new();
        let start = Instant::now();

        let err = store
            .wait(&["missing"], Some(Duration::from_secs(1)))
            .await
            .unwrap_err();

        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_matches!(err, Error::WaitTimeout { ref missing, .. } if missing == &["missing"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_uses_default_timeout() {
        let store = MemoryStore::new().with_default_timeout(Duration::from_secs(3));
        let start = Instant::now();

        let err = store.wait(&["missing"], None).await.unwrap_err();

        assert_eq!(err.kind(), StoreErrorKind::WaitTimeout);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_zero_timeout_polls_once() {
        let store = MemoryStore::new();

        assert_matches!(
            store.wait(&["k"], Some(Duration::ZERO)).await,
            Err(Error::WaitTimeout { .. })
        );

        store.set("k", Bytes::from_static(b"v")).await.unwrap();
        store.wait(&["k"], Some(Duration::ZERO)).await.unwrap();
    }

    #[tokio::test]
    async fn test_check() {
        let store = MemoryStore::new();

        assert!(!store.check(&["a"]).await.unwrap());
        store.set("a", Bytes::from_static(b"1")).await.unwrap();
        assert!(store.check(&["a"]).await.unwrap());
    }

    #[tokio::test]
    async fn test_scope() {
        let store = MemoryStore::new();
        let scoped = store.scope("group");

        scoped.set("rank0", Bytes::from_static(b"ready")).await.unwrap();

        assert_eq!(
            store.get("group/rank0").await.unwrap(),
            Bytes::from_static(b"ready")
        );
        assert_matches!(store.get("rank0").await, Err(Error::KeyNotFound(_)));
        scoped.wait(&["rank0"], Some(Duration::ZERO)).await.unwrap();
    }

    #[tokio::test]
    async fn test_nested_scope() {
        let store = MemoryStore::new();
        let outer = store.scope("outer");
        let inner = outer.scope("inner");

        inner.add("count", 2).await.unwrap();

        assert_eq!(inner.prefix(), "outer/inner");
        assert_eq!(
            store.get("outer/inner/count").await.unwrap(),
            Bytes::from_static(b"2")
        );
        assert_matches!(outer.get("count").await, Err(Error::KeyNotFound(_)));
    }

    #[tokio::test]
    async fn test_scope_still_rejects_empty_key() {
        let store = MemoryStore::new();
        let scoped = store.scope("group");

        assert_matches!(scoped.get("").await, Err(Error::InvalidKey));
    }
}
