//! Abstract interface for rendezvous stores used to bootstrap process groups.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod prefix;

pub use error::{StoreError, StoreErrorKind};
pub use prefix::PrefixStore;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// Timeout applied to `wait` when the caller does not pass one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Returns `true` if `key` may be used with a store.
#[must_use]
pub const fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
}

/// A trait representing a group-wide key-value space with blocking waits.
///
/// Entries are append-only: a key is bound once with `set`, or accumulated with
/// `add`, and never removed for the lifetime of the store. Every participant in
/// a group observes the same value for a given key.
#[async_trait]
pub trait RendezvousStore: Clone + Send + Sync + 'static {
    /// The error type for store operations.
    type Error: StoreError;

    /// Commits an immutable binding for `key`.
    ///
    /// Setting the same value again is a no-op. Setting a different value fails
    /// with [`StoreErrorKind::DuplicateKeyConflict`] and keeps the first value.
    async fn set<K: Into<String> + Send>(&self, key: K, value: Bytes) -> Result<(), Self::Error>;

    /// Returns the value bound to `key` without blocking.
    ///
    /// Fails with [`StoreErrorKind::KeyNotFound`] if no participant has set it.
    /// Counter keys read back as the decimal rendering of their total.
    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Bytes, Self::Error>;

    /// Atomically adds `amount` to the counter at `key` and returns the new total.
    ///
    /// A missing key starts at zero.
    async fn add<K: Into<String> + Send>(&self, key: K, amount: i64) -> Result<i64, Self::Error>;

    /// Returns `true` if every key in `keys` is currently set.
    async fn check<K: AsRef<str> + Sync>(&self, keys: &[K]) -> Result<bool, Self::Error>;

    /// Blocks until every key in `keys` is set.
    ///
    /// `None` uses [`RendezvousStore::default_timeout`]. A zero timeout polls once.
    /// Fails with [`StoreErrorKind::WaitTimeout`] if the deadline passes first.
    async fn wait<K: AsRef<str> + Sync>(
        &self,
        keys: &[K],
        timeout: Option<Duration>,
    ) -> Result<(), Self::Error>;

    /// The timeout used by `wait` when none is given.
    fn default_timeout(&self) -> Duration;
}

/// Extension methods available on every [`RendezvousStore`].
pub trait RendezvousStoreExt: RendezvousStore {
    /// Returns a view of this store where every key lives under `scope`.
    fn scope<S: Into<String>>(&self, scope: S) -> PrefixStore<Self> {
        PrefixStore::new(self.clone(), scope)
    }
}

impl<T: RendezvousStore> RendezvousStoreExt for T {}
