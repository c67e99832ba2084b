use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::RendezvousStore;

/// A store view that places every key under a scope.
///
/// Scopes nest: scoping `a` and then `b` stores keys as `a/b/<key>`.
#[derive(Clone, Debug)]
pub struct PrefixStore<S> {
    inner: S,
    prefix: String,
}

impl<S: RendezvousStore> PrefixStore<S> {
    /// Creates a new `PrefixStore` over `inner`.
    pub fn new<P: Into<String>>(inner: S, scope: P) -> Self {
        Self {
            inner,
            prefix: scope.into(),
        }
    }

    /// Returns a further-scoped view sharing the same underlying store.
    #[must_use]
    pub fn scope<P: Into<String>>(&self, scope: P) -> Self {
        Self {
            inner: self.inner.clone(),
            prefix: format!("{}/{}", self.prefix, scope.into()),
        }
    }

    /// The full prefix applied to keys.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the unscoped store.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn get_key(&self, key: String) -> String {
        // Empty keys pass through so the inner store rejects them.
        if key.is_empty() {
            key
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }

    fn get_keys<K: AsRef<str>>(&self, keys: &[K]) -> Vec<String> {
        keys.iter()
            .map(|key| self.get_key(key.as_ref().to_string()))
            .collect()
    }
}

#[async_trait]
impl<S: RendezvousStore> RendezvousStore for PrefixStore<S> {
    type Error = S::Error;

    async fn set<K: Into<String> + Send>(&self, key: K, value: Bytes) -> Result<(), Self::Error> {
        self.inner.set(self.get_key(key.into()), value).await
    }

    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Bytes, Self::Error> {
        self.inner.get(self.get_key(key.into())).await
    }

    async fn add<K: Into<String> + Send>(&self, key: K, amount: i64) -> Result<i64, Self::Error> {
        self.inner.add(self.get_key(key.into()), amount).await
    }

    async fn check<K: AsRef<str> + Sync>(&self, keys: &[K]) -> Result<bool, Self::Error> {
        let keys = self.get_keys(keys);
        self.inner.check(keys.as_slice()).await
    }

    async fn wait<K: AsRef<str> + Sync>(
        &self,
        keys: &[K],
        timeout: Option<Duration>,
    ) -> Result<(), Self::Error> {
        let keys = self.get_keys(keys);
        self.inner.wait(keys.as_slice(), timeout).await
    }

    fn default_timeout(&self) -> Duration {
        self.inner.default_timeout()
    }
}
