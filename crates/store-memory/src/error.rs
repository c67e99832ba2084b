use std::time::Duration;

use foehn_store::{StoreError, StoreErrorKind};
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// `add` would overflow the counter.
    #[error("counter '{0}' would overflow")]
    CounterOverflow(String),

    /// The key is already bound to a different value.
    #[error("key '{0}' is already set to a different value")]
    DuplicateKeyConflict(String),

    /// Keys must be non-empty.
    #[error("invalid key: keys must not be empty")]
    InvalidKey,

    /// No participant has set the key.
    #[error("key '{0}' not found")]
    KeyNotFound(String),

    /// The key is used as both a plain value and a counter.
    #[error("key '{0}' is used as both a value and a counter")]
    KeyTypeMismatch(String),

    /// Some keys were still missing when the deadline passed.
    #[error("timed out after {timeout:?} waiting for keys {missing:?}")]
    WaitTimeout {
        /// Keys that were not set in time.
        missing: Vec<String>,
        /// The timeout that elapsed.
        timeout: Duration,
    },
}

impl StoreError for Error {
    fn kind(&self) -> StoreErrorKind {
        match self {
            Self::CounterOverflow(_) => StoreErrorKind::CounterOverflow,
            Self::DuplicateKeyConflict(_) => StoreErrorKind::DuplicateKeyConflict,
            Self::InvalidKey => StoreErrorKind::InvalidKey,
            Self::KeyNotFound(_) => StoreErrorKind::KeyNotFound,
            Self::KeyTypeMismatch(_) => StoreErrorKind::KeyTypeMismatch,
            Self::WaitTimeout { .. } => StoreErrorKind::WaitTimeout,
        }
    }
}
