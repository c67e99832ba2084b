use std::error::Error as StdError;

use foehn_store::{StoreError, StoreErrorKind};
use thiserror::Error;

/// Boxed error from a pluggable component.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors that can occur while forming or tearing down a process group.
#[derive(Debug, Error)]
pub enum Error {
    /// A process group is already initialized in this process.
    #[error("process group already initialized")]
    AlreadyInitialized,

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Rank or world size could not be determined or are inconsistent.
    #[error(transparent)]
    Membership(#[from] foehn_membership::Error),

    /// The communication runtime failed.
    #[error("communication runtime error: {0}")]
    Runtime(#[source] BoxError),

    /// The rendezvous store failed.
    #[error("store error ({kind}): {source}")]
    Store {
        /// Backend-agnostic classification.
        kind: StoreErrorKind,
        /// The backend error.
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Wraps a store backend error.
    pub fn store<E: StoreError>(error: E) -> Self {
        Self::Store {
            kind: error.kind(),
            source: Box::new(error),
        }
    }

    /// Wraps a communication runtime error.
    pub fn runtime<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        Self::Runtime(Box::new(error))
    }

    /// The store error kind, if this is a store failure.
    #[must_use]
    pub const fn store_kind(&self) -> Option<StoreErrorKind> {
        match self {
            Self::Store { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
