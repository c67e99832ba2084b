use std::net::SocketAddr;
use std::time::Duration;

use foehn_store::{StoreError, StoreErrorKind};
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Connecting to the store server did not succeed in time.
    #[error("could not reach store server at {0}")]
    ConnectTimeout(SocketAddr),

    /// `add` would overflow the counter.
    #[error("counter '{0}' would overflow")]
    CounterOverflow(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// The key is already bound to a different value.
    #[error("key '{0}' is already set to a different value")]
    DuplicateKeyConflict(String),

    /// A frame exceeded the maximum frame size.
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    /// Keys must be non-empty.
    #[error("invalid key: keys must not be empty")]
    InvalidKey,

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// No participant has set the key.
    #[error("key '{0}' not found")]
    KeyNotFound(String),

    /// The key is used as both a plain value and a counter.
    #[error("key '{0}' is used as both a value and a counter")]
    KeyTypeMismatch(String),

    /// The server reported an error this client has no variant for.
    #[error("store server error ({kind}): {message}")]
    Remote {
        /// Kind reported by the server.
        kind: StoreErrorKind,
        /// Message reported by the server.
        message: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialize(String),

    /// The server answered with a response that does not match the request.
    #[error("unexpected response to {0} request")]
    UnexpectedResponse(&'static str),

    /// Some keys were still missing when the deadline passed.
    #[error("timed out after {timeout:?} waiting for keys {missing:?}")]
    WaitTimeout {
        /// Keys that were not observed in time.
        missing: Vec<String>,
        /// The timeout that elapsed.
        timeout: Duration,
    },
}

impl Error {
    /// Rebuilds an error reported by the server for a request on `key`.
    pub(crate) fn from_remote(kind: StoreErrorKind, message: String, key: Option<&str>) -> Self {
        let key = || key.unwrap_or_default().to_string();

        match kind {
            StoreErrorKind::CounterOverflow => Self::CounterOverflow(key()),
            StoreErrorKind::DuplicateKeyConflict => Self::DuplicateKeyConflict(key()),
            StoreErrorKind::InvalidKey => Self::InvalidKey,
            StoreErrorKind::KeyNotFound => Self::KeyNotFound(key()),
            StoreErrorKind::KeyTypeMismatch => Self::KeyTypeMismatch(key()),
            _ => Self::Remote { kind, message },
        }
    }
}

impl StoreError for Error {
    fn kind(&self) -> StoreErrorKind {
        match self {
            Self::ConnectTimeout(_)
            | Self::Deserialize(_)
            | Self::FrameTooLarge(_)
            | Self::Io(..)
            | Self::Serialize(_)
            | Self::UnexpectedResponse(_) => StoreErrorKind::Transport,
            Self::CounterOverflow(_) => StoreErrorKind::CounterOverflow,
            Self::DuplicateKeyConflict(_) => StoreErrorKind::DuplicateKeyConflict,
            Self::InvalidKey => StoreErrorKind::InvalidKey,
            Self::KeyNotFound(_) => StoreErrorKind::KeyNotFound,
            Self::KeyTypeMismatch(_) => StoreErrorKind::KeyTypeMismatch,
            Self::Remote { kind, .. } => *kind,
            Self::WaitTimeout { .. } => StoreErrorKind::WaitTimeout,
        }
    }
}
