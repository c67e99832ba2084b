use std::error::Error;
use std::fmt::{self, Debug};

use serde::{Deserialize, Serialize};

/// Marker trait for `RendezvousStore` errors
pub trait StoreError: Debug + Error + Send + Sync + 'static {
    /// Returns the kind of this error
    fn kind(&self) -> StoreErrorKind;
}

/// The kind of store error, shared by every backend.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum StoreErrorKind {
    /// `get` on a key nobody has set.
    KeyNotFound,

    /// `wait` did not observe every key before its deadline.
    WaitTimeout,

    /// `set` on a key already bound to a different value.
    DuplicateKeyConflict,

    /// A key was used both as a plain value and as a counter.
    KeyTypeMismatch,

    /// The key is malformed (empty).
    InvalidKey,

    /// `add` would overflow the counter.
    CounterOverflow,

    /// Connectivity to the shared key space failed.
    Transport,

    /// Other/unknown error
    Other,
}

impl StoreErrorKind {
    /// Whether an operation failing with this kind may succeed if retried.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Transport)
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_transient() {
        assert!(StoreErrorKind::Transport.is_transient());
        assert!(!StoreErrorKind::WaitTimeout.is_transient());
        assert!(!StoreErrorKind::DuplicateKeyConflict.is_transient());
        assert!(!StoreErrorKind::KeyNotFound.is_transient());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(StoreErrorKind::KeyNotFound.to_string(), "KeyNotFound");
    }
}
