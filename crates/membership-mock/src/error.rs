//! Error types for the mock membership provider.

use foehn_membership::{MembershipError, MembershipErrorKind};
use thiserror::Error;

/// Error type for the mock membership provider.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The mock was built with [`crate::MockMembership::unavailable`].
    #[error("mock membership configured as unavailable")]
    Unavailable,
}

impl MembershipError for Error {
    fn kind(&self) -> MembershipErrorKind {
        match self {
            Self::Unavailable => MembershipErrorKind::Unavailable,
        }
    }
}
