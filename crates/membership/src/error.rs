use std::error::Error as StdError;
use std::fmt::{self, Debug};

use thiserror::Error;

/// Marker trait for `MembershipProvider` errors
pub trait MembershipError: Debug + StdError + Send + Sync + 'static {
    /// Returns the kind of this error
    fn kind(&self) -> MembershipErrorKind;
}

/// The kind of membership error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MembershipErrorKind {
    /// The process was not started by a launcher this provider understands.
    Unavailable,

    /// The launcher supplied rank/world values that do not form a valid group.
    Invalid,
}

impl fmt::Display for MembershipErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Errors from resolving and validating group membership.
///
/// Both variants are fatal configuration errors and are never retried.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// Rank or world size could not be determined.
    #[error("membership unavailable: {0}")]
    MembershipUnavailable(String),

    /// Rank or world size are malformed or inconsistent.
    #[error("invalid membership: {0}")]
    InvalidMembership(String),
}

impl Error {
    /// Wraps a provider error, keeping its classification.
    pub fn from_provider<E: MembershipError>(error: &E) -> Self {
        match error.kind() {
            MembershipErrorKind::Unavailable => Self::MembershipUnavailable(error.to_string()),
            MembershipErrorKind::Invalid => Self::InvalidMembership(error.to_string()),
        }
    }
}

impl MembershipError for Error {
    fn kind(&self) -> MembershipErrorKind {
        match self {
            Self::MembershipUnavailable(_) => MembershipErrorKind::Unavailable,
            Self::InvalidMembership(_) => MembershipErrorKind::Invalid,
        }
    }
}
