use foehn_membership::{MembershipError, MembershipErrorKind};
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// No known launcher variable pair is set.
    #[error("no launcher environment found (tried {0})")]
    NotLaunched(String),

    /// A launcher variable holds something other than a non-negative integer.
    #[error("{name}={value:?} is not a non-negative integer")]
    Parse {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },
}

impl MembershipError for Error {
    fn kind(&self) -> MembershipErrorKind {
        match self {
            Self::NotLaunched(_) => MembershipErrorKind::Unavailable,
            Self::Parse { .. } => MembershipErrorKind::Invalid,
        }
    }
}
