//! Rank and world-size discovery for processes joining a group.
//!
//! A [`MembershipProvider`] answers two questions for the calling process:
//! its rank and the size of its group. Answers come from whatever launched
//! the process and never change during its lifetime. [`Membership::resolve`]
//! asks both questions once and checks the answers are consistent.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::{Error, MembershipError, MembershipErrorKind};

use std::ops::Range;

use tracing::debug;

/// Source of the calling process's rank and world size.
pub trait MembershipProvider: Send + Sync + 'static {
    /// Provider-specific error type.
    type Error: MembershipError;

    /// The rank of this process, in `0..world_size()`.
    fn rank(&self) -> Result<u32, Self::Error>;

    /// The number of processes in the group.
    fn world_size(&self) -> Result<u32, Self::Error>;
}

/// A validated `(rank, world_size)` pair.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Membership {
    rank: u32,
    world_size: u32,
}

impl Membership {
    /// Creates a membership, checking `0 <= rank < world_size`.
    pub fn new(rank: u32, world_size: u32) -> Result<Self, Error> {
        if world_size == 0 {
            return Err(Error::InvalidMembership(
                "world size must be positive".to_string(),
            ));
        }

        if rank >= world_size {
            return Err(Error::InvalidMembership(format!(
                "rank {rank} is outside world of size {world_size}"
            )));
        }

        Ok(Self { rank, world_size })
    }

    /// Queries `provider` and validates the answers.
    pub fn resolve<P: MembershipProvider>(provider: &P) -> Result<Self, Error> {
        let rank = provider.rank().map_err(|e| Error::from_provider(&e))?;
        let world_size = provider
            .world_size()
            .map_err(|e| Error::from_provider(&e))?;

        let membership = Self::new(rank, world_size)?;
        debug!(rank, world_size, "resolved membership");

        Ok(membership)
    }

    /// This process's rank.
    #[must_use]
    pub const fn rank(&self) -> u32 {
        self.rank
    }

    /// The group size.
    #[must_use]
    pub const fn world_size(&self) -> u32 {
        self.world_size
    }

    /// Whether this is rank 0.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.rank == 0
    }

    /// Every rank in the group.
    #[must_use]
    pub const fn ranks(&self) -> Range<u32> {
        0..self.world_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[test]
    fn test_valid_membership() {
        let membership = Membership::new(1, 2).unwrap();

        assert_eq!(membership.rank(), 1);
        assert_eq!(membership.world_size(), 2);
        assert!(!membership.is_root());
        assert_eq!(membership.ranks().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_single_process_group() {
        let membership = Membership::new(0, 1).unwrap();

        assert!(membership.is_root());
    }

    #[test]
    fn test_zero_world_rejected() {
        assert_matches!(Membership::new(0, 0), Err(Error::InvalidMembership(_)));
    }

    #[test]
    fn test_rank_out_of_range_rejected() {
        assert_matches!(Membership::new(2, 2), Err(Error::InvalidMembership(_)));
        assert_matches!(Membership::new(7, 4), Err(Error::InvalidMembership(_)));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::MembershipUnavailable(String::new()).kind(),
            MembershipErrorKind::Unavailable
        );
        assert_eq!(
            Error::InvalidMembership(String::new()).kind(),
            MembershipErrorKind::Invalid
        );
    }
}
