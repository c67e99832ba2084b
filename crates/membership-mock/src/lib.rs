//! Fixed-answer membership provider for tests.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use foehn_membership::MembershipProvider;

/// Membership provider returning preconfigured answers.
///
/// Answers are not validated here, so tests can feed inconsistent values to
/// the code under test.
#[derive(Clone, Copy, Debug)]
pub struct MockMembership {
    answer: Option<(u32, u32)>,
}

impl MockMembership {
    /// Always answers `rank` and `world_size`.
    #[must_use]
    pub const fn new(rank: u32, world_size: u32) -> Self {
        Self {
            answer: Some((rank, world_size)),
        }
    }

    /// Fails every query as if the process had no launcher.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self { answer: None }
    }
}

impl MembershipProvider for MockMembership {
    type Error = Error;

    fn rank(&self) -> Result<u32, Self::Error> {
        self.answer.map(|(rank, _)| rank).ok_or(Error::Unavailable)
    }

    fn world_size(&self) -> Result<u32, Self::Error> {
        self.answer
            .map(|(_, world_size)| world_size)
            .ok_or(Error::Unavailable)
    }
}
