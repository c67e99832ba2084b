//! Membership provider reading rank and world size from launcher variables.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use foehn_membership::MembershipProvider;
use tracing::debug;

/// Rank/world variable pairs, in lookup order.
///
/// The first pair with both variables set wins.
pub const LAUNCHER_VARIABLES: &[(&str, &str)] = &[
    ("FOEHN_RANK", "FOEHN_WORLD_SIZE"),
    ("PMIX_RANK", "PMIX_SIZE"),
    ("OMPI_COMM_WORLD_RANK", "OMPI_COMM_WORLD_SIZE"),
    ("PMI_RANK", "PMI_SIZE"),
    ("SLURM_PROCID", "SLURM_NTASKS"),
    ("RANK", "WORLD_SIZE"),
];

#[derive(Clone, Copy, Debug)]
struct Resolved {
    rank: u32,
    world_size: u32,
    source: &'static str,
}

/// Membership provider backed by environment variables set by the launcher.
///
/// Variables are read once, at construction, so answers stay stable even if
/// the environment changes later.
#[derive(Clone, Debug)]
pub struct EnvMembership {
    resolved: Result<Resolved, Error>,
}

impl EnvMembership {
    /// Reads the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads variables through `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            resolved: resolve(&lookup),
        }
    }

    /// The rank variable the answers came from, if any pair was found.
    #[must_use]
    pub fn source(&self) -> Option<&'static str> {
        self.resolved.as_ref().ok().map(|resolved| resolved.source)
    }
}

fn resolve<F>(lookup: &F) -> Result<Resolved, Error>
where
    F: Fn(&str) -> Option<String>,
{
    for &(rank_var, size_var) in LAUNCHER_VARIABLES {
        let (Some(rank), Some(world_size)) = (lookup(rank_var), lookup(size_var)) else {
            continue;
        };

        let resolved = Resolved {
            rank: parse(rank_var, rank)?,
            world_size: parse(size_var, world_size)?,
            source: rank_var,
        };
        debug!(
            rank = resolved.rank,
            world_size = resolved.world_size,
            source = rank_var,
            "read membership from environment"
        );

        return Ok(resolved);
    }

    let tried = LAUNCHER_VARIABLES
        .iter()
        .map(|(rank_var, _)| *rank_var)
        .collect::<Vec<_>>()
        .join(", ");
    Err(Error::NotLaunched(tried))
}

fn parse(name: &'static str, value: String) -> Result<u32, Error> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Parse { name, value })
}

impl MembershipProvider for EnvMembership {
    type Error = Error;

    fn rank(&self) -> Result<u32, Self::Error> {
        self.resolved.clone().map(|resolved| resolved.rank)
    }

    fn world_size(&self) -> Result<u32, Self::Error> {
        self.resolved.clone().map(|resolved| resolved.world_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use assert_matches::assert_matches;
    use foehn_membership::{Membership, MembershipError, MembershipErrorKind};

    fn membership(vars: &[(&str, &str)]) -> EnvMembership {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();

        EnvMembership::from_lookup(move |name| vars.get(name).cloned())
    }

    #[test]
    fn test_reads_own_variables() {
        let env = membership(&[("FOEHN_RANK", "1"), ("FOEHN_WORLD_SIZE", "2")]);

        assert_eq!(env.rank().unwrap(), 1);
        assert_eq!(env.world_size().unwrap(), 2);
        assert_eq!(env.source(), Some("FOEHN_RANK"));
    }

    #[test]
    fn test_launcher_priority() {
        let env = membership(&[
            ("RANK", "5"),
            ("WORLD_SIZE", "8"),
            ("OMPI_COMM_WORLD_RANK", "3"),
            ("OMPI_COMM_WORLD_SIZE", "4"),
        ]);

        assert_eq!(env.rank().unwrap(), 3);
        assert_eq!(env.world_size().unwrap(), 4);
        assert_eq!(env.source(), Some("OMPI_COMM_WORLD_RANK"));
    }

    #[test]
    fn test_incomplete_pair_skipped() {
        let env = membership(&[
            ("PMIX_RANK", "0"),
            ("SLURM_PROCID", "2"),
            ("SLURM_NTASKS", "3"),
        ]);

        assert_eq!(env.rank().unwrap(), 2);
        assert_eq!(env.source(), Some("SLURM_PROCID"));
    }

    #[test]
    fn test_not_launched() {
        let env = membership(&[]);

        let err = env.rank().unwrap_err();
        assert_eq!(err.kind(), MembershipErrorKind::Unavailable);
        assert_eq!(env.source(), None);
        assert_matches!(
            Membership::resolve(&env),
            Err(foehn_membership::Error::MembershipUnavailable(_))
        );
    }

    #[test]
    fn test_unparsable_value() {
        let env = membership(&[("PMI_RANK", "zero"), ("PMI_SIZE", "2")]);

        assert_matches!(env.rank(), Err(Error::Parse { name: "PMI_RANK", .. }));
        assert_matches!(
            Membership::resolve(&env),
            Err(foehn_membership::Error::InvalidMembership(_))
        );
    }

    #[test]
    fn test_negative_value_rejected() {
        let env = membership(&[("RANK", "-1"), ("WORLD_SIZE", "2")]);

        assert_eq!(env.world_size().unwrap_err().kind(), MembershipErrorKind::Invalid);
    }

    #[test]
    fn test_whitespace_tolerated() {
        let env = membership(&[("RANK", " 0\n"), ("WORLD_SIZE", "1")]);

        assert_eq!(Membership::resolve(&env).unwrap(), Membership::new(0, 1).unwrap());
    }
}
