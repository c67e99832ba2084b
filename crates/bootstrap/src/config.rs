use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use foehn_store::DEFAULT_TIMEOUT;
use foehn_store_tcp::DEFAULT_PORT;

use crate::Error;

/// Environment variable overriding [`BootstrapConfig::timeout`], in seconds.
pub const TIMEOUT_SECONDS_VAR: &str = "FOEHN_TIMEOUT_SECONDS";

/// Environment variable overriding [`BootstrapConfig::master_addr`].
pub const MASTER_ADDR_VAR: &str = "FOEHN_MASTER_ADDR";

/// Settings shared by every rank of a group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootstrapConfig {
    /// Default bound for every blocking store call and the teardown rendezvous.
    pub timeout: Duration,

    /// Where rank 0 hosts the TCP store.
    pub master_addr: SocketAddr,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            master_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
        }
    }
}

impl BootstrapConfig {
    /// Defaults overridden by `FOEHN_TIMEOUT_SECONDS` and `FOEHN_MASTER_ADDR`.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`BootstrapConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(TIMEOUT_SECONDS_VAR) {
            let seconds: u64 = value.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{TIMEOUT_SECONDS_VAR}={value:?} is not a whole number of seconds"
                ))
            })?;
            config.timeout = Duration::from_secs(seconds);
        }

        if let Some(value) = lookup(MASTER_ADDR_VAR) {
            config.master_addr = value.trim().parse().map_err(|_| {
                Error::Config(format!("{MASTER_ADDR_VAR}={value:?} is not a socket address"))
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[test]
    fn test_defaults() {
        let config = BootstrapConfig::default();

        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.master_addr, "127.0.0.1:29500".parse().unwrap());
    }

    #[test]
    fn test_env_overrides() {
        let config = BootstrapConfig::from_lookup(|name| match name {
            TIMEOUT_SECONDS_VAR => Some("5".to_string()),
            MASTER_ADDR_VAR => Some("10.1.2.3:4000".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.master_addr, "10.1.2.3:4000".parse().unwrap());
    }

    #[test]
    fn test_bad_timeout_rejected() {
        let result = BootstrapConfig::from_lookup(|name| {
            (name == TIMEOUT_SECONDS_VAR).then(|| "soon".to_string())
        });

        assert_matches!(result, Err(Error::Config(_)));
    }
}
