use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;

use crate::Error;

static PROCESS_GUARD: Lazy<InitGuard> = Lazy::new(InitGuard::new);

/// Allows at most one live process group per guard.
///
/// Clones share the same flag. [`InitGuard::process`] is the guard every
/// `Bootstrap` uses unless given another one.
#[derive(Clone, Debug, Default)]
pub struct InitGuard {
    claimed: Arc<AtomicBool>,
}

impl InitGuard {
    /// Creates a private guard, independent of the process-wide one.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide guard.
    #[must_use]
    pub fn process() -> Self {
        PROCESS_GUARD.clone()
    }

    /// Whether a process group currently holds this guard.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    pub(crate) fn claim(&self) -> Result<(), Error> {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::AlreadyInitialized)
    }

    pub(crate) fn release(&self) {
        self.claimed.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[test]
    fn test_claim_is_exclusive() {
        let guard = InitGuard::new();
        let shared = guard.clone();

        guard.claim().unwrap();
        assert!(shared.is_claimed());
        assert_matches!(shared.claim(), Err(Error::AlreadyInitialized));

        shared.release();
        guard.claim().unwrap();
    }

    #[test]
    fn test_private_guards_are_independent() {
        let a = InitGuard::new();
        let b = InitGuard::new();

        a.claim().unwrap();
        b.claim().unwrap();
    }
}
