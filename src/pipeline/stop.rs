//! Cooperative stop signal shared by every route of a controller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One stop signal for all routes.
///
/// [`stop_all()`](StopSignal::stop_all) advances an epoch; every
/// [`StopToken`] taken before that call observes the change and its route
/// winds down at its next check. Tokens taken afterwards start clean, so
/// new routes can be started without re-arming anything.
#[derive(Debug, Default)]
pub struct StopSignal {
    epoch: AtomicU64,
}

impl StopSignal {
    /// Creates a signal with no stop requested, ready to hand out tokens.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stops every route holding a token from before this call.
    pub fn stop_all(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(epoch, "stop signal raised");
    }

    /// Takes a token bound to the current epoch.
    pub fn token(self: &Arc<Self>) -> StopToken {
        StopToken {
            signal: Arc::clone(self),
            epoch: self.epoch.load(Ordering::SeqCst),
        }
    }
}

/// A route's view of the [`StopSignal`].
#[derive(Debug, Clone)]
pub struct StopToken {
    signal: Arc<StopSignal>,
    epoch: u64,
}

impl StopToken {
    /// A token on a private signal; only stops if that signal is raised.
    pub fn detached() -> Self {
        StopSignal::shared().token()
    }

    /// Returns `true` once a stop was requested after this token was taken.
    pub fn is_stopped(&self) -> bool {
        self.signal.epoch.load(Ordering::SeqCst) != self.epoch
    }

    /// The signal this token observes.
    pub fn signal(&self) -> &Arc<StopSignal> {
        &self.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reaches_all_tokens() {
        let signal = StopSignal::shared();
        let a = signal.token();
        let b = signal.token();
        assert!(!a.is_stopped());
        assert!(!b.is_stopped());

        signal.stop_all();
        assert!(a.is_stopped());
        assert!(b.is_stopped());
    }

    #[test]
    fn test_tokens_after_stop_start_clean() {
        let signal = StopSignal::shared();
        let old = signal.token();
        signal.stop_all();

        let fresh = signal.token();
        assert!(old.is_stopped());
        assert!(!fresh.is_stopped());
    }

    #[test]
    fn test_shared_matches_default() {
        let shared = StopSignal::shared();
        let plain = Arc::new(StopSignal::default());
        assert!(!shared.token().is_stopped());
        assert!(!plain.token().is_stopped());
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[test]
    fn test_detached_token() {
        let token = StopToken::detached();
        assert!(!token.is_stopped());
        token.signal().stop_all();
        assert!(token.is_stopped());
    }
}
