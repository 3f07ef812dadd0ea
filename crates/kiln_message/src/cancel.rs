//! Cooperative cancellation primitives

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Owner of a cancellation flag.
///
/// A source holds the single shared flag; [`CancellationToken`]s derived from
/// it are cheap observers. Once cancelled, always cancelled.
#[derive(Debug, Default)]
pub struct CancellationSource {
    flag: Arc<AtomicBool>,
}

impl CancellationSource {
    /// Create a new, un-cancelled source
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Latch the flag. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check whether the flag has been latched
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Derive an observer token sharing this source's flag
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            flag: self.flag.clone(),
        }
    }
}

/// Observer of a [`CancellationSource`]'s flag.
///
/// All tokens derived from one source agree, whether derived before or after
/// the cancellation.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Check whether the owning source has cancelled
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_one_way() {
        let source = CancellationSource::new();
        assert!(!source.is_cancelled());

        source.cancel();
        assert!(source.is_cancelled());

        // A second cancel keeps the flag latched
        source.cancel();
        assert!(source.is_cancelled());
    }

    #[test]
    fn test_tokens_observe_source() {
        let source = CancellationSource::new();
        let before = source.token();

        source.cancel();
        let after = source.token();

        assert!(before.is_cancelled());
        assert!(after.is_cancelled());
    }

    #[test]
    fn test_independent_sources() {
        let a = CancellationSource::new();
        let b = CancellationSource::new();

        a.cancel();
        assert!(a.token().is_cancelled());
        assert!(!b.token().is_cancelled());
    }
}
