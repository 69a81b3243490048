//! Circuit breaker for the Quote Client, encapsulated as a small state
//! object rather than two module-level variables (§9 redesign flag).

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;

/// `{open, opened_at}` behind `may_call()`/`record_failure()`.
pub struct CircuitBreaker {
    open: AtomicBool,
    opened_at_epoch_ms: AtomicI64,
    reset_after: Duration,
}

impl CircuitBreaker {
    pub fn new(reset_after: Duration) -> Self {
        Self {
            open: AtomicBool::new(false),
            opened_at_epoch_ms: AtomicI64::new(0),
            reset_after,
        }
    }

    /// Whether a call may proceed. Self-heals: once `reset_after` has
    /// elapsed since tripping, the breaker closes again.
    pub fn may_call(&self) -> bool {
        if !self.open.load(Ordering::Acquire) {
            return true;
        }
        let opened_at = self.opened_at_epoch_ms.load(Ordering::Acquire);
        let elapsed_ms = Utc::now().timestamp_millis() - opened_at;
        if elapsed_ms >= self.reset_after.as_millis() as i64 {
            self.open.store(false, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Milliseconds remaining until the breaker self-resets, 0 if closed.
    pub fn remaining_ms(&self) -> u64 {
        if !self.open.load(Ordering::Acquire) {
            return 0;
        }
        let opened_at = self.opened_at_epoch_ms.load(Ordering::Acquire);
        let elapsed_ms = Utc::now().timestamp_millis() - opened_at;
        (self.reset_after.as_millis() as i64 - elapsed_ms).max(0) as u64
    }

    /// Trip the breaker — called when a rate-limited request ultimately
    /// fails (§4.A step 6).
    pub fn trip(&self) {
        self.opened_at_epoch_ms.store(Utc::now().timestamp_millis(), Ordering::Release);
        self.open.store(true, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.may_call()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_breaker_allows_calls() {
        let cb = CircuitBreaker::new(Duration::from_secs(60));
        assert!(cb.may_call());
    }

    #[test]
    fn test_tripped_breaker_blocks_calls() {
        let cb = CircuitBreaker::new(Duration::from_secs(60));
        cb.trip();
        assert!(!cb.may_call());
        assert!(cb.remaining_ms() > 0);
    }

    #[test]
    fn test_breaker_self_resets_after_window() {
        let cb = CircuitBreaker::new(Duration::from_millis(0));
        cb.trip();
        assert!(cb.may_call());
    }
}
