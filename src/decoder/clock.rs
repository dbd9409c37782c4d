//! # Monotonic Clock Collaborator
//!
//! The only wall-time consumer in the crate is the Veteran stale-frame guard
//! (reset the assembler after 100 ms of silence). The clock is a trait so
//! tests can step time explicitly; decoders never sleep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;

static PROCESS_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic millisecond clock.
pub trait MonotonicClock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Default clock: milliseconds since the first use in this process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl MonotonicClock for SystemClock {
    fn now_millis(&self) -> u64 {
        PROCESS_EPOCH.elapsed().as_millis() as u64
    }
}

/// Manually stepped clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl MonotonicClock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock_steps() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_millis(), 0);
        clock.advance(101);
        assert_eq!(clock.now_millis(), 101);
        clock.set(5);
        assert_eq!(clock.now_millis(), 5);
    }
}
