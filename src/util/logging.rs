//! # Rate-Limited Discard Logging
//!
//! A wireless wheel link under interference can deliver hundreds of corrupt
//! runs per second, and every one of them is a discard worth seeing once but
//! not a thousand times. The frame assemblers and the Ninebot decoders gate
//! their discard lines through a [`LogThrottle`] and dump the offending
//! bytes with [`log_frame_hex`], so the silent-discard contract stays
//! observable without flooding the host's log.

use std::time::{Duration, Instant};

/// Rate limiter for per-discard log lines.
///
/// Counts attempts inside a rolling window and answers whether the caller
/// may still log; once the window's cap is spent, further attempts are
/// suppressed until a new window opens.
#[derive(Debug)]
pub struct LogThrottle {
    /// Window length
    window: Duration,
    /// Lines allowed per window
    cap: u32,
    /// Attempts seen in the open window
    seen: u32,
    /// When the open window started
    opened: Instant,
}

impl LogThrottle {
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window: Duration::from_millis(window_ms),
            cap,
            seen: 0,
            opened: Instant::now(),
        }
    }

    /// The shape every discard path here wants: `cap` lines per second.
    pub fn per_second(cap: u32) -> Self {
        Self::new(1000, cap)
    }

    /// Whether the caller may log now. The attempt is counted either way.
    pub fn allow(&mut self) -> bool {
        if self.opened.elapsed() > self.window {
            self.opened = Instant::now();
            self.seen = 0;
        }
        self.seen += 1;
        self.seen <= self.cap
    }

    /// Open a fresh window immediately.
    pub fn reset(&mut self) {
        self.opened = Instant::now();
        self.seen = 0;
    }
}

/// Log a discarded or suspicious byte run in hex.
///
/// Output is truncated so a jumbo run cannot blow up a log line; the total
/// length is appended when truncation happens.
pub fn log_frame_hex(prefix: &str, data: &[u8]) {
    const MAX_LOG_BYTES: usize = 64;

    let shown = &data[..data.len().min(MAX_LOG_BYTES)];
    let hex = crate::util::hex::format_hex_compact(shown);
    if data.len() > MAX_LOG_BYTES {
        log::debug!("{prefix}: {hex} ... ({} bytes total)", data.len());
    } else {
        log::debug!("{prefix}: {hex}");
    }
}
