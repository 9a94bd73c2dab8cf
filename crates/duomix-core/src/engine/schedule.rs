//! Recompute scheduling - tick-driven debounce with stale-pass tokens
//!
//! Control changes arrive far faster than the pattern backend should be
//! reprogrammed. The scheduler coalesces requests to at most one
//! recompute per tick interval and hands out a monotonic sequence token
//! per pass. A pass whose token is no longer current was superseded
//! while it ran; its result must be discarded, never applied.

use std::time::{Duration, Instant};

/// Default spacing between recompute passes (one display frame)
pub const DEFAULT_RECOMPUTE_INTERVAL: Duration = Duration::from_millis(16);

/// Debounced recompute scheduler
#[derive(Debug)]
pub struct RecomputeScheduler {
    interval: Duration,
    seq: u64,
    pending: bool,
    last_pass: Option<Instant>,
}

impl RecomputeScheduler {
    /// Create a scheduler with the given minimum pass spacing
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            seq: 0,
            pending: false,
            last_pass: None,
        }
    }

    /// Request a recompute; returns the sequence the pass will carry
    ///
    /// Repeated requests within one interval coalesce into a single
    /// pass carrying the newest sequence number.
    pub fn request(&mut self) -> u64 {
        self.seq += 1;
        self.pending = true;
        self.seq
    }

    /// Cancel any pending pass
    pub fn cancel(&mut self) {
        self.pending = false;
    }

    /// Whether a pass is waiting to run
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Poll from the tick: returns a token when a pass is due now
    pub fn poll(&mut self, now: Instant) -> Option<u64> {
        if !self.pending {
            return None;
        }
        if let Some(last) = self.last_pass {
            if now.duration_since(last) < self.interval {
                return None;
            }
        }
        self.pending = false;
        self.last_pass = Some(now);
        Some(self.seq)
    }

    /// Whether a previously issued token still represents the newest state
    pub fn is_current(&self, token: u64) -> bool {
        token == self.seq
    }
}

impl Default for RecomputeScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_RECOMPUTE_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_coalesce() {
        let mut sched = RecomputeScheduler::new(Duration::from_millis(16));
        let now = Instant::now();

        sched.request();
        sched.request();
        let token = sched.request();

        assert_eq!(sched.poll(now), Some(token));
        // Nothing further pending
        assert_eq!(sched.poll(now + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_interval_spacing() {
        let mut sched = RecomputeScheduler::new(Duration::from_millis(16));
        let now = Instant::now();

        sched.request();
        assert!(sched.poll(now).is_some());

        // A new request inside the interval waits for the next frame
        sched.request();
        assert_eq!(sched.poll(now + Duration::from_millis(5)), None);
        assert!(sched.poll(now + Duration::from_millis(16)).is_some());
    }

    #[test]
    fn test_stale_token_detected() {
        let mut sched = RecomputeScheduler::new(Duration::from_millis(16));
        let now = Instant::now();

        sched.request();
        let token = sched.poll(now).unwrap();
        assert!(sched.is_current(token));

        // A newer request supersedes the in-flight pass
        sched.request();
        assert!(!sched.is_current(token));
    }

    #[test]
    fn test_cancel() {
        let mut sched = RecomputeScheduler::new(Duration::from_millis(16));
        sched.request();
        sched.cancel();
        assert!(!sched.is_pending());
        assert_eq!(sched.poll(Instant::now()), None);
    }
}
