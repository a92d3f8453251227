//! Sliding window bookkeeping.
//!
//! The window is a pure data structure: callers pass the current instant in,
//! which keeps it independent of any particular clock.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A sliding window rate limiter.
///
/// Tracks grant timestamps and enforces that no trailing window of length
/// `window` contains more than `max_requests` grants.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    /// Grant timestamps, oldest first
    requests: VecDeque<Instant>,
    /// Window duration
    window: Duration,
    /// Maximum grants per window
    max_requests: u32,
}

impl SlidingWindow {
    /// Create a new sliding window.
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            requests: VecDeque::with_capacity(max_requests as usize),
            window,
            max_requests: max_requests.max(1),
        }
    }

    /// Derive a window from a requests-per-second rate.
    ///
    /// Rates of one or more get a 1 second window holding `floor(rps)` grants.
    /// Slower rates get a single grant per `1 / rps` seconds. Neither shape
    /// ever allows more than `rps` grants in a trailing second.
    ///
    /// Returns `None` when `1 / rps` is not a representable [`Duration`].
    pub fn for_rate(requests_per_second: f64) -> Option<Self> {
        if requests_per_second >= 1.0 {
            Some(Self::new(
                Duration::from_secs(1),
                requests_per_second.floor() as u32,
            ))
        } else {
            let window = Duration::try_from_secs_f64(1.0 / requests_per_second).ok()?;
            Some(Self::new(window, 1))
        }
    }

    /// Try to record a grant at `now`.
    ///
    /// Returns `Ok(())` if allowed, `Err(wait_time)` if the window is full.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.cleanup_old(now);

        if (self.requests.len() as u32) < self.max_requests {
            self.requests.push_back(now);
            Ok(())
        } else {
            // The oldest grant leaves the window first.
            let wait_time = self
                .requests
                .front()
                .map(|oldest| self.until_expiry(*oldest, now))
                .unwrap_or_default();
            Err(wait_time)
        }
    }

    /// Number of grants still available at `now`.
    pub fn remaining(&self, now: Instant) -> u32 {
        self.max_requests.saturating_sub(self.active(now) as u32)
    }

    /// Time until the next grant is possible, or `None` if one is available now.
    pub fn time_until_available(&self, now: Instant) -> Option<Duration> {
        if self.remaining(now) > 0 {
            return None;
        }
        self.requests
            .iter()
            .find(|ts| self.in_window(**ts, now))
            .map(|oldest| self.until_expiry(*oldest, now))
    }

    /// Window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Maximum grants per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Forget all recorded grants.
    pub fn clear(&mut self) {
        self.requests.clear();
    }

    fn active(&self, now: Instant) -> usize {
        self.requests
            .iter()
            .filter(|ts| self.in_window(**ts, now))
            .count()
    }

    /// Time until the grant at `ts` leaves the window.
    fn until_expiry(&self, ts: Instant, now: Instant) -> Duration {
        ts.checked_add(self.window)
            .map_or(Duration::MAX, |end| end.saturating_duration_since(now))
    }

    fn in_window(&self, ts: Instant, now: Instant) -> bool {
        now.saturating_duration_since(ts) < self.window
    }

    /// Remove grants that are outside the window.
    fn cleanup_old(&mut self, now: Instant) {
        while let Some(oldest) = self.requests.front() {
            if self.in_window(*oldest, now) {
                break;
            }
            self.requests.pop_front();
        }
    }
}
