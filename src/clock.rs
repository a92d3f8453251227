//! Time source used by the rate limiter, the cache and retry backoff.
//!
//! Production code uses [`SystemClock`]. Tests use [`ManualClock`], whose
//! `sleep` advances simulated time instantly so rate and expiry behaviour can
//! be checked without waiting in real time.

use std::fmt::Debug;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

/// A current-time provider with a matching sleep.
pub trait Clock: Debug + Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;

    /// Suspend the caller for `duration` as measured by this clock.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Wall-clock time backed by tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        // Follows tokio's clock so paused-time tests stay consistent with `sleep`.
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

/// A simulated clock that only moves when told to.
///
/// `sleep` advances the clock by the requested duration and returns
/// immediately. Every sleep is recorded so tests can inspect backoff delays.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    offset: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    /// Create a clock starting at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.lock();
        state.offset += duration;
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.lock().offset
    }

    /// All durations passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // Plain data; a panic elsewhere cannot leave it inconsistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().offset
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        {
            let mut state = self.lock();
            state.offset += duration;
            state.sleeps.push(duration);
        }
        futures_util::future::ready(()).boxed()
    }
}
