//! Process-wide request rate ceiling shared by every caller of a client.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::error::AccessError;
use crate::rate_limit::{FAIR_ACCESS_CEILING, SlidingWindow};

/// Global rate limiter with first-come, first-served grants.
///
/// Waiters queue on a fair [`tokio::sync::Mutex`] and keep holding it while
/// they sleep, so a later caller can never be granted a slot ahead of an
/// earlier one, and the check-then-record step is atomic.
///
/// # Example
///
/// ```rust
/// use edgar_http::rate_limit::RateLimiter;
///
/// # async fn run() -> Result<(), edgar_http::AccessError> {
/// let limiter = RateLimiter::new(5.0)?;
/// limiter.acquire().await;
/// assert_eq!(limiter.granted(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<LimiterState>,
    clock: Arc<dyn Clock>,
    granted: AtomicU64,
}

#[derive(Debug)]
struct LimiterState {
    max_requests_per_second: f64,
    window: SlidingWindow,
}

impl RateLimiter {
    /// Create a limiter driven by the system clock.
    pub fn new(max_requests_per_second: f64) -> Result<Self, AccessError> {
        Self::with_clock(max_requests_per_second, Arc::new(SystemClock))
    }

    /// Create a limiter driven by a custom clock.
    pub fn with_clock(
        max_requests_per_second: f64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AccessError> {
        let (rps, window) = effective_rate(max_requests_per_second)?;
        Ok(Self {
            state: Mutex::new(LimiterState {
                max_requests_per_second: rps,
                window,
            }),
            clock,
            granted: AtomicU64::new(0),
        })
    }

    /// Change the ceiling. Recorded grants are discarded.
    ///
    /// Non-positive values are rejected; values above
    /// [`FAIR_ACCESS_CEILING`] are clamped to it.
    pub async fn configure(&self, max_requests_per_second: f64) -> Result<(), AccessError> {
        let (rps, window) = effective_rate(max_requests_per_second)?;
        let mut state = self.state.lock().await;
        state.max_requests_per_second = rps;
        state.window = window;
        Ok(())
    }

    /// Wait until one more request fits under the ceiling, then reserve it.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        loop {
            let now = self.clock.now();
            match state.window.try_acquire(now) {
                Ok(()) => break,
                Err(wait_time) => {
                    tracing::debug!(
                        wait_ms = wait_time.as_millis() as u64,
                        "rate limit reached, waiting"
                    );
                    self.clock.sleep(wait_time).await;
                }
            }
        }
        self.granted.fetch_add(1, Ordering::Relaxed);
    }

    /// Reserve a slot only if one is free right now.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut state) = self.state.try_lock() else {
            return false;
        };
        let granted = state.window.try_acquire(self.clock.now()).is_ok();
        if granted {
            self.granted.fetch_add(1, Ordering::Relaxed);
        }
        granted
    }

    /// The effective (clamped) ceiling.
    pub async fn max_requests_per_second(&self) -> f64 {
        self.state.lock().await.max_requests_per_second
    }

    /// Total number of slots granted so far.
    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::Relaxed)
    }
}

/// Check a requested ceiling and build its window.
///
/// Values above [`FAIR_ACCESS_CEILING`] are clamped to it.
fn effective_rate(requested: f64) -> Result<(f64, SlidingWindow), AccessError> {
    if !requested.is_finite() || requested <= 0.0 {
        return Err(AccessError::configuration(format!(
            "max_requests_per_second must be positive, got {requested}"
        )));
    }
    let rps = if requested > FAIR_ACCESS_CEILING {
        tracing::warn!(
            requested,
            ceiling = FAIR_ACCESS_CEILING,
            "requested rate exceeds fair-access ceiling, clamping"
        );
        FAIR_ACCESS_CEILING
    } else {
        requested
    };
    let window = SlidingWindow::for_rate(rps).ok_or_else(|| {
        AccessError::configuration(format!(
            "max_requests_per_second {requested} is too small to schedule"
        ))
    })?;
    Ok((rps, window))
}
