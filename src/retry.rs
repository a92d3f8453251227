//! Retry decisions for failed attempts.
//!
//! [`RetryPolicy::next`] is a pure function of the attempt outcome and the
//! attempt number; it performs no I/O and never sleeps. [`RetryState`] wraps it
//! in an explicit state machine that the client drives:
//!
//! ```text
//! Attempting(n) --success------------------> Succeeded
//! Attempting(n) --transient, n < max-------> Waiting(n, delay) --resume--> Attempting(n + 1)
//! Attempting(n) --transient, n == max / permanent--> Exhausted
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use edgar_http::retry::{Action, Outcome, RetryPolicy};
//!
//! let policy = RetryPolicy::default().with_jitter(0.0);
//! let outcome = Outcome::Transient { retry_after: None };
//!
//! assert_eq!(policy.next(&outcome, 1), Action::RetryAfter(Duration::from_secs(1)));
//! assert_eq!(policy.next(&outcome, 2), Action::RetryAfter(Duration::from_secs(2)));
//! assert_eq!(policy.next(&outcome, 3), Action::GiveUp);
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Longest server-requested delay that will be honoured.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Classified result of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The attempt succeeded
    Success,
    /// The attempt failed in a way that may succeed later
    Transient {
        /// Server-requested minimum delay
        retry_after: Option<Duration>,
    },
    /// Retrying cannot help
    Permanent,
}

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop with the successful result
    Done,
    /// Wait, then try again
    RetryAfter(Duration),
    /// Stop and surface the last failure
    GiveUp,
}

/// Exponential backoff with jitter and a bounded number of attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
}

impl RetryPolicy {
    /// Create a policy allowing `max_attempts` total attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Set the delay before the second attempt.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Cap the exponential part of the delay.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the jitter fraction, clamped to `0.0..=1.0`.
    ///
    /// A delay `d` becomes `d * (1 + jitter * u)` with `u` uniform in `[0, 1)`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Total attempts allowed, the first included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the second attempt.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Decide what follows attempt number `attempt` (1-based).
    pub fn next(&self, outcome: &Outcome, attempt: u32) -> Action {
        self.next_with_sample(outcome, attempt, rand::thread_rng().r#gen::<f64>())
    }

    /// Deterministic form of [`RetryPolicy::next`]; `sample` is the jitter draw in `[0, 1)`.
    pub fn next_with_sample(&self, outcome: &Outcome, attempt: u32, sample: f64) -> Action {
        match outcome {
            Outcome::Success => Action::Done,
            Outcome::Permanent => Action::GiveUp,
            Outcome::Transient { .. } if attempt >= self.max_attempts => Action::GiveUp,
            Outcome::Transient { retry_after } => {
                let factor = 1.0 + self.jitter * sample.clamp(0.0, 1.0);
                let jittered =
                    Duration::try_from_secs_f64(self.backoff(attempt).as_secs_f64() * factor)
                        .unwrap_or(Duration::MAX);
                let delay = match retry_after {
                    Some(floor) => jittered.max((*floor).min(MAX_RETRY_AFTER)),
                    None => jittered,
                };
                Action::RetryAfter(delay)
            }
        }
    }

    /// Un-jittered delay after attempt `attempt`: `base * 2^(attempt - 1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

/// Progress of one logical call through its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// About to perform attempt `attempt`
    Attempting {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Backing off after a transient failure
    Waiting {
        /// The attempt that just failed
        attempt: u32,
        /// How long to wait before the next one
        delay: Duration,
    },
    /// The last attempt succeeded
    Succeeded,
    /// No further attempts will be made
    Exhausted,
}

impl RetryState {
    /// The state before the first attempt.
    pub fn start() -> Self {
        Self::Attempting { attempt: 1 }
    }

    /// Record the outcome of the current attempt.
    ///
    /// Only meaningful from `Attempting`; other states are returned unchanged.
    pub fn advance(self, policy: &RetryPolicy, outcome: &Outcome) -> Self {
        let Self::Attempting { attempt } = self else {
            return self;
        };
        match policy.next(outcome, attempt) {
            Action::Done => Self::Succeeded,
            Action::RetryAfter(delay) => Self::Waiting { attempt, delay },
            Action::GiveUp => Self::Exhausted,
        }
    }

    /// Leave `Waiting` for the next attempt once the delay has elapsed.
    pub fn resume(self) -> Self {
        match self {
            Self::Waiting { attempt, .. } => Self::Attempting {
                attempt: attempt + 1,
            },
            other => other,
        }
    }

    /// Check if no more attempts will be made.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted)
    }
}

/// Parse a `Retry-After` header.
///
/// Accepts delay-seconds or an HTTP-date. Dates in the past yield a zero delay.
/// Values are capped at [`MAX_RETRY_AFTER`].
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    parse_retry_after_at(headers, Utc::now())
}

/// [`parse_retry_after`] with HTTP-dates measured from `now`.
pub fn parse_retry_after_at(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let delay = match value.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => {
            let at = DateTime::parse_from_rfc2822(value).ok()?;
            (at.with_timezone(&Utc) - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
        }
    };
    Some(delay.min(MAX_RETRY_AFTER))
}
