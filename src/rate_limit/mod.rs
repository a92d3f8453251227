//! Outbound request rate limiting.
//!
//! SEC EDGAR's fair-access policy caps clients at 10 requests per second.
//! Every network attempt made by [`HttpAccessClient`](crate::HttpAccessClient),
//! retries included, takes a slot from the client's [`RateLimiter`] first.
//!
//! ## Example
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use edgar_http::rate_limit::SlidingWindow;
//!
//! // Low-level window bookkeeping, driven by explicit instants
//! let now = Instant::now();
//! let mut window = SlidingWindow::new(Duration::from_secs(1), 2);
//! assert!(window.try_acquire(now).is_ok());
//! assert!(window.try_acquire(now).is_ok());
//! assert!(window.try_acquire(now).is_err());
//! ```

mod limiter;
mod window;

pub use limiter::RateLimiter;
pub use window::SlidingWindow;

/// Hard upper bound on requests per second. Higher requested rates are clamped.
pub const FAIR_ACCESS_CEILING: f64 = 10.0;

/// Rate used when the configuration does not specify one.
pub const DEFAULT_MAX_REQUESTS_PER_SECOND: f64 = FAIR_ACCESS_CEILING;
