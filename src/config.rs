//! Client configuration.
//!
//! The client never reads the environment itself. Whatever owns configuration
//! (CLI flags, a TOML file, environment variables) builds a [`ClientConfig`]
//! and hands it over, either directly or through serde.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};

use crate::cache::DEFAULT_CACHE_TTL;
use crate::error::AccessError;
use crate::rate_limit::{DEFAULT_MAX_REQUESTS_PER_SECOND, FAIR_ACCESS_CEILING, SlidingWindow};

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default total attempts per call, the first included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("edgar-http/", env!("CARGO_PKG_VERSION"));

/// Settings shared by every request a client makes.
///
/// Deserializes from the external key names (`timeout_s`, `cache_ttl_s`,
/// `max_rps`) as well as the field names. Missing keys take their defaults.
///
/// ```rust
/// use std::time::Duration;
/// use edgar_http::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(
///     r#"{ "user_agent": "research-bot ops@example.com", "timeout_s": 10, "max_rps": 4 }"#,
/// )?;
/// assert_eq!(config.timeout, Duration::from_secs(10));
/// assert_eq!(config.max_requests_per_second, 4.0);
/// assert!(config.validate().is_ok());
/// # Ok::<(), serde_json::Error>(())
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Timeout applied to each attempt (and to each chunk read of a download)
    #[serde(alias = "timeout_s")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,

    /// Descriptive `User-Agent`; must not be empty
    pub user_agent: String,

    /// TTL for cached GET responses when a call does not override it
    #[serde(alias = "cache_ttl_s")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub cache_ttl: Duration,

    /// Request ceiling; clamped to the fair-access limit
    #[serde(alias = "max_rps")]
    pub max_requests_per_second: f64,

    /// Total attempts per call, the first included
    pub max_attempts: u32,

    /// Upper bound on in-memory cache entries
    pub cache_capacity: Option<usize>,

    /// Directory for the on-disk cache tier
    pub cache_dir: Option<PathBuf>,

    /// Turn response caching on or off entirely
    pub enable_cache: bool,
}

impl ClientConfig {
    /// Check the configuration without touching the network.
    pub fn validate(&self) -> Result<(), AccessError> {
        if self.user_agent.trim().is_empty() {
            return Err(AccessError::configuration("user_agent must not be empty"));
        }
        if !self.max_requests_per_second.is_finite() || self.max_requests_per_second <= 0.0 {
            return Err(AccessError::configuration(format!(
                "max_requests_per_second must be positive, got {}",
                self.max_requests_per_second
            )));
        }
        if SlidingWindow::for_rate(self.max_requests_per_second.min(FAIR_ACCESS_CEILING)).is_none() {
            return Err(AccessError::configuration(format!(
                "max_requests_per_second {} is too small to schedule",
                self.max_requests_per_second
            )));
        }
        if self.max_attempts == 0 {
            return Err(AccessError::configuration("max_attempts must be at least 1"));
        }
        if self.timeout.is_zero() {
            return Err(AccessError::configuration("timeout must be non-zero"));
        }
        if self.cache_capacity == Some(0) {
            return Err(AccessError::configuration(
                "cache_capacity must be at least 1 when set",
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            max_requests_per_second: DEFAULT_MAX_REQUESTS_PER_SECOND,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cache_capacity: None,
            cache_dir: None,
            enable_cache: true,
        }
    }
}
