//! Error types for the EDGAR HTTP access layer.
//!
//! Every failure that reaches a caller is an [`AccessError`]. Transport-level
//! detail lives in [`Cause`], which also decides whether a failed attempt is
//! worth retrying.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::retry::Outcome;

/// The main error type for all client operations.
#[derive(Error, Debug)]
pub enum AccessError {
    /// Invalid client configuration, raised before any network access.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A failure that may succeed on retry. Only surfaced once retries are exhausted.
    #[error("Transient failure for {url} after {attempts} attempt(s): {cause}")]
    Transient {
        /// The URL that was being fetched
        url: String,
        /// Number of network attempts made
        attempts: u32,
        /// The last underlying failure
        #[source]
        cause: Cause,
    },

    /// A failure that retrying cannot fix.
    #[error("Permanent failure for {url}: {cause}")]
    Permanent {
        /// The URL that was being fetched
        url: String,
        /// Number of network attempts made (0 when rejected before sending)
        attempts: u32,
        /// The underlying failure
        #[source]
        cause: Cause,
    },
}

impl AccessError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Wrap a terminal cause, picking the variant from its classification.
    pub(crate) fn from_cause(url: impl Into<String>, attempts: u32, cause: Cause) -> Self {
        let url = url.into();
        if cause.is_transient() {
            Self::Transient {
                url,
                attempts,
                cause,
            }
        } else {
            Self::Permanent {
                url,
                attempts,
                cause,
            }
        }
    }

    /// The URL the failed operation targeted, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Configuration(_) => None,
            Self::Transient { url, .. } | Self::Permanent { url, .. } => Some(url),
        }
    }

    /// The underlying cause, if any.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            Self::Configuration(_) => None,
            Self::Transient { cause, .. } | Self::Permanent { cause, .. } => Some(cause),
        }
    }

    /// The number of network attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Configuration(_) => 0,
            Self::Transient { attempts, .. } | Self::Permanent { attempts, .. } => *attempts,
        }
    }

    /// The last HTTP status received, when the failure was a status error.
    pub fn status(&self) -> Option<StatusCode> {
        self.cause().and_then(Cause::status)
    }

    /// Check if this is a transient failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Check if this is a permanent failure.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }

    /// Check if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// The underlying reason a single attempt failed.
#[derive(Error, Debug)]
pub enum Cause {
    /// The server answered with a non-success status
    #[error("HTTP status {status}")]
    Status {
        /// Response status
        status: StatusCode,
        /// Parsed `Retry-After` header, if the server sent one
        retry_after: Option<Duration>,
    },

    /// The attempt exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP request with middleware failed
    #[error("HTTP request failed: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// Local filesystem error while writing a download
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Only `http` and `https` are fetched
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// A caller-supplied header name or value is not valid HTTP
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Query parameters could not be encoded
    #[error("Query encoding failed: {0}")]
    Query(#[from] serde_urlencoded::ser::Error),
}

impl Cause {
    /// Whether an attempt that failed this way is worth retrying.
    ///
    /// Timeouts, connection-level failures, HTTP 429 and HTTP 5xx are transient.
    /// Everything else (other 4xx, malformed requests, local I/O) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => is_transient_status(*status),
            Self::Timeout => true,
            Self::Http(err) => is_transient_reqwest(err),
            Self::HttpMiddleware(reqwest_middleware::Error::Reqwest(err)) => {
                is_transient_reqwest(err)
            }
            Self::HttpMiddleware(reqwest_middleware::Error::Middleware(_)) => false,
            Self::Io(_)
            | Self::Url(_)
            | Self::UnsupportedScheme(_)
            | Self::InvalidHeader(_)
            | Self::Query(_) => false,
        }
    }

    /// The HTTP status carried by a status failure.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status(),
            _ => None,
        }
    }

    /// The server-requested retry delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Check if this failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Http(err) => err.is_timeout(),
            Self::HttpMiddleware(reqwest_middleware::Error::Reqwest(err)) => err.is_timeout(),
            _ => false,
        }
    }

    /// Classify this failure for the retry policy.
    pub fn outcome(&self) -> Outcome {
        if self.is_transient() {
            Outcome::Transient {
                retry_after: self.retry_after(),
            }
        } else {
            Outcome::Permanent
        }
    }

    /// Normalize transport errors so reqwest timeouts read as [`Cause::Timeout`].
    pub(crate) fn from_middleware(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(inner) if inner.is_timeout() => Self::Timeout,
            other => Self::HttpMiddleware(other),
        }
    }

    /// Same as [`Cause::from_middleware`] for errors raised while reading a body.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

/// HTTP 429 and every 5xx status are worth retrying.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient_reqwest(err: &reqwest::Error) -> bool {
    if let Some(status) = err.status() {
        return is_transient_status(status);
    }
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() || err.is_decode()
}

/// Internal cache failures.
///
/// These never reach callers of the client: a failing cache is logged and
/// bypassed so the request still goes to the network.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A thread panicked while holding the cache lock
    #[error("cache lock poisoned")]
    Poisoned,

    /// Filesystem failure in the disk cache
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A disk cache entry could not be decoded
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}
