//! Per-call request options and cache-key normalization.

use std::fmt;
use std::time::Duration;

use reqwest::header::{ACCEPT_ENCODING, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::Serialize;
use url::Url;

use crate::error::{AccessError, Cause};

/// Options for a single [`get_with`](crate::HttpAccessClient::get_with) call.
///
/// ```rust
/// use std::time::Duration;
/// use edgar_http::RequestOptions;
///
/// let options = RequestOptions::new()
///     .param("action", "getcompany")
///     .param("type", "10-K")
///     .header("Accept", "application/atom+xml")
///     .ttl(Duration::from_secs(300));
/// ```
#[derive(Debug, Clone)]
pub struct RequestOptions {
    headers: Vec<(String, String)>,
    params: Vec<(String, String)>,
    ttl: Option<Duration>,
    use_cache: bool,
}

impl RequestOptions {
    /// Options with no extra headers or parameters, caching enabled.
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
            params: Vec::new(),
            ttl: None,
            use_cache: true,
        }
    }

    /// Add a header, overriding the client default of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add one query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Add every field of a serializable struct or map as query parameters.
    pub fn query<Q>(mut self, params: &Q) -> Result<Self, serde_urlencoded::ser::Error>
    where
        Q: Serialize + ?Sized,
    {
        let encoded = serde_urlencoded::to_string(params)?;
        self.params.extend(
            url::form_urlencoded::parse(encoded.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
        Ok(self)
    }

    /// Cache a successful response for `ttl` instead of the client default.
    ///
    /// `Duration::ZERO` fetches normally but stores nothing.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Read from and write to the cache for this call (default `true`).
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub(crate) fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub(crate) fn ttl_override(&self) -> Option<Duration> {
        self.ttl
    }

    pub(crate) fn uses_cache(&self) -> bool {
        self.use_cache
    }

    /// Convert the caller's headers, rejecting an empty `User-Agent` override.
    pub(crate) fn header_map(&self, url: &str) -> Result<HeaderMap, AccessError> {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                AccessError::from_cause(url, 0, Cause::InvalidHeader(name.clone()))
            })?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                AccessError::from_cause(url, 0, Cause::InvalidHeader(name.to_string()))
            })?;
            if name == USER_AGENT && value.as_bytes().iter().all(u8::is_ascii_whitespace) {
                return Err(AccessError::configuration("User-Agent header must not be empty"));
            }
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for [`download_with`](crate::HttpAccessClient::download_with).
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Return immediately when the destination file already exists
    pub skip_existing: bool,
}

impl DownloadOptions {
    /// Reuse an existing destination file instead of downloading again.
    pub fn skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }
}

/// Identity of a cached GET response.
///
/// Two requests share a key when they target the same normalized URL (query
/// parameters sorted, fragment dropped) and ask for the same `Accept-Encoding`.
/// Other headers do not affect the representation and are not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    url: String,
    accept_encoding: Option<String>,
}

impl CacheKey {
    pub(crate) fn new(url: &Url, headers: &HeaderMap) -> Self {
        Self {
            url: url.to_string(),
            accept_encoding: headers
                .get(ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_ascii_lowercase()),
        }
    }

    /// The normalized URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.accept_encoding {
            Some(encoding) => write!(f, "GET {} [accept-encoding: {}]", self.url, encoding),
            None => write!(f, "GET {}", self.url),
        }
    }
}

/// Parse `url`, merge `params` into its query and sort the result.
///
/// Only `http` and `https` URLs are accepted.
pub fn normalize_url(url: &str, params: &[(String, String)]) -> Result<Url, Cause> {
    let mut parsed = Url::parse(url)?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(Cause::UnsupportedScheme(other.to_string())),
    }
    parsed.set_fragment(None);

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.extend(params.iter().cloned());
    pairs.sort();

    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }
    Ok(parsed)
}
