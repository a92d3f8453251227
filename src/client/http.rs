//! The shared HTTP access client.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use url::Url;

use crate::cache::{DiskCache, SharedCache, TtlCache};
use crate::client::flight::KeyLocks;
use crate::client::request::{CacheKey, RequestOptions, normalize_url};
use crate::client::response::{CachedResponse, HttpResponse};
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::{AccessError, Cause};
use crate::rate_limit::RateLimiter;
use crate::retry::{Outcome, RetryPolicy, RetryState, parse_retry_after};

/// `Accept` header sent unless the caller overrides it.
const DEFAULT_ACCEPT: &str = "application/json, text/html, */*";

/// Rate-limited, caching HTTP client shared by every EDGAR tool.
///
/// Every network attempt takes a slot from the client's [`RateLimiter`];
/// successful GET responses are cached; transient failures are retried per
/// the client's [`RetryPolicy`]. Cloning is cheap and clones share the
/// limiter, the cache and the connection pool.
///
/// # Example
///
/// ```rust,no_run
/// use edgar_http::HttpAccessClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = HttpAccessClient::builder()
///         .user_agent("flow-research ops@example.com")
///         .build()?;
///
///     let tickers = client
///         .get("https://www.sec.gov/files/company_tickers.json")
///         .await?;
///     let value: serde_json::Value = tickers.json()?;
///     println!("{} companies", value.as_object().map_or(0, |m| m.len()));
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct HttpAccessClient {
    pub(crate) http_client: ClientWithMiddleware,
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) clock: Arc<dyn Clock>,
    cache: Option<SharedCache<CacheKey, CachedResponse>>,
    disk_cache: Option<DiskCache>,
    flights: Arc<KeyLocks<CacheKey>>,
}

impl HttpAccessClient {
    /// Create a client from a configuration.
    pub fn new(config: ClientConfig) -> Result<Self, AccessError> {
        Self::builder().config(config).build()
    }

    /// Create a new client builder.
    pub fn builder() -> HttpAccessClientBuilder {
        HttpAccessClientBuilder::new()
    }

    /// GET `url` with default options.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, AccessError> {
        self.get_with(url, &RequestOptions::default()).await
    }

    /// GET `url` with extra headers, query parameters or cache settings.
    ///
    /// A live cache entry is returned without touching the rate limiter or the
    /// network. Otherwise the request is sent (and retried) and a 2xx response
    /// is cached. Failures are never cached.
    pub async fn get_with(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, AccessError> {
        let headers = options.header_map(url)?;
        let target =
            normalize_url(url, options.params()).map_err(|e| AccessError::from_cause(url, 0, e))?;

        let caching = self.cache.is_some() && options.uses_cache();
        if !caching {
            return self.fetch(&target, &headers).await;
        }

        let key = CacheKey::new(&target, &headers);
        if let Some(hit) = self.cache_lookup(&key).await {
            return Ok(hit);
        }

        // Concurrent callers for the same key wait here and then find the
        // leader's response in the cache.
        let _flight = self.flights.lock(&key).await;
        if let Some(hit) = self.cache_lookup(&key).await {
            return Ok(hit);
        }

        let response = self.fetch(&target, &headers).await?;
        let ttl = options.ttl_override().unwrap_or(self.config.cache_ttl);
        self.cache_store(&key, &response, ttl).await;
        Ok(response)
    }

    /// Drop any cached response for `url` and `options`.
    pub async fn invalidate(&self, url: &str, options: &RequestOptions) -> Result<(), AccessError> {
        let headers = options.header_map(url)?;
        let target =
            normalize_url(url, options.params()).map_err(|e| AccessError::from_cause(url, 0, e))?;
        let key = CacheKey::new(&target, &headers);

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.remove(&key) {
                tracing::warn!(key = %key, error = %err, "failed to invalidate memory cache entry");
            }
        }
        if let Some(disk) = &self.disk_cache {
            if let Err(err) = disk.remove(&key.to_string()).await {
                tracing::warn!(key = %key, error = %err, "failed to invalidate disk cache entry");
            }
        }
        Ok(())
    }

    /// Drop every in-memory cache entry.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.clear() {
                tracing::warn!(error = %err, "failed to clear memory cache");
            }
        }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The rate limiter shared by every request of this client.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The retry policy applied to every request.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Send a GET with retries and buffer the body.
    async fn fetch(&self, target: &Url, headers: &HeaderMap) -> Result<HttpResponse, AccessError> {
        self.execute(target.as_str(), move |_| async move {
            let response = self
                .http_client
                .get(target.clone())
                .headers(headers.clone())
                .timeout(self.config.timeout)
                .send()
                .await
                .map_err(Cause::from_middleware)?;
            let response = check_status(response)?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(Cause::from_reqwest)?;
            Ok::<_, Cause>(HttpResponse::new(status, headers, body))
        })
        .await
    }

    /// Drive one logical call through the retry state machine.
    ///
    /// Every attempt, retries included, takes a rate limiter slot first.
    pub(crate) async fn execute<T, F, Fut>(&self, url: &str, mut attempt: F) -> Result<T, AccessError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Cause>>,
    {
        let mut state = RetryState::start();
        while let RetryState::Attempting { attempt: number } = state {
            self.limiter.acquire().await;
            let result = attempt(number).await;
            let outcome = match &result {
                Ok(_) => Outcome::Success,
                Err(cause) => cause.outcome(),
            };
            state = state.advance(&self.retry_policy, &outcome);

            let cause = match result {
                Ok(value) => return Ok(value),
                Err(cause) => cause,
            };
            match state {
                RetryState::Waiting { delay, .. } => {
                    tracing::debug!(
                        url,
                        attempt = number,
                        delay_ms = delay.as_millis() as u64,
                        error = %cause,
                        "transient failure, retrying"
                    );
                    self.clock.sleep(delay).await;
                    state = state.resume();
                }
                _ => {
                    tracing::warn!(url, attempts = number, error = %cause, "request failed");
                    return Err(AccessError::from_cause(url, number, cause));
                }
            }
        }
        Err(AccessError::configuration("retry policy permits no attempts"))
    }

    async fn cache_lookup(&self, key: &CacheKey) -> Option<HttpResponse> {
        if let Some(cache) = &self.cache {
            match cache.get(key) {
                Ok(Some(hit)) => {
                    tracing::debug!(key = %key, "memory cache hit");
                    return Some(hit.into_response());
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(key = %key, error = %err, "memory cache unavailable, bypassing"),
            }
        }

        if let Some(disk) = &self.disk_cache {
            match disk.get_with_ttl::<CachedResponse>(&key.to_string()).await {
                Ok(Some((hit, remaining))) => {
                    tracing::debug!(key = %key, "disk cache hit");
                    if let Some(cache) = &self.cache {
                        if let Err(err) = cache.insert_with_ttl(key.clone(), hit.clone(), remaining) {
                            tracing::warn!(key = %key, error = %err, "failed to promote disk hit to memory cache");
                        }
                    }
                    return Some(hit.into_response());
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(key = %key, error = %err, "disk cache unreadable, bypassing"),
            }
        }

        tracing::debug!(key = %key, "cache miss");
        None
    }

    async fn cache_store(&self, key: &CacheKey, response: &HttpResponse, ttl: Duration) {
        let cached = CachedResponse::from_response(response);

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.insert_with_ttl(key.clone(), cached.clone(), ttl) {
                tracing::warn!(key = %key, error = %err, "failed to store response in memory cache");
            }
        }
        if let Some(disk) = &self.disk_cache {
            if let Err(err) = disk.set(&key.to_string(), &cached, ttl).await {
                tracing::warn!(key = %key, error = %err, "failed to store response in disk cache");
            }
        }
    }
}

impl std::fmt::Debug for HttpAccessClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAccessClient")
            .field("config", &self.config)
            .field("retry_policy", &self.retry_policy)
            .field("has_cache", &self.cache.is_some())
            .field("has_disk_cache", &self.disk_cache.is_some())
            .finish()
    }
}

/// Turn a non-2xx response into a status failure.
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response, Cause> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Cause::Status {
            status,
            retry_after: parse_retry_after(response.headers()),
        })
    }
}

/// Builder for [`HttpAccessClient`].
pub struct HttpAccessClientBuilder {
    config: ClientConfig,
    retry_policy: Option<RetryPolicy>,
    clock: Option<Arc<dyn Clock>>,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl HttpAccessClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            retry_policy: None,
            clock: None,
            rate_limiter: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the `User-Agent` sent with every request.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the default cache TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    /// Set the request ceiling (clamped to the fair-access limit).
    pub fn max_requests_per_second(mut self, rps: f64) -> Self {
        self.config.max_requests_per_second = rps;
        self
    }

    /// Set the total number of attempts per call.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Bound the number of in-memory cache entries.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = Some(capacity);
        self
    }

    /// Persist cached responses under `dir` as well as in memory.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    /// Turn response caching on or off.
    pub fn enable_cache(mut self, enabled: bool) -> Self {
        self.config.enable_cache = enabled;
        self
    }

    /// Use a custom retry policy. Its attempt bound replaces `max_attempts`.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Use a custom time source for the limiter, cache expiry and backoff sleeps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share an existing rate limiter, so several clients obey one ceiling.
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Validate the configuration and build the client.
    ///
    /// Fails with [`AccessError::Configuration`] before any network access if
    /// the user agent is empty, the rate is not positive, or another setting is
    /// out of range.
    pub fn build(self) -> Result<HttpAccessClient, AccessError> {
        let mut config = self.config;
        if let Some(policy) = &self.retry_policy {
            config.max_attempts = policy.max_attempts();
        }
        config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let retry_policy = self
            .retry_policy
            .unwrap_or_else(|| RetryPolicy::new(config.max_attempts));
        let limiter = match self.rate_limiter {
            Some(limiter) => limiter,
            None => Arc::new(RateLimiter::with_clock(
                config.max_requests_per_second,
                clock.clone(),
            )?),
        };

        // Build default headers.
        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(config.user_agent.trim()).map_err(|_| {
            AccessError::configuration("user_agent is not a valid header value")
        })?;
        headers.insert(USER_AGENT, user_agent);
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));

        let reqwest_client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.timeout)
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| AccessError::configuration(format!("failed to build HTTP client: {e}")))?;

        let http_client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .build();

        let cache = config.enable_cache.then(|| {
            let mut cache = TtlCache::with_clock(config.cache_ttl, clock.clone());
            if let Some(capacity) = config.cache_capacity {
                cache = cache.max_entries(capacity);
            }
            SharedCache::new(cache)
        });

        let disk_cache = match (&config.cache_dir, config.enable_cache) {
            (Some(dir), true) => match DiskCache::open(dir) {
                Ok(disk) => Some(disk),
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), error = %err, "disk cache disabled");
                    None
                }
            },
            _ => None,
        };

        Ok(HttpAccessClient {
            http_client,
            config: Arc::new(config),
            limiter,
            retry_policy,
            clock,
            cache,
            disk_cache,
            flights: Arc::new(KeyLocks::new()),
        })
    }
}

impl Default for HttpAccessClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
