use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use edgar_http::clock::ManualClock;
use edgar_http::rate_limit::RateLimiter;
use edgar_http::retry::{MAX_RETRY_AFTER, RetryPolicy};
use edgar_http::{AccessError, ClientConfig, HttpAccessClient, RequestOptions};

const TEST_USER_AGENT: &str = "edgar-http-tests test@example.com";

/// `{"cik":"0000320193","name":"Apple Inc."}`, gzip-compressed.
const GZIPPED_BODY: [u8; 57] = [
    0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0xff, 0xab, 0x56, 0x4a, 0xce, 0xcc, 0x56,
    0xb2, 0x52, 0x32, 0x00, 0x02, 0x63, 0x23, 0x03, 0x43, 0x4b, 0x63, 0x25, 0x1d, 0xa5, 0xbc, 0xc4,
    0xdc, 0x54, 0xa0, 0x98, 0x63, 0x41, 0x41, 0x4e, 0xaa, 0x82, 0x67, 0x5e, 0xb2, 0x9e, 0x52, 0x2d,
    0x00, 0x19, 0xe0, 0x84, 0xde, 0x28, 0x00, 0x00, 0x00,
];

fn build_client(clock: &Arc<ManualClock>) -> HttpAccessClient {
    HttpAccessClient::builder()
        .user_agent(TEST_USER_AGENT)
        .clock(clock.clone())
        .retry_policy(RetryPolicy::new(3).with_jitter(0.0))
        .build()
        .unwrap()
}

fn submissions_body() -> serde_json::Value {
    serde_json::json!({
        "cik": "0000320193",
        "name": "Apple Inc.",
        "tickers": ["AAPL"]
    })
}

#[tokio::test]
async fn test_get_sends_default_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/submissions/CIK0000320193.json"))
        .and(header("user-agent", TEST_USER_AGENT))
        .and(header("accept", "application/json, text/html, */*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(submissions_body()))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);
    let response = client
        .get(&format!("{}/submissions/CIK0000320193.json", server.uri()))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(!response.is_cached());
    let value: serde_json::Value = response.json().unwrap();
    assert_eq!(value["name"], "Apple Inc.");
}

#[tokio::test]
async fn test_cache_hit_skips_network_and_limiter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/company_tickers.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(submissions_body()))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);
    let url = format!("{}/files/company_tickers.json", server.uri());

    let first = client.get(&url).await.unwrap();
    let second = client.get(&url).await.unwrap();

    assert!(!first.is_cached());
    assert!(second.is_cached());
    assert_eq!(first.body(), second.body());
    assert_eq!(client.rate_limiter().granted(), 1);
}

#[tokio::test]
async fn test_cache_entry_expires_after_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/xbrl/frames.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(2)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = HttpAccessClient::builder()
        .user_agent(TEST_USER_AGENT)
        .clock(clock.clone())
        .cache_ttl(Duration::from_secs(60))
        .build()
        .unwrap();
    let url = format!("{}/api/xbrl/frames.json", server.uri());

    client.get(&url).await.unwrap();
    clock.advance(Duration::from_secs(59));
    assert!(client.get(&url).await.unwrap().is_cached());

    clock.advance(Duration::from_secs(2));
    assert!(!client.get(&url).await.unwrap().is_cached());
}

#[tokio::test]
async fn test_param_order_shares_cache_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/browse-edgar"))
        .and(query_param("action", "getcompany"))
        .and(query_param("type", "10-K"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<feed/>"))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);
    let url = format!("{}/cgi-bin/browse-edgar", server.uri());

    let first = RequestOptions::new()
        .param("action", "getcompany")
        .param("type", "10-K");
    let second = RequestOptions::new()
        .param("type", "10-K")
        .param("action", "getcompany");

    client.get_with(&url, &first).await.unwrap();
    let cached = client.get_with(&url, &second).await.unwrap();
    assert!(cached.is_cached());
    assert_eq!(cached.text(), "<feed/>");
}

#[tokio::test]
async fn test_zero_ttl_and_cache_opt_out_always_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(4)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);
    let url = format!("{}/live.json", server.uri());

    let no_store = RequestOptions::new().ttl(Duration::ZERO);
    client.get_with(&url, &no_store).await.unwrap();
    assert!(!client.get_with(&url, &no_store).await.unwrap().is_cached());

    let bypass = RequestOptions::new().use_cache(false);
    client.get_with(&url, &bypass).await.unwrap();
    assert!(!client.get_with(&url, &bypass).await.unwrap().is_cached());
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(2)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);
    let url = format!("{}/index.json", server.uri());

    client.get(&url).await.unwrap();
    client
        .invalidate(&url, &RequestOptions::default())
        .await
        .unwrap();
    assert!(!client.get(&url).await.unwrap().is_cached());
}

#[tokio::test]
async fn test_retries_transient_status_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky.json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(submissions_body()))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);
    let response = client
        .get(&format!("{}/flaky.json", server.uri()))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(client.rate_limiter().granted(), 3);
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn test_exhausted_retries_surface_transient_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down.json"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);
    let url = format!("{}/down.json", server.uri());
    let err = client.get(&url).await.unwrap_err();

    assert!(err.is_transient(), "unexpected error: {err}");
    assert_eq!(err.attempts(), 3);
    assert_eq!(err.status(), Some(reqwest::StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(err.url(), Some(url.as_str()));

    let sleeps = clock.sleeps();
    assert_eq!(sleeps.len(), 2);
    assert!(sleeps[1] > sleeps[0]);
}

#[tokio::test]
async fn test_permanent_status_is_not_retried_or_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.json"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);
    let url = format!("{}/missing.json", server.uri());

    let err = client.get(&url).await.unwrap_err();
    assert!(err.is_permanent());
    assert_eq!(err.attempts(), 1);
    assert_eq!(err.status(), Some(reqwest::StatusCode::NOT_FOUND));
    assert!(clock.sleeps().is_empty());

    // The failure was not cached: the second call reaches the server again.
    assert!(client.get(&url).await.unwrap_err().is_permanent());
}

#[tokio::test]
async fn test_retry_after_sets_minimum_delay() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/throttled.json"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/throttled.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);
    client
        .get(&format!("{}/throttled.json", server.uri()))
        .await
        .unwrap();

    assert_eq!(clock.sleeps(), vec![Duration::from_secs(7)]);
}

#[tokio::test]
async fn test_http_date_retry_after_is_capped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/throttled.json"))
        .respond_with(
            ResponseTemplate::new(429).insert_header("Retry-After", "Wed, 21 Oct 2099 07:28:00 GMT"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/throttled.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);
    client
        .get(&format!("{}/throttled.json", server.uri()))
        .await
        .unwrap();

    assert_eq!(clock.sleeps(), vec![MAX_RETRY_AFTER]);
}

#[tokio::test]
async fn test_unbounded_ttl_keeps_cache_usable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/company_tickers.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(submissions_body()))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/submissions/CIK0000320193.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(submissions_body()))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);
    let forever = format!("{}/submissions/CIK0000320193.json", server.uri());
    let other = format!("{}/files/company_tickers.json", server.uri());

    client
        .get_with(&forever, &RequestOptions::new().ttl(Duration::MAX))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(10 * 365 * 24 * 3600));
    assert!(client.get(&forever).await.unwrap().is_cached());

    // Other keys still go through the cache normally.
    client.get(&other).await.unwrap();
    assert!(client.get(&other).await.unwrap().is_cached());
    clock.advance(Duration::from_secs(3600));
    assert!(!client.get(&other).await.unwrap().is_cached());
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{}")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = HttpAccessClient::builder()
        .user_agent(TEST_USER_AGENT)
        .clock(clock.clone())
        .timeout(Duration::from_millis(50))
        .retry_policy(RetryPolicy::new(2).with_jitter(0.0))
        .build()
        .unwrap();

    let err = client
        .get(&format!("{}/slow.json", server.uri()))
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(err.attempts(), 2);
    assert!(err.cause().is_some_and(|cause| cause.is_timeout()));
}

#[tokio::test]
async fn test_invalid_configuration_sends_nothing() {
    let server = MockServer::start().await;

    let err = HttpAccessClient::new(ClientConfig {
        user_agent: String::new(),
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, AccessError::Configuration(_)));

    let err = HttpAccessClient::builder()
        .user_agent(TEST_USER_AGENT)
        .max_requests_per_second(-1.0)
        .build()
        .unwrap_err();
    assert!(err.is_configuration());

    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);
    let options = RequestOptions::new().header("User-Agent", "");
    let err = client
        .get_with(&format!("{}/x.json", server.uri()), &options)
        .await
        .unwrap_err();
    assert!(err.is_configuration());

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unsupported_scheme_is_permanent() {
    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);

    let err = client.get("ftp://ftp.sec.gov/edgar/").await.unwrap_err();
    assert!(err.is_permanent());
    assert_eq!(err.attempts(), 0);
    assert_eq!(client.rate_limiter().granted(), 0);
}

#[tokio::test]
async fn test_gzip_body_is_decompressed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/compressed.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Encoding", "gzip")
                .set_body_raw(GZIPPED_BODY.to_vec(), "application/json"),
        )
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);
    let response = client
        .get(&format!("{}/compressed.json", server.uri()))
        .await
        .unwrap();

    assert_eq!(response.text(), r#"{"cik":"0000320193","name":"Apple Inc."}"#);
}

#[tokio::test]
async fn test_concurrent_misses_share_one_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/popular.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(submissions_body())
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let client = build_client(&clock);
    let url = format!("{}/popular.json", server.uri());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        let url = url.clone();
        handles.push(tokio::spawn(async move { client.get(&url).await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status(), 200);
    }
    assert_eq!(client.rate_limiter().granted(), 1);
}

#[tokio::test]
async fn test_disk_cache_survives_new_client() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/submissions/CIK0000789019.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(submissions_body()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/submissions/CIK0000789019.json", server.uri());

    let first = HttpAccessClient::builder()
        .user_agent(TEST_USER_AGENT)
        .cache_dir(dir.path())
        .build()
        .unwrap();
    first.get(&url).await.unwrap();

    let second = HttpAccessClient::builder()
        .user_agent(TEST_USER_AGENT)
        .cache_dir(dir.path())
        .build()
        .unwrap();
    let response = second.get(&url).await.unwrap();
    assert!(response.is_cached());
    let value: serde_json::Value = response.json().unwrap();
    assert_eq!(value["tickers"][0], "AAPL");
}

fn cache_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect()
}

#[tokio::test]
async fn test_corrupt_disk_entry_falls_back_to_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/submissions/CIK0000789019.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(submissions_body()))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/submissions/CIK0000789019.json", server.uri());

    let first = HttpAccessClient::builder()
        .user_agent(TEST_USER_AGENT)
        .cache_dir(dir.path())
        .build()
        .unwrap();
    first.get(&url).await.unwrap();

    let files = cache_files(dir.path());
    assert_eq!(files.len(), 1);
    for file in &files {
        std::fs::write(file, b"\x00{truncated").unwrap();
    }

    let second = HttpAccessClient::builder()
        .user_agent(TEST_USER_AGENT)
        .cache_dir(dir.path())
        .build()
        .unwrap();
    let response = second.get(&url).await.unwrap();
    assert!(!response.is_cached());
    let value: serde_json::Value = response.json().unwrap();
    assert_eq!(value["cik"], "0000320193");

    // The refetched response replaced the unreadable entry.
    let files = cache_files(dir.path());
    assert_eq!(files.len(), 1);
    assert!(serde_json::from_slice::<serde_json::Value>(&std::fs::read(&files[0]).unwrap()).is_ok());
}

#[tokio::test]
async fn test_disk_hit_is_promoted_to_memory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/submissions/CIK0001018724.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(submissions_body()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/submissions/CIK0001018724.json", server.uri());

    let writer = HttpAccessClient::builder()
        .user_agent(TEST_USER_AGENT)
        .cache_dir(dir.path())
        .build()
        .unwrap();
    writer.get(&url).await.unwrap();

    let reader = HttpAccessClient::builder()
        .user_agent(TEST_USER_AGENT)
        .cache_dir(dir.path())
        .build()
        .unwrap();
    assert!(reader.get(&url).await.unwrap().is_cached());

    for file in cache_files(dir.path()) {
        std::fs::remove_file(file).unwrap();
    }
    let response = reader.get(&url).await.unwrap();
    assert!(response.is_cached());
    assert_eq!(reader.rate_limiter().granted(), 0);
}

#[tokio::test]
async fn test_disabled_cache_always_fetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uncached.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(2)
        .mount(&server)
        .await;

    let client = HttpAccessClient::builder()
        .user_agent(TEST_USER_AGENT)
        .enable_cache(false)
        .build()
        .unwrap();
    let url = format!("{}/uncached.json", server.uri());

    client.get(&url).await.unwrap();
    assert!(!client.get(&url).await.unwrap().is_cached());
}

#[tokio::test]
async fn test_clients_can_share_one_limiter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let limiter = Arc::new(RateLimiter::with_clock(10.0, clock.clone()).unwrap());
    let a = HttpAccessClient::builder()
        .user_agent(TEST_USER_AGENT)
        .rate_limiter(limiter.clone())
        .build()
        .unwrap();
    let b = HttpAccessClient::builder()
        .user_agent(TEST_USER_AGENT)
        .rate_limiter(limiter.clone())
        .build()
        .unwrap();

    a.get(&format!("{}/a.json", server.uri())).await.unwrap();
    b.get(&format!("{}/b.json", server.uri())).await.unwrap();
    assert_eq!(limiter.granted(), 2);
}
