//! Response types returned by the client.

use std::path::PathBuf;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{
    CONTENT_ENCODING, CONTENT_TYPE, ETAG, HeaderMap, HeaderName, HeaderValue, LAST_MODIFIED,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Headers kept alongside a cached body.
const CACHED_HEADERS: [HeaderName; 4] = [CONTENT_TYPE, CONTENT_ENCODING, ETAG, LAST_MODIFIED];

/// A fully buffered GET response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    from_cache: bool,
}

impl HttpResponse {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            from_cache: false,
        }
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers. Cached responses carry only `Content-Type`,
    /// `Content-Encoding`, `ETag` and `Last-Modified`.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The (already decompressed) body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as shared bytes.
    pub fn bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// The body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Whether this response was served from the cache.
    pub fn is_cached(&self) -> bool {
        self.from_cache
    }
}

/// Cache representation of an [`HttpResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CachedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    #[serde(with = "body_base64")]
    body: Bytes,
}

impl CachedResponse {
    pub(crate) fn from_response(response: &HttpResponse) -> Self {
        let headers = CACHED_HEADERS
            .iter()
            .filter_map(|name| {
                let value = response.headers.get(name)?.to_str().ok()?;
                Some((name.as_str().to_string(), value.to_string()))
            })
            .collect();
        Self {
            status: response.status.as_u16(),
            headers,
            body: response.body.clone(),
        }
    }

    pub(crate) fn into_response(self) -> HttpResponse {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        HttpResponse {
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            body: self.body,
            from_cache: true,
        }
    }
}

mod body_base64 {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

/// Result of a [`download`](crate::HttpAccessClient::download).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Final location of the file
    pub path: PathBuf,
    /// Size of the file in bytes
    pub bytes_written: u64,
    /// Status of the successful response; `None` when an existing file was reused
    pub status: Option<StatusCode>,
    /// Whether an existing file was kept instead of downloading
    pub reused: bool,
}
