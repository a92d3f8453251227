//! The HTTP access client and its request/response types.

mod download;
mod flight;
mod http;
mod request;
mod response;

pub use http::{HttpAccessClient, HttpAccessClientBuilder};
pub use request::{CacheKey, DownloadOptions, RequestOptions, normalize_url};
pub use response::{DownloadOutcome, HttpResponse};
