//! # EDGAR HTTP
//!
//! The shared HTTP access layer for SEC EDGAR tools: one client that every
//! tool goes through so the whole process respects EDGAR's fair-access rules.
//!
//! ## Features
//!
//! - Process-wide rate ceiling, clamped to 10 requests per second, with
//!   first-come, first-served waiting
//! - TTL cache for successful GET responses, in memory and optionally on disk
//! - Retries with exponential backoff and jitter for 429, 5xx and network failures
//! - Streaming downloads that never leave a partial file behind
//! - Transient, permanent and configuration failures kept apart in [`AccessError`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgar_http::{ClientConfig, HttpAccessClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpAccessClient::new(ClientConfig {
//!         user_agent: "flow-research ops@example.com".to_string(),
//!         ..Default::default()
//!     })?;
//!
//!     let submissions = client
//!         .get("https://data.sec.gov/submissions/CIK0000320193.json")
//!         .await?;
//!     let value: serde_json::Value = submissions.json()?;
//!     println!("{}", value["name"]);
//!
//!     client
//!         .download(
//!             "https://www.sec.gov/Archives/edgar/data/320193/000032019323000106/0000320193-23-000106.txt",
//!             "filings/0000320193-23-000106.txt",
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod retry;

// Re-export commonly used types at crate root
pub use client::{
    DownloadOptions, DownloadOutcome, HttpAccessClient, HttpAccessClientBuilder, HttpResponse,
    RequestOptions,
};
pub use config::ClientConfig;
pub use error::{AccessError, CacheError, Cause};

/// Result type alias using AccessError
pub type Result<T> = std::result::Result<T, AccessError>;
