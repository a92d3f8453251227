//! Response caching.
//!
//! - [`TtlCache`]: single-owner map with per-entry expiry and bounded eviction
//! - [`SharedCache`]: cloneable, thread-safe handle used by the client
//! - [`DiskCache`]: optional on-disk tier that survives restarts

mod disk;
mod shared;
mod ttl_cache;

pub use disk::DiskCache;
pub use shared::SharedCache;
pub use ttl_cache::{DEFAULT_SWEEP_INTERVAL, TtlCache};

use std::time::Duration;

/// Default time-to-live for cached GET responses.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
