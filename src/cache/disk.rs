//! Filesystem-backed cache tier.
//!
//! Entries live as one JSON file per key, named by the SHA-256 of the key so
//! arbitrary URLs map to safe file names. Expiry is stored as wall-clock time
//! because entries outlive the process that wrote them.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CacheError;

#[derive(Serialize, Deserialize)]
struct DiskEntry<V> {
    key: String,
    expires_at_ms: u64,
    value: V,
}

/// A directory of cached values.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    /// Open (and create if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read a live value.
    ///
    /// Expired entries are deleted and read as absent. Undecodable entries are
    /// deleted and reported as [`CacheError::Corrupt`].
    pub async fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>, CacheError> {
        Ok(self.get_with_ttl(key).await?.map(|(value, _)| value))
    }

    /// Read a live value together with its remaining time-to-live.
    pub async fn get_with_ttl<V: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<(V, Duration)>, CacheError> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let entry: DiskEntry<V> = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                remove_quietly(&path).await;
                return Err(err.into());
            }
        };

        if entry.key != key {
            return Ok(None);
        }
        let now = now_ms();
        if now >= entry.expires_at_ms {
            remove_quietly(&path).await;
            return Ok(None);
        }
        let remaining = Duration::from_millis(entry.expires_at_ms - now);
        Ok(Some((entry.value, remaining)))
    }

    /// Store a value. A zero TTL removes any existing entry instead.
    pub async fn set<V: Serialize>(
        &self,
        key: &str,
        value: &V,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return self.remove(key).await;
        }

        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let entry = DiskEntry {
            key: key.to_string(),
            expires_at_ms: now_ms().saturating_add(ttl_ms),
            value,
        };
        let serialized = serde_json::to_vec(&entry)?;

        let path = self.path_for(key);
        let tmp = path.with_extension(format!("{:08x}.tmp", rand::thread_rng().r#gen::<u32>()));
        if let Err(err) = tokio::fs::write(&tmp, &serialized).await {
            remove_quietly(&tmp).await;
            return Err(err.into());
        }
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            remove_quietly(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Delete an entry if present.
    pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{:x}.json", digest))
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

async fn remove_quietly(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}
