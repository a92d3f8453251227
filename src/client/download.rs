//! Streaming downloads that never leave a partial file at the destination.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use rand::Rng;
use reqwest::StatusCode;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::client::HttpAccessClient;
use crate::client::http::check_status;
use crate::client::request::{DownloadOptions, normalize_url};
use crate::client::response::DownloadOutcome;
use crate::error::{AccessError, Cause};

impl HttpAccessClient {
    /// Stream `url` to `dest`.
    ///
    /// The body is written to a temporary file next to `dest` and renamed into
    /// place only after every byte arrived and was flushed. On any failure the
    /// temporary file is removed and an existing `dest` is left untouched.
    /// Parent directories are created as needed. Downloads are never cached.
    pub async fn download(
        &self,
        url: &str,
        dest: impl AsRef<Path>,
    ) -> Result<DownloadOutcome, AccessError> {
        self.download_with(url, dest, &DownloadOptions::default())
            .await
    }

    /// [`download`](Self::download) with options.
    pub async fn download_with(
        &self,
        url: &str,
        dest: impl AsRef<Path>,
        options: &DownloadOptions,
    ) -> Result<DownloadOutcome, AccessError> {
        let dest = dest.as_ref();
        let target = normalize_url(url, &[]).map_err(|e| AccessError::from_cause(url, 0, e))?;
        let local_failure = |err: io::Error| AccessError::from_cause(url, 0, Cause::Io(err));

        if options.skip_existing {
            if let Ok(meta) = tokio::fs::metadata(dest).await {
                if meta.is_file() {
                    tracing::debug!(url, dest = %dest.display(), "destination exists, skipping download");
                    return Ok(DownloadOutcome {
                        path: dest.to_path_buf(),
                        bytes_written: meta.len(),
                        status: None,
                        reused: true,
                    });
                }
            }
        }

        let file_name = dest.file_name().ok_or_else(|| {
            local_failure(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("destination {} has no file name", dest.display()),
            ))
        })?;
        let parent = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(local_failure)?;

        let target = &target;
        let (status, bytes_written) = self
            .execute(url, move |_| async move {
                self.download_once(target, dest, parent, file_name).await
            })
            .await?;

        tracing::info!(url, dest = %dest.display(), bytes = bytes_written, "download complete");
        Ok(DownloadOutcome {
            path: dest.to_path_buf(),
            bytes_written,
            status: Some(status),
            reused: false,
        })
    }

    /// One attempt: request, stream into a temporary file, rename into place.
    async fn download_once(
        &self,
        target: &Url,
        dest: &Path,
        parent: &Path,
        file_name: &OsStr,
    ) -> Result<(StatusCode, u64), Cause> {
        let timeout = self.config.timeout;
        let send = self.http_client.get(target.clone()).send();
        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| Cause::Timeout)?
            .map_err(Cause::from_middleware)?;
        let response = check_status(response)?;
        let status = response.status();

        let mut partial = PartialFile::create(parent, file_name, dest).await?;
        let mut stream = std::pin::pin!(response.bytes_stream());
        // The timeout bounds each read, not the whole transfer.
        while let Some(chunk) = tokio::time::timeout(timeout, stream.next())
            .await
            .map_err(|_| Cause::Timeout)?
        {
            let chunk = chunk.map_err(Cause::from_reqwest)?;
            partial.write(&chunk).await?;
        }

        let bytes_written = partial.persist().await?;
        Ok((status, bytes_written))
    }
}

/// A temporary file that is deleted on drop unless persisted.
#[derive(Debug)]
struct PartialFile {
    file: Option<File>,
    tmp: PathBuf,
    dest: PathBuf,
    written: u64,
    persisted: bool,
}

impl PartialFile {
    async fn create(parent: &Path, file_name: &OsStr, dest: &Path) -> io::Result<Self> {
        let tmp = parent.join(format!(
            ".{}.{:08x}.part",
            file_name.to_string_lossy(),
            rand::thread_rng().r#gen::<u32>()
        ));
        let file = File::create(&tmp).await?;
        Ok(Self {
            file: Some(file),
            tmp,
            dest: dest.to_path_buf(),
            written: 0,
            persisted: false,
        })
    }

    async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush to stable storage and move over the destination.
    async fn persist(mut self) -> io::Result<u64> {
        let mut file = self.file.take().ok_or_else(closed)?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&self.tmp, &self.dest).await?;
        self.persisted = true;
        Ok(self.written)
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        drop(self.file.take());
        if let Err(err) = std::fs::remove_file(&self.tmp) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.tmp.display(), error = %err, "failed to remove partial download");
            }
        }
    }
}

fn closed() -> io::Error {
    io::Error::other("partial file already closed")
}
