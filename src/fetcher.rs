//! Downloading resolved sources into the run workspace
//!
//! A [`Fetcher`] turns one [`SourceUrl`] into one [`LocalAsset`]. Fetchers are
//! called concurrently for distinct sources, so implementations must not share
//! per-call state. A failed fetch never leaves a partial file behind.

use crate::config::{Config, RetryConfig};
use crate::error::{FetchError, FetchErrorKind};
use crate::retry::with_retry;
use crate::types::{LocalAsset, SourceUrl};
use crate::utils::asset_file_name;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Capability that downloads one source into a directory
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `source` into `destination_dir` (created if absent)
    async fn fetch(
        &self,
        source: &SourceUrl,
        destination_dir: &Path,
    ) -> Result<LocalAsset, FetchError>;
}

/// Fetcher that streams HTTP(S) response bodies to disk
pub struct HttpFetcher {
    client: reqwest::Client,
    read_timeout: Duration,
    retry: RetryConfig,
}

impl HttpFetcher {
    /// Create a fetcher with the read timeout and retry policy from `config`
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            read_timeout: config.download.read_timeout,
            retry: config.retry.clone(),
        }
    }

    /// One download attempt; removes its own partial file on failure
    async fn fetch_once(&self, source: &SourceUrl, path: &Path) -> Result<u64, FetchError> {
        let position = source.position;
        let url = source.url.as_str();

        let response = tokio::time::timeout(self.read_timeout, self.client.get(url).send())
            .await
            .map_err(|_| FetchError::new(position, url, FetchErrorKind::Timeout))?
            .map_err(|e| FetchError::from_request(position, url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                position,
                url,
                FetchErrorKind::Status {
                    status: status.as_u16(),
                },
            ));
        }

        let result = write_body(response, path, self.read_timeout)
            .await
            .map_err(|kind| FetchError::new(position, url, kind));

        if result.is_err()
            && let Err(e) = tokio::fs::remove_file(path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to remove partial download"
            );
        }

        result
    }
}

/// Stream the response body into `path`, returning the number of bytes written
///
/// Fails with [`FetchErrorKind::Timeout`] when no chunk arrives for `read_timeout`.
async fn write_body(
    response: reqwest::Response,
    path: &Path,
    read_timeout: Duration,
) -> Result<u64, FetchErrorKind> {
    let write_error = |e: std::io::Error| FetchErrorKind::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut file = tokio::fs::File::create(path).await.map_err(write_error)?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    loop {
        let next = tokio::time::timeout(read_timeout, stream.next())
            .await
            .map_err(|_| FetchErrorKind::Timeout)?;
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(|e| {
            if e.is_timeout() {
                FetchErrorKind::Timeout
            } else {
                FetchErrorKind::Connection {
                    reason: e.to_string(),
                }
            }
        })?;
        file.write_all(&chunk).await.map_err(write_error)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(write_error)?;
    file.sync_all().await.map_err(write_error)?;
    Ok(written)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        source: &SourceUrl,
        destination_dir: &Path,
    ) -> Result<LocalAsset, FetchError> {
        tokio::fs::create_dir_all(destination_dir)
            .await
            .map_err(|e| {
                FetchError::new(
                    source.position,
                    source.url.as_str(),
                    FetchErrorKind::Write {
                        path: destination_dir.to_path_buf(),
                        reason: e.to_string(),
                    },
                )
            })?;

        let local_path: PathBuf =
            destination_dir.join(asset_file_name(source.position, &source.url));

        tracing::debug!(
            position = source.position,
            url = %source.url,
            path = %local_path.display(),
            "Fetching source"
        );

        let size = with_retry(&self.retry, || self.fetch_once(source, &local_path)).await?;

        tracing::debug!(
            position = source.position,
            size_bytes = size,
            "Fetch complete"
        );

        Ok(LocalAsset {
            source: source.clone(),
            local_path,
            size_bytes: Some(size),
        })
    }
}
