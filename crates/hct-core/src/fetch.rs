//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Update engine: manifest retrieval, artifact transfer and orchestration."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use hct_common::RetryConfig;
use reqwest::StatusCode;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::checksum::Checksum;
use crate::error::FetchError;

/// Exponential backoff schedule for download attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delay to wait after the failed attempt `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(8))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay, config.max_delay)
    }
}

/// A verified artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    pub bytes: u64,
    pub attempts: u32,
}

/// Transfers an artifact to a local path.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Download `url` into `dest`, verifying `checksum` when given.
    ///
    /// On failure no file is left at `dest`.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        checksum: Option<&Checksum>,
    ) -> Result<Downloaded, FetchError>;
}

/// Streaming HTTP [`ArtifactFetcher`] with bounded retries.
#[derive(Debug, Clone)]
pub struct HttpArtifactFetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpArtifactFetcher {
    pub fn new(timeout: Duration, user_agent: &str, policy: RetryPolicy) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client, policy })
    }

    async fn attempt(
        &self,
        url: &str,
        dest: &Path,
        checksum: Option<&Checksum>,
    ) -> Result<u64, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_owned()));
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut file = fs::File::create(dest).await?;
        let mut bytes = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?
        {
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if bytes == 0 {
            return Err(FetchError::EmptyBody);
        }

        if let Some(checksum) = checksum {
            let algorithm = checksum.algorithm();
            let checksum = checksum.clone();
            let path = dest.to_path_buf();
            tokio::task::spawn_blocking(move || checksum.verify_file(&path))
                .await
                .map_err(|err| FetchError::Io(io::Error::other(err)))??;
            debug!(url, %algorithm, "checksum verified");
        }
        Ok(bytes)
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        checksum: Option<&Checksum>,
    ) -> Result<Downloaded, FetchError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut attempt = 1;
        loop {
            match self.attempt(url, dest, checksum).await {
                Ok(bytes) => {
                    debug!(url, bytes, attempt, "artifact downloaded");
                    return Ok(Downloaded {
                        path: dest.to_path_buf(),
                        bytes,
                        attempts: attempt,
                    });
                }
                Err(err) => {
                    remove_partial(dest).await;
                    if !err.is_retryable() || attempt >= self.policy.max_attempts {
                        warn!(url, attempt, error = %err, "artifact download failed");
                        return Err(err);
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(url, attempt, delay_ms = delay.as_millis() as u64, error = %err, "download attempt failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

async fn remove_partial(dest: &Path) {
    match fs::remove_file(dest).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %dest.display(), error = %err, "unable to remove partial download"),
    }
}
