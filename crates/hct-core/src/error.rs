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

use hct_persistence::PersistenceError;
use thiserror::Error;

/// Failure to obtain a usable remote manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The endpoint answered 404; callers treat this as "no update".
    #[error("remote endpoint returned 404 (no update)")]
    NotFound,
    #[error("remote manifest endpoint returned HTTP {0}")]
    Status(u16),
    #[error("remote manifest request failed: {0}")]
    Transport(String),
    #[error("remote manifest is not a JSON object: {0}")]
    InvalidBody(String),
}

/// Failure while verifying an artifact checksum.
#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("unsupported checksum algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("malformed checksum digest '{0}'")]
    Malformed(String),
    #[error("checksum mismatch ({algorithm}): expected {expected}, got {actual}")]
    Mismatch {
        algorithm: String,
        expected: String,
        actual: String,
    },
    #[error("unable to hash artifact: {0}")]
    Io(#[from] io::Error),
}

/// Failure of a single download attempt, or of the last attempt once retries ran out.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("artifact not found at {0}")]
    NotFound(String),
    #[error("artifact download returned HTTP {0}")]
    Status(u16),
    #[error("artifact download failed: {0}")]
    Transport(String),
    #[error("artifact write failed: {0}")]
    Io(#[from] io::Error),
    #[error("downloaded file is empty")]
    EmptyBody,
    #[error(transparent)]
    Checksum(ChecksumError),
}

impl FetchError {
    /// Transient failures worth another attempt. 404s and integrity failures are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Status(_) | FetchError::Transport(_) | FetchError::Io(_) | FetchError::EmptyBody
        )
    }
}

impl From<ChecksumError> for FetchError {
    fn from(err: ChecksumError) -> Self {
        match err {
            ChecksumError::Io(io) => FetchError::Io(io),
            other => FetchError::Checksum(other),
        }
    }
}

/// Failures that end an orchestration run in the `error` state.
///
/// The `Display` output is what lands in the status entry, so variants read
/// as complete sentences for operators.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("base URL not configured for {0}")]
    MissingBaseUrl(String),
    #[error("token not provided (request payload or credential file)")]
    MissingToken,
    #[error("failed to read local manifest: {0}")]
    LocalState(#[source] PersistenceError),
    #[error("failed to fetch remote manifest: {0}")]
    Manifest(#[from] ManifestError),
    #[error("remote manifest has no version information")]
    MissingVersion,
    #[error("remote manifest has no download URL")]
    MissingDownloadUrl,
    #[error("remote manifest declares an invalid checksum: {0}")]
    InvalidChecksum(#[source] ChecksumError),
    #[error("failed to prepare download directory: {0}")]
    Workspace(#[source] io::Error),
    #[error("download failed: {0}")]
    Download(#[from] FetchError),
    #[error("backup failed: {0}")]
    Backup(#[source] io::Error),
    #[error("error applying update: {0:#}")]
    Apply(anyhow::Error),
    #[error("update applied but the local manifest could not be saved: {0}")]
    SaveManifest(#[source] PersistenceError),
}
