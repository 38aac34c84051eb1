//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Update engine: manifest retrieval, artifact transfer and orchestration."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
//! Update engine for HomeCore components.
//!
//! A run for one component fetches the remote manifest, compares versions,
//! downloads and verifies the artifact, backs it up, hands it to the
//! component's [`ArtifactApplier`] and records the outcome.

pub mod apply;
pub mod backup;
pub mod checksum;
pub mod credentials;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod notify;
pub mod orchestrator;
pub mod request;
pub mod run_log;
pub mod scheduler;

pub use apply::{ArtifactApplier, DirectoryApplier};
pub use backup::BackupStore;
pub use checksum::{Checksum, ChecksumAlgorithm};
pub use credentials::resolve_token;
pub use error::{ChecksumError, FetchError, ManifestError, UpdateError};
pub use fetch::{ArtifactFetcher, Downloaded, HttpArtifactFetcher, RetryPolicy};
pub use manifest::{HttpManifestClient, ManifestClient, ManifestQuery, RemoteManifest};
pub use notify::{HttpNotifier, Notification, UpdateNotifier};
pub use orchestrator::{ComponentBinding, UpdateOrchestrator};
pub use request::{UpdateCheck, UpdateRequest, UpdateResponse};
pub use run_log::RunLog;
pub use scheduler::{PassOutcome, UpdateScheduler};
