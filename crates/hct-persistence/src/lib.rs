//! ---
//! hct_section: "03-persistence-logging"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Persistence abstractions and storage bindings."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Durable per-component state: the local manifest describing the last applied
//! artifact and the status entry of the latest orchestration run.

/// Result alias used throughout the persistence crate.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Error type for the persistence subsystem.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Wrapper for IO errors encountered while reading/writing state files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub mod file_store;
pub mod memory;
pub mod records;

pub use file_store::FileStateStore;
pub use memory::MemoryStateStore;
pub use records::{LocalManifest, StatusEntry, StatusReport, UpdateStatus};

use hct_common::Component;

/// Durable key-value persistence of per-component manifest and status records.
///
/// Manifest and status slots are independent per component. Writes replace the
/// whole record; nothing is merged.
pub trait StateStore: Send + Sync {
    /// Last applied manifest of a component, `None` before the first install.
    fn load_manifest(&self, component: Component) -> Result<Option<LocalManifest>>;

    /// Replace the local manifest of a component.
    fn save_manifest(&self, component: Component, manifest: &LocalManifest) -> Result<()>;

    /// Replace the status slot of `entry.component`.
    fn record_status(&self, entry: &StatusEntry) -> Result<()>;

    /// Latest status entry of a component.
    fn load_status(&self, component: Component) -> Result<Option<StatusEntry>>;

    /// Latest status entries of every component.
    fn load_all_status(&self) -> Result<StatusReport> {
        let mut report = StatusReport::default();
        for component in Component::all() {
            report.set(component, self.load_status(component)?);
        }
        Ok(report)
    }
}
