//! ---
//! hct_section: "03-persistence-logging"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Persistence abstractions and storage bindings."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use hct_common::Component;
use serde::{Deserialize, Serialize};

/// Outcome of one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    /// A new artifact was applied.
    Ok,
    /// Nothing to apply, including a remote 404.
    NoUpdate,
    /// The run failed.
    Error,
}

impl UpdateStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Ok => "ok",
            UpdateStatus::NoUpdate => "no_update",
            UpdateStatus::Error => "error",
        }
    }

    /// Process exit code associated with the status.
    pub fn exit_code(&self) -> i32 {
        match self {
            UpdateStatus::Ok | UpdateStatus::NoUpdate => 0,
            UpdateStatus::Error => 1,
        }
    }
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last successfully applied state of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalManifest {
    /// Version string resolved from the remote manifest.
    pub version: String,
    /// URL the artifact was downloaded from.
    pub download_url: String,
    /// Checksum declared by the remote manifest, if any.
    #[serde(default)]
    pub checksum: Option<String>,
    /// Start time of the run that applied the artifact.
    pub updated_at: DateTime<Utc>,
}

/// Latest recorded outcome of an orchestration run for a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Component the run belonged to.
    pub component: Component,
    /// Outcome of the run.
    pub status: UpdateStatus,
    /// Human readable summary.
    pub message: String,
    /// Resolved version; `None` when the run failed before one was known.
    pub version: Option<String>,
    /// Path of the run's log file.
    pub log_path: String,
    /// `0` for `ok`/`no_update`, `1` for `error`.
    pub exit_code: i32,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached its terminal state.
    pub finished_at: DateTime<Utc>,
}

/// Latest status entries of all components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Status of the `api` component.
    pub api: Option<StatusEntry>,
    /// Status of the `core` component.
    pub core: Option<StatusEntry>,
    /// Status of the `hcc` component.
    pub hcc: Option<StatusEntry>,
}

impl StatusReport {
    /// Entry of one component.
    pub fn get(&self, component: Component) -> Option<&StatusEntry> {
        match component {
            Component::Api => self.api.as_ref(),
            Component::Core => self.core.as_ref(),
            Component::Hcc => self.hcc.as_ref(),
        }
    }

    /// Replace the entry of one component.
    pub fn set(&mut self, component: Component, entry: Option<StatusEntry>) {
        match component {
            Component::Api => self.api = entry,
            Component::Core => self.core = entry,
            Component::Hcc => self.hcc = entry,
        }
    }
}
