//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Update engine: manifest retrieval, artifact transfer and orchestration."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use hct_common::Component;
use hct_persistence::{StatusEntry, UpdateStatus};
use hct_versioning::UpdateDecision;
use serde::{Deserialize, Serialize};

/// Caller-supplied parameters of one update run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Authorisation token; falls back to the credential file when absent or blank.
    #[serde(default)]
    pub token: Option<String>,
    /// Optional client identifier forwarded to the manifest endpoint.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Re-apply even when the remote version matches the recorded one.
    #[serde(default)]
    pub force: bool,
}

impl UpdateRequest {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// Terminal result of an update run, mirrored into the status entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub component: Component,
    pub status: UpdateStatus,
    pub message: String,
    pub version: Option<String>,
    pub log_path: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exit_code: i32,
}

impl UpdateResponse {
    /// `true` for `ok` and `no_update`.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn to_status_entry(&self) -> StatusEntry {
        StatusEntry {
            component: self.component,
            status: self.status,
            message: self.message.clone(),
            version: self.version.clone(),
            log_path: self.log_path.clone(),
            exit_code: self.exit_code,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Result of a check-only pass: what a run would do, without doing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateCheck {
    pub component: Component,
    pub local_version: Option<String>,
    /// `None` when the endpoint answered 404.
    pub remote_version: Option<String>,
    #[serde(skip)]
    pub decision: Option<UpdateDecision>,
}

impl UpdateCheck {
    pub fn update_available(&self) -> bool {
        self.decision
            .map(|decision| decision.requires_update())
            .unwrap_or(false)
    }
}
