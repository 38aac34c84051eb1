//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Update engine: manifest retrieval, artifact transfer and orchestration."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use hct_common::{Component, NotificationConfig};
use serde::Serialize;
use tracing::{debug, warn};

use crate::request::{UpdateCheck, UpdateResponse};

/// Operator-facing message about update activity.
///
/// Messages with the same `id` replace each other on the receiving side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    #[serde(rename = "notification_id")]
    pub id: String,
}

impl Notification {
    /// Announces a started scheduler.
    pub fn started(interval: Duration, auto_update: bool) -> Self {
        Self {
            title: "HomeCore Tools started".into(),
            message: format!(
                "Automatic update checks are active.\n\nChecking every {} minutes.\nAuto-update: {}",
                interval.as_secs() / 60,
                if auto_update { "enabled" } else { "disabled" }
            ),
            id: "homecore_tools_started".into(),
        }
    }

    /// Lists pending updates; `None` when nothing is pending.
    pub fn updates_available(checks: &[&UpdateCheck]) -> Option<Self> {
        if checks.is_empty() {
            return None;
        }
        let lines: Vec<String> = checks
            .iter()
            .map(|check| {
                format!(
                    "- {}: {} → {}",
                    check.component,
                    check.local_version.as_deref().unwrap_or("none"),
                    check.remote_version.as_deref().unwrap_or("unknown")
                )
            })
            .collect();
        Some(Self {
            title: "HomeCore updates available".into(),
            message: format!("Found {} update(s):\n\n{}", checks.len(), lines.join("\n")),
            id: "homecore_updates_available".into(),
        })
    }

    /// Summarises applied updates; `None` unless at least one was applied.
    pub fn updates_applied(applied: &[&UpdateResponse], failed: &[Component]) -> Option<Self> {
        if applied.is_empty() {
            return None;
        }
        let lines: Vec<String> = applied
            .iter()
            .map(|response| {
                format!(
                    "- {}: {}",
                    response.component,
                    response.version.as_deref().unwrap_or("unknown")
                )
            })
            .collect();
        let mut message = format!(
            "{} update(s) applied successfully:\n\n{}",
            applied.len(),
            lines.join("\n")
        );
        if !failed.is_empty() {
            let failed: Vec<&str> = failed.iter().map(Component::as_str).collect();
            message.push_str(&format!("\n\nFailed: {}", failed.join(", ")));
        }
        message.push_str("\n\nRestart Home Assistant to load the updated components.");
        Some(Self {
            title: "HomeCore updates applied".into(),
            message,
            id: "homecore_updates_applied".into(),
        })
    }
}

/// Delivery channel for [`Notification`]s.
#[async_trait]
pub trait UpdateNotifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Posts notifications as JSON to an HTTP endpoint, e.g. the supervisor's
/// `persistent_notification/create` service.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpNotifier {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        user_agent: &str,
        token: Option<String>,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }

    /// Notifier described by `config`.
    ///
    /// `None` when notifications are disabled, or when `token_env` names a
    /// variable that is unset or blank. A blank `token_env` sends no credentials.
    pub fn from_config(config: &NotificationConfig, user_agent: &str) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let token = match config.token_env.as_deref().map(str::trim).filter(|var| !var.is_empty()) {
            Some(var) => match std::env::var(var) {
                Ok(token) if !token.trim().is_empty() => Some(token.trim().to_owned()),
                _ => {
                    warn!(variable = var, "notification token unavailable; notifications disabled");
                    return Ok(None);
                }
            },
            None => None,
        };
        let notifier = Self::new(config.endpoint.clone(), config.timeout, user_agent, token)
            .context("failed to build notification HTTP client")?;
        Ok(Some(notifier))
    }
}

#[async_trait]
impl UpdateNotifier for HttpNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let mut request = self.client.post(&self.endpoint).json(notification);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("notification request to {} failed", self.endpoint))?;
        let status = response.status();
        if !status.is_success() {
            bail!("notification endpoint answered HTTP {}", status.as_u16());
        }
        debug!(id = %notification.id, "notification delivered");
        Ok(())
    }
}
