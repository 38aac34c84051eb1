//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Update engine: manifest retrieval, artifact transfer and orchestration."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use hct_common::{Component, SchedulerConfig};
use hct_logging::{hct_debug, hct_error, hct_info, hct_warn, LogContext};
use hct_persistence::UpdateStatus;
use tokio::sync::watch;
use tracing::info;

use crate::error::UpdateError;
use crate::notify::{Notification, UpdateNotifier};
use crate::orchestrator::UpdateOrchestrator;
use crate::request::{UpdateCheck, UpdateRequest, UpdateResponse};

/// Result of one scheduler pass for one component.
#[derive(Debug)]
pub enum PassOutcome {
    Updated(UpdateResponse),
    Checked(Result<UpdateCheck, UpdateError>),
}

/// Periodic driver running every bound component through the orchestrator.
pub struct UpdateScheduler {
    orchestrator: Arc<UpdateOrchestrator>,
    interval: Duration,
    auto_update: bool,
    notifier: Option<Arc<dyn UpdateNotifier>>,
}

impl UpdateScheduler {
    pub fn new(orchestrator: Arc<UpdateOrchestrator>, interval: Duration, auto_update: bool) -> Self {
        Self {
            orchestrator,
            interval,
            auto_update,
            notifier: None,
        }
    }

    pub fn from_config(orchestrator: Arc<UpdateOrchestrator>, config: &SchedulerConfig) -> Self {
        Self::new(orchestrator, config.check_interval, config.auto_update)
    }

    /// Report pass results through `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<dyn UpdateNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// One pass over all components, concurrently.
    ///
    /// Check-only passes announce pending updates; update passes announce
    /// applied ones together with the components that failed.
    pub async fn run_once(&self) -> Vec<(Component, PassOutcome)> {
        let components = self.orchestrator.components();
        let request = UpdateRequest::default();
        let passes = components.iter().map(|component| {
            let request = &request;
            async move {
                let outcome = if self.auto_update {
                    PassOutcome::Updated(self.orchestrator.run_update(*component, request).await)
                } else {
                    PassOutcome::Checked(self.orchestrator.check(*component, request).await)
                };
                (*component, outcome)
            }
        });
        let outcomes = join_all(passes).await;
        for (component, outcome) in &outcomes {
            report(*component, outcome);
        }
        if let Some(notification) = pass_notification(&outcomes) {
            self.deliver(&notification).await;
        }
        outcomes
    }

    /// Run passes every interval until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), auto_update = self.auto_update, "update scheduler started");
        self.deliver(&Notification::started(self.interval, self.auto_update))
            .await;
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.run_once().await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("update scheduler stopped");
    }

    async fn deliver(&self, notification: &Notification) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let ctx = LogContext::new().with_stage("notify");
        match notifier.notify(notification).await {
            Ok(()) => hct_debug!(context = ctx, "notification '{}' sent", notification.id),
            Err(err) => hct_warn!(
                context = ctx,
                "notification '{}' not delivered: {err:#}",
                notification.id
            ),
        }
    }
}

/// Notification summarising a pass, if it has anything to announce.
fn pass_notification(outcomes: &[(Component, PassOutcome)]) -> Option<Notification> {
    let mut available = Vec::new();
    let mut applied = Vec::new();
    let mut failed = Vec::new();
    for (component, outcome) in outcomes {
        match outcome {
            PassOutcome::Checked(Ok(check)) if check.update_available() => available.push(check),
            PassOutcome::Checked(_) => {}
            PassOutcome::Updated(response) => match response.status {
                UpdateStatus::Ok => applied.push(response),
                UpdateStatus::Error => failed.push(*component),
                UpdateStatus::NoUpdate => {}
            },
        }
    }
    Notification::updates_available(&available)
        .or_else(|| Notification::updates_applied(&applied, &failed))
}

fn report(component: Component, outcome: &PassOutcome) {
    let ctx = LogContext::new()
        .with_component(component.as_str())
        .with_stage("schedule");
    match outcome {
        PassOutcome::Updated(response) => {
            hct_debug!(context = ctx, "scheduled update finished: {}", response.status)
        }
        PassOutcome::Checked(Ok(check)) if check.update_available() => hct_info!(
            context = ctx,
            "update available: {} -> {}",
            check.local_version.as_deref().unwrap_or("none"),
            check.remote_version.as_deref().unwrap_or("")
        ),
        PassOutcome::Checked(Ok(_)) => hct_debug!(context = ctx, "no update available"),
        PassOutcome::Checked(Err(err)) => hct_error!(context = ctx, "update check failed: {err}"),
    }
}
