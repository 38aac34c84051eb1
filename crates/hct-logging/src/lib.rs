//! ---
//! hct_section: "03-persistence-logging"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Structured logging adapters and sinks."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Context-carrying logging helpers shared by the update engine and its tests.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber suitable for development and tests.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_test_writer())
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Component the event belongs to (`api`, `core`, `hcc`).
    pub component: Option<&'a str>,
    /// Orchestration stage that produced the event.
    pub stage: Option<&'a str>,
    /// Version string relevant to the event.
    pub version: Option<&'a str>,
    /// Run identifier, usually the run start stamp.
    pub run: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a component name.
    pub fn with_component(mut self, component: &'a str) -> Self {
        self.component = Some(component);
        self
    }

    /// Attach a stage name.
    pub fn with_stage(mut self, stage: &'a str) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Attach a version string.
    pub fn with_version(mut self, version: &'a str) -> Self {
        self.version = Some(version);
        self
    }

    /// Attach a run identifier.
    pub fn with_run(mut self, run: &'a str) -> Self {
        self.run = Some(run);
        self
    }
}

/// Outcome attached to terminal update events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEventOutcome {
    /// A new artifact was applied.
    Applied,
    /// Nothing to do; not a failure.
    Skipped,
    /// The run failed.
    Fault,
}

impl UpdateEventOutcome {
    /// Wire label used in structured fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateEventOutcome::Applied => "applied",
            UpdateEventOutcome::Skipped => "skipped",
            UpdateEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized update lifecycle event.
pub fn log_update_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: UpdateEventOutcome,
) {
    let ctx = context.cloned().unwrap_or_default();
    let component = ctx.component.unwrap_or("");
    let stage = ctx.stage.unwrap_or("");
    let version = ctx.version.unwrap_or("");
    let run = ctx.run.unwrap_or("");
    match outcome {
        UpdateEventOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            component,
            stage,
            version,
            run,
            message = %message
        ),
        UpdateEventOutcome::Applied | UpdateEventOutcome::Skipped => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            component,
            stage,
            version,
            run,
            message = %message
        ),
    }
}
