//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Shared primitives and utilities for the update agent."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
//! Core shared primitives for the HomeCore Tools workspace.
//! This crate exposes component identity, configuration loading, the on-disk
//! runtime layout, and tracing initialisation consumed across the workspace.

pub mod component;
pub mod config;
pub mod logging;
pub mod paths;
pub mod time;

pub use component::Component;
pub use config::{
    AppConfig, ComponentConfig, HttpConfig, LoggingConfig, MetricsConfig, NotificationConfig,
    RetryConfig, RuntimeConfig, SchedulerConfig,
};
pub use logging::{init_tracing, LogFormat, LogRotation, LoggingGuard};
pub use paths::RuntimeLayout;
