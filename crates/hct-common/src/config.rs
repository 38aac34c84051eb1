//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Shared primitives and utilities for the update agent."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;
use url::Url;

use crate::component::Component;
use crate::logging::{LogFormat, LogRotation};
use crate::paths::RuntimeLayout;

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_token_path() -> PathBuf {
    PathBuf::from("/config/homecore/client_token")
}

fn default_manifest_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(8)
}

fn default_check_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_true() -> bool {
    true
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("/data/logs/agent")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_notification_endpoint() -> String {
    "http://supervisor/core/api/services/persistent_notification/create".to_owned()
}

fn default_notification_token_env() -> Option<String> {
    Some("SUPERVISOR_TOKEN".to_owned())
}

fn default_notification_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9899))
}

/// Primary configuration object for the update agent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub components: IndexMap<Component, ComponentConfig>,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "HCT_CONFIG";

    /// Load configuration from disk, respecting the `HCT_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Runtime directory layout derived from `runtime.data_dir`.
    pub fn layout(&self) -> RuntimeLayout {
        RuntimeLayout::new(self.runtime.data_dir.clone())
    }

    /// Settings for one component, if configured.
    pub fn component(&self, component: Component) -> Option<&ComponentConfig> {
        self.components.get(&component)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }
        if self.scheduler.check_interval.is_zero() {
            return Err(anyhow!("scheduler.check_interval_secs must be greater than zero"));
        }
        if self.notifications.enabled {
            Url::parse(&self.notifications.endpoint).with_context(|| {
                format!(
                    "notifications.endpoint '{}' is not a valid URL",
                    self.notifications.endpoint
                )
            })?;
        }
        for (component, settings) in &self.components {
            settings.validate(*component)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Location of persisted state and the fallback credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            token_path: default_token_path(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_manifest_timeout", rename = "manifest_timeout_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub manifest_timeout: Duration,
    #[serde(default = "default_download_timeout", rename = "download_timeout_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub download_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            manifest_timeout: default_manifest_timeout(),
            download_timeout: default_download_timeout(),
        }
    }
}

/// Retry schedule applied to artifact downloads.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay", rename = "base_delay_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub base_delay: Duration,
    #[serde(default = "default_max_delay", rename = "max_delay_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_check_interval", rename = "check_interval_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub check_interval: Duration,
    #[serde(default = "default_true")]
    pub auto_update: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: default_check_interval(),
            auto_update: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default)]
    pub rotation: LogRotation,
    /// Filter directive used when neither `HCT_LOG` nor `RUST_LOG` is set.
    #[serde(default)]
    pub level: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            rotation: LogRotation::default(),
            level: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

/// Operator notifications posted after scheduler passes.
///
/// The bearer token is read from the environment variable named by
/// `token_env`; when that variable is unset notifications are skipped.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_notification_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_notification_token_env")]
    pub token_env: Option<String>,
    #[serde(default = "default_notification_timeout", rename = "timeout_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_notification_endpoint(),
            token_env: default_notification_token_env(),
            timeout: default_notification_timeout(),
        }
    }
}

/// Per-component update source and install target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Remote manifest endpoint. A missing value fails every run of the component.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub install_dir: Option<PathBuf>,
    /// Apply the contents of a lone top-level archive directory instead of the directory itself.
    #[serde(default = "default_true")]
    pub strip_single_root: bool,
    /// Extra query parameters merged into the manifest request.
    #[serde(default)]
    pub extra_params: IndexMap<String, String>,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            install_dir: None,
            strip_single_root: true,
            extra_params: IndexMap::new(),
        }
    }
}

impl ComponentConfig {
    pub fn validate(&self, component: Component) -> Result<()> {
        if let Some(base_url) = self.base_url.as_deref().filter(|url| !url.trim().is_empty()) {
            Url::parse(base_url).with_context(|| {
                format!("component '{component}' has an invalid base_url '{base_url}'")
            })?;
        }
        Ok(())
    }

    /// Configured base URL, treating blank strings as unset.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}
