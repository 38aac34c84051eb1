//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Update engine: manifest retrieval, artifact transfer and orchestration."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, DurationRound, Utc};
use hct_common::time::run_stamp;
use hct_common::{AppConfig, Component, ComponentConfig, RuntimeLayout};
use hct_logging::{hct_info, hct_warn, log_update_event, LogContext, UpdateEventOutcome};
use hct_metrics::UpdateMetrics;
use hct_persistence::{FileStateStore, LocalManifest, StateStore, StatusEntry, UpdateStatus};
use hct_versioning::{decide, UpdateDecision, VersionInfo};
use indexmap::IndexMap;
use tokio::sync::Mutex;

use crate::apply::{ArtifactApplier, DirectoryApplier};
use crate::backup::BackupStore;
use crate::checksum::Checksum;
use crate::credentials::resolve_token;
use crate::error::{FetchError, ManifestError, UpdateError};
use crate::fetch::{ArtifactFetcher, HttpArtifactFetcher, RetryPolicy};
use crate::manifest::{HttpManifestClient, ManifestClient, ManifestQuery, RemoteManifest};
use crate::request::{UpdateCheck, UpdateRequest, UpdateResponse};
use crate::run_log::RunLog;

const DEFAULT_INSTALL_ROOT: &str = "/config/homecore";

/// Update source and installer of one component.
#[derive(Clone)]
pub struct ComponentBinding {
    base_url: Option<String>,
    extra_params: IndexMap<String, String>,
    applier: Arc<dyn ArtifactApplier>,
}

impl ComponentBinding {
    pub fn new(applier: Arc<dyn ArtifactApplier>) -> Self {
        Self {
            base_url: None,
            extra_params: IndexMap::new(),
            applier,
        }
    }

    /// Binding from configuration, installing through a [`DirectoryApplier`].
    ///
    /// Without an explicit `install_dir` the component installs into
    /// `/config/homecore/<component>`.
    pub fn from_config(component: Component, config: &ComponentConfig) -> Self {
        let install_dir = config
            .install_dir
            .clone()
            .unwrap_or_else(|| Path::new(DEFAULT_INSTALL_ROOT).join(component.as_str()));
        let applier = DirectoryApplier::new(install_dir).strip_single_root(config.strip_single_root);
        let mut binding = Self::new(Arc::new(applier));
        binding.base_url = config.base_url().map(str::to_owned);
        binding.extra_params = config.extra_params.clone();
        binding
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }

    fn base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    fn query(&self, token: String, client_id: Option<String>) -> ManifestQuery {
        ManifestQuery {
            token,
            client_id,
            extra: self.extra_params.clone(),
        }
    }
}

impl std::fmt::Debug for ComponentBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentBinding")
            .field("base_url", &self.base_url)
            .field("extra_params", &self.extra_params)
            .finish_non_exhaustive()
    }
}

/// Terminal state reached by a run.
struct Terminal {
    status: UpdateStatus,
    message: String,
    version: Option<String>,
}

impl Terminal {
    fn ok(message: String, version: String) -> Self {
        Self {
            status: UpdateStatus::Ok,
            message,
            version: Some(version),
        }
    }

    fn no_update(message: impl Into<String>, version: Option<String>) -> Self {
        Self {
            status: UpdateStatus::NoUpdate,
            message: message.into(),
            version,
        }
    }

    fn failed(err: UpdateError, version: Option<String>) -> Self {
        Self {
            status: UpdateStatus::Error,
            message: err.to_string(),
            version,
        }
    }

    fn outcome(&self) -> UpdateEventOutcome {
        match self.status {
            UpdateStatus::Ok => UpdateEventOutcome::Applied,
            UpdateStatus::NoUpdate => UpdateEventOutcome::Skipped,
            UpdateStatus::Error => UpdateEventOutcome::Fault,
        }
    }
}

/// Drives update runs for every component.
///
/// A run always ends in exactly one status entry and one [`UpdateResponse`];
/// no failure escapes [`UpdateOrchestrator::run_update`]. Runs of the same
/// component are serialised, different components proceed concurrently.
pub struct UpdateOrchestrator {
    layout: RuntimeLayout,
    token_path: PathBuf,
    manifests: Arc<dyn ManifestClient>,
    fetcher: Arc<dyn ArtifactFetcher>,
    store: Arc<dyn StateStore>,
    backups: BackupStore,
    bindings: HashMap<Component, ComponentBinding>,
    /// Per-component run lock, holding the start time of the last run.
    locks: HashMap<Component, Mutex<Option<DateTime<Utc>>>>,
    metrics: Option<UpdateMetrics>,
}

impl UpdateOrchestrator {
    pub fn new(
        layout: RuntimeLayout,
        token_path: impl Into<PathBuf>,
        manifests: Arc<dyn ManifestClient>,
        fetcher: Arc<dyn ArtifactFetcher>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            backups: BackupStore::new(layout.clone()),
            layout,
            token_path: token_path.into(),
            manifests,
            fetcher,
            store,
            bindings: HashMap::new(),
            locks: Component::all().map(|c| (c, Mutex::new(None))).collect(),
            metrics: None,
        }
    }

    /// Wire HTTP collaborators, the file store and directory appliers from configuration.
    pub fn from_config(config: &AppConfig, version: &VersionInfo) -> Result<Self> {
        let user_agent = version.user_agent();
        let manifests = HttpManifestClient::new(config.http.manifest_timeout, &user_agent)
            .context("failed to build manifest HTTP client")?;
        let fetcher = HttpArtifactFetcher::new(
            config.http.download_timeout,
            &user_agent,
            RetryPolicy::from(&config.retry),
        )
        .context("failed to build download HTTP client")?;
        let layout = config.layout();
        let store = FileStateStore::new(layout.clone());

        let mut orchestrator = Self::new(
            layout,
            config.runtime.token_path.clone(),
            Arc::new(manifests),
            Arc::new(fetcher),
            Arc::new(store),
        );
        for (component, settings) in &config.components {
            orchestrator = orchestrator
                .with_component(*component, ComponentBinding::from_config(*component, settings));
        }
        Ok(orchestrator)
    }

    pub fn with_component(mut self, component: Component, binding: ComponentBinding) -> Self {
        self.bindings.insert(component, binding);
        self
    }

    pub fn with_metrics(mut self, metrics: UpdateMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn layout(&self) -> &RuntimeLayout {
        &self.layout
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Components with a binding, in component order.
    pub fn components(&self) -> Vec<Component> {
        Component::all()
            .filter(|component| self.bindings.contains_key(component))
            .collect()
    }

    /// Run a full update of `component` and record its outcome.
    pub async fn run_update(&self, component: Component, request: &UpdateRequest) -> UpdateResponse {
        let mut last_start = match self.locks.get(&component) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let clock = Instant::now();
        let started_at = next_run_start(last_start.as_deref().copied().flatten());
        if let Some(last_start) = last_start.as_mut() {
            **last_start = Some(started_at);
        }
        let stamp = run_stamp(started_at);
        let ctx = LogContext::new()
            .with_component(component.as_str())
            .with_stage("start")
            .with_run(&stamp);
        if let Err(err) = self.layout.ensure_directories() {
            hct_warn!(context = ctx, "unable to prepare runtime directories: {err}");
        }
        let log = RunLog::open(self.layout.run_log_path(component, started_at), component);
        hct_info!(context = ctx, "update run started");
        log.log(format!("Starting {component} update"));

        let terminal = self.execute(component, request, started_at, &log).await;
        self.finalize(component, started_at, clock, &log, &stamp, terminal)
    }

    async fn execute(
        &self,
        component: Component,
        request: &UpdateRequest,
        started_at: DateTime<Utc>,
        log: &RunLog,
    ) -> Terminal {
        let (binding, base_url) = match self.binding(component) {
            Ok(bound) => bound,
            Err(err) => return Terminal::failed(err, None),
        };

        let Some(token) = resolve_token(request.token.as_deref(), &self.token_path) else {
            return Terminal::failed(UpdateError::MissingToken, None);
        };

        let local = match self.store.load_manifest(component) {
            Ok(local) => local,
            Err(err) => return Terminal::failed(UpdateError::LocalState(err), None),
        };
        let local_version = local.map(|manifest| manifest.version);
        log.log(format!(
            "Local version: {}",
            local_version.as_deref().unwrap_or("none")
        ));

        let query = binding.query(token, request.client_id.clone());
        log.log(format!("Fetching remote manifest from {base_url}"));
        let manifest = match self.manifests.fetch(base_url, &query).await {
            Ok(manifest) => manifest,
            Err(ManifestError::NotFound) => {
                return Terminal::no_update(ManifestError::NotFound.to_string(), local_version)
            }
            Err(err) => return Terminal::failed(err.into(), local_version),
        };

        let Some(remote_version) = manifest.version().map(str::to_owned) else {
            return Terminal::failed(UpdateError::MissingVersion, local_version);
        };
        log.log(format!("Remote version: {remote_version}"));

        match decide(local_version.as_deref(), &remote_version, request.force) {
            UpdateDecision::Skip => {
                return Terminal::no_update(
                    format!("version {remote_version} already applied"),
                    Some(remote_version),
                )
            }
            UpdateDecision::ForceApply => log.log("Forcing re-apply of the current version"),
            UpdateDecision::Apply => {}
        }

        let Some(download_url) = manifest.download_url().map(str::to_owned) else {
            return Terminal::failed(UpdateError::MissingDownloadUrl, local_version);
        };
        let checksum = match manifest.checksum().map(Checksum::parse).transpose() {
            Ok(checksum) => checksum,
            Err(err) => return Terminal::failed(UpdateError::InvalidChecksum(err), local_version),
        };

        let workspace = match tempfile::Builder::new().prefix("hct-download-").tempdir() {
            Ok(dir) => dir,
            Err(err) => return Terminal::failed(UpdateError::Workspace(err), local_version),
        };
        let filename = artifact_filename(&manifest, &download_url, component, &remote_version);
        let artifact = workspace.path().join(&filename);

        log.log(format!("Downloading {download_url}"));
        match self.fetcher.download(&download_url, &artifact, checksum.as_ref()).await {
            Ok(downloaded) => {
                log.log(format!(
                    "Downloaded {} bytes in {} attempt(s)",
                    downloaded.bytes, downloaded.attempts
                ));
                if let Some(metrics) = &self.metrics {
                    metrics.record_download(component.as_str(), downloaded.bytes);
                }
            }
            Err(FetchError::NotFound(_)) => {
                return Terminal::no_update("remote artifact not found (no update)", local_version)
            }
            Err(err) => return Terminal::failed(err.into(), local_version),
        }
        if let Some(checksum) = &checksum {
            log.log(format!("Checksum verified ({})", checksum.algorithm()));
        }

        match self.backups.store(component, started_at, &filename, &artifact).await {
            Ok(path) => log.log(format!("Backup stored at {}", path.display())),
            Err(err) => return Terminal::failed(UpdateError::Backup(err), local_version),
        }

        log.log("Applying update");
        if let Err(err) = binding.applier.apply(&artifact, &manifest, log).await {
            return Terminal::failed(UpdateError::Apply(err), local_version);
        }

        let record = LocalManifest {
            version: remote_version.clone(),
            download_url,
            checksum: manifest.checksum().map(str::to_owned),
            updated_at: started_at,
        };
        if let Err(err) = self.store.save_manifest(component, &record) {
            return Terminal::failed(UpdateError::SaveManifest(err), local_version);
        }

        Terminal::ok(
            format!("update {component} applied (version {remote_version})"),
            remote_version,
        )
    }

    fn finalize(
        &self,
        component: Component,
        started_at: DateTime<Utc>,
        clock: Instant,
        log: &RunLog,
        stamp: &str,
        terminal: Terminal,
    ) -> UpdateResponse {
        match terminal.status {
            UpdateStatus::Error => log.error(&terminal.message),
            UpdateStatus::Ok | UpdateStatus::NoUpdate => log.log(&terminal.message),
        }

        let response = UpdateResponse {
            component,
            status: terminal.status,
            message: terminal.message.clone(),
            version: terminal.version.clone(),
            log_path: log.path().display().to_string(),
            started_at,
            finished_at: Utc::now(),
            exit_code: terminal.status.exit_code(),
        };

        let entry: StatusEntry = response.to_status_entry();
        if let Err(err) = self.store.record_status(&entry) {
            log.error(format!("failed to record status: {err}"));
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_run(
                component.as_str(),
                terminal.status.as_str(),
                clock.elapsed().as_secs_f64(),
            );
        }

        let mut ctx = LogContext::new()
            .with_component(component.as_str())
            .with_stage("finish")
            .with_run(stamp);
        if let Some(version) = terminal.version.as_deref() {
            ctx = ctx.with_version(version);
        }
        log_update_event(Some(&ctx), "update.finished", &terminal.message, terminal.outcome());
        response
    }

    /// Binding of `component` together with its configured base URL.
    fn binding(&self, component: Component) -> Result<(&ComponentBinding, &str), UpdateError> {
        self.bindings
            .get(&component)
            .and_then(|binding| Some((binding, binding.base_url()?)))
            .ok_or_else(|| UpdateError::MissingBaseUrl(component.to_string()))
    }

    /// Resolve what a run would do without downloading or recording anything.
    pub async fn check(
        &self,
        component: Component,
        request: &UpdateRequest,
    ) -> Result<UpdateCheck, UpdateError> {
        let (binding, base_url) = self.binding(component)?;
        let token = resolve_token(request.token.as_deref(), &self.token_path)
            .ok_or(UpdateError::MissingToken)?;
        let local_version = self
            .store
            .load_manifest(component)
            .map_err(UpdateError::LocalState)?
            .map(|manifest| manifest.version);

        let query = binding.query(token, request.client_id.clone());
        let manifest = match self.manifests.fetch(base_url, &query).await {
            Ok(manifest) => manifest,
            Err(ManifestError::NotFound) => {
                return Ok(UpdateCheck {
                    component,
                    local_version,
                    remote_version: None,
                    decision: None,
                })
            }
            Err(err) => return Err(err.into()),
        };
        let remote_version = manifest
            .version()
            .map(str::to_owned)
            .ok_or(UpdateError::MissingVersion)?;
        let decision = decide(local_version.as_deref(), &remote_version, request.force);
        Ok(UpdateCheck {
            component,
            local_version,
            remote_version: Some(remote_version),
            decision: Some(decision),
        })
    }
}

/// Start time of a new run, strictly after the previous run of the same component.
///
/// Run logs and backups are keyed by the start stamp, which has microsecond
/// resolution.
fn next_run_start(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    let now = now
        .duration_trunc(chrono::Duration::microseconds(1))
        .unwrap_or(now);
    match previous {
        Some(previous) if now <= previous => previous + chrono::Duration::microseconds(1),
        _ => now,
    }
}

/// Manifest `filename`, else the last URL path segment, else `<component>_<version>.pkg`.
fn artifact_filename(
    manifest: &RemoteManifest,
    download_url: &str,
    component: Component,
    version: &str,
) -> String {
    let from_manifest = manifest.filename().and_then(file_name_of);
    let from_url = || {
        let url = reqwest::Url::parse(download_url).ok()?;
        let last = url.path_segments()?.next_back()?.to_owned();
        file_name_of(&last)
    };
    from_manifest
        .or_else(from_url)
        .unwrap_or_else(|| format!("{component}_{version}.pkg"))
}

fn file_name_of(raw: &str) -> Option<String> {
    Path::new(raw.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
}
