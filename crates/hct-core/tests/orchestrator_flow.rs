//! ---
//! hct_section: "15-testing-qa-runbook"
//! hct_subsection: "tests"
//! hct_type: "test"
//! hct_scope: "code"
//! hct_description: "Orchestrator state machine against in-process collaborators."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hct_common::{Component, RuntimeLayout};
use hct_core::{
    ArtifactApplier, ArtifactFetcher, BackupStore, Checksum, ComponentBinding, Downloaded, FetchError,
    ManifestClient, ManifestError, ManifestQuery, Notification, PassOutcome, RemoteManifest,
    RunLog, UpdateNotifier, UpdateOrchestrator, UpdateRequest, UpdateScheduler,
};
use hct_metrics::{new_registry, UpdateMetrics};
use hct_persistence::{
    LocalManifest, MemoryStateStore, PersistenceError, StateStore, StatusEntry, UpdateStatus,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;

const BASE_URL: &str = "https://updates.test/api/update";

enum ManifestReply {
    Body(Value),
    NotFound,
    Status(u16),
}

struct StaticManifests {
    reply: ManifestReply,
    queries: Mutex<Vec<ManifestQuery>>,
}

impl StaticManifests {
    fn new(reply: ManifestReply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            queries: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.queries.lock().len()
    }
}

#[async_trait]
impl ManifestClient for StaticManifests {
    async fn fetch(
        &self,
        _base_url: &str,
        query: &ManifestQuery,
    ) -> Result<RemoteManifest, ManifestError> {
        self.queries.lock().push(query.clone());
        match &self.reply {
            ManifestReply::Body(body) => RemoteManifest::try_from(body.clone()),
            ManifestReply::NotFound => Err(ManifestError::NotFound),
            ManifestReply::Status(code) => Err(ManifestError::Status(*code)),
        }
    }
}

enum FetchReply {
    Bytes(&'static [u8]),
    /// `payload-<n>` for the n-th download.
    Numbered,
    NotFound,
    Refused,
}

struct ScriptedFetcher {
    reply: FetchReply,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn new(reply: FetchReply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactFetcher for ScriptedFetcher {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        checksum: Option<&Checksum>,
    ) -> Result<Downloaded, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let bytes = match &self.reply {
            FetchReply::Bytes(bytes) => bytes.to_vec(),
            FetchReply::Numbered => format!("payload-{call}").into_bytes(),
            FetchReply::NotFound => return Err(FetchError::NotFound(url.to_owned())),
            FetchReply::Refused => return Err(FetchError::Transport("connection refused".into())),
        };
        std::fs::write(dest, &bytes)?;
        if let Some(checksum) = checksum {
            checksum.verify_file(dest)?;
        }
        Ok(Downloaded {
            path: dest.to_path_buf(),
            bytes: bytes.len() as u64,
            attempts: 1,
        })
    }
}

#[derive(Default)]
struct RecordingApplier {
    applied: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    fail: bool,
    delay: Option<Duration>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingApplier {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn count(&self) -> usize {
        self.applied.lock().len()
    }
}

#[async_trait]
impl ArtifactApplier for RecordingApplier {
    async fn apply(
        &self,
        artifact: &Path,
        _manifest: &RemoteManifest,
        log: &RunLog,
    ) -> anyhow::Result<()> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("disk full");
        }
        log.log("recording applier invoked");
        let contents = std::fs::read(artifact)?;
        self.applied.lock().push((artifact.to_path_buf(), contents));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    fn ids(&self) -> Vec<String> {
        self.sent.lock().iter().map(|n| n.id.clone()).collect()
    }
}

#[async_trait]
impl UpdateNotifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().push(notification.clone());
        if self.fail {
            anyhow::bail!("supervisor unreachable");
        }
        Ok(())
    }
}

struct Harness {
    dir: TempDir,
    layout: RuntimeLayout,
    store: Arc<MemoryStateStore>,
    manifests: Arc<StaticManifests>,
    fetcher: Arc<ScriptedFetcher>,
    applier: Arc<RecordingApplier>,
}

impl Harness {
    fn new(manifest: ManifestReply, fetch: FetchReply) -> Self {
        Self::with_applier(manifest, fetch, RecordingApplier::default())
    }

    fn with_applier(manifest: ManifestReply, fetch: FetchReply, applier: RecordingApplier) -> Self {
        hct_logging::init();
        let dir = tempfile::tempdir().unwrap();
        let layout = RuntimeLayout::new(dir.path().join("data"));
        Self {
            dir,
            layout,
            store: Arc::new(MemoryStateStore::new()),
            manifests: StaticManifests::new(manifest),
            fetcher: ScriptedFetcher::new(fetch),
            applier: Arc::new(applier),
        }
    }

    fn seed(&self, component: Component, version: &str) {
        self.store
            .save_manifest(component, &local_manifest(version))
            .unwrap();
    }

    fn orchestrator(&self) -> UpdateOrchestrator {
        self.orchestrator_with_store(self.store.clone())
    }

    fn orchestrator_with_store(&self, store: Arc<dyn StateStore>) -> UpdateOrchestrator {
        let mut orchestrator = UpdateOrchestrator::new(
            self.layout.clone(),
            self.dir.path().join("client_token"),
            self.manifests.clone(),
            self.fetcher.clone(),
            store,
        );
        for component in Component::all() {
            orchestrator = orchestrator.with_component(
                component,
                ComponentBinding::new(self.applier.clone())
                    .with_base_url(format!("{BASE_URL}/{component}")),
            );
        }
        orchestrator
    }

    fn status(&self, component: Component) -> Option<StatusEntry> {
        self.store.load_status(component).unwrap()
    }

    fn local_version(&self, component: Component) -> Option<String> {
        self.store
            .load_manifest(component)
            .unwrap()
            .map(|manifest| manifest.version)
    }
}

fn local_manifest(version: &str) -> LocalManifest {
    LocalManifest {
        version: version.into(),
        download_url: "https://updates.test/old.zip".into(),
        checksum: None,
        updated_at: Utc::now(),
    }
}

fn token() -> UpdateRequest {
    UpdateRequest::default().with_token("secret")
}

fn release(version: &str) -> ManifestReply {
    ManifestReply::Body(json!({
        "version": version,
        "download_url": "https://updates.test/files/core.zip"
    }))
}

#[tokio::test]
async fn applies_new_version_and_records_everything() {
    let h = Harness::new(release("1.3.0"), FetchReply::Bytes(b"zip-bytes"));
    h.seed(Component::Core, "1.2.0");

    let response = h.orchestrator().run_update(Component::Core, &token()).await;

    assert_eq!(response.status, UpdateStatus::Ok);
    assert_eq!(response.exit_code, 0);
    assert_eq!(response.version.as_deref(), Some("1.3.0"));
    assert_eq!(h.local_version(Component::Core).as_deref(), Some("1.3.0"));
    assert_eq!(h.status(Component::Core).unwrap(), response.to_status_entry());
    assert!(response.finished_at >= response.started_at);

    let applied = h.applier.applied.lock().clone();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].1, b"zip-bytes");
    assert!(applied[0].0.ends_with("core.zip"));
    assert!(!applied[0].0.exists(), "download workspace is removed after the run");

    let backups = std::fs::read_dir(h.layout.backup_dir().join("core"))
        .unwrap()
        .count();
    assert_eq!(backups, 1);

    let log = std::fs::read_to_string(&response.log_path).unwrap();
    assert!(log.contains("Starting core update"));
    assert!(log.contains("recording applier invoked"));
    assert!(log.lines().all(|line| line.starts_with('[')));
    assert!(h.status(Component::Api).is_none());
}

#[tokio::test]
async fn missing_base_url_fails_without_network() {
    let h = Harness::new(release("1.0.0"), FetchReply::Bytes(b"x"));
    let orchestrator = UpdateOrchestrator::new(
        h.layout.clone(),
        h.dir.path().join("client_token"),
        h.manifests.clone(),
        h.fetcher.clone(),
        h.store.clone(),
    )
    .with_component(Component::Hcc, ComponentBinding::new(h.applier.clone()));

    for component in [Component::Hcc, Component::Api] {
        let response = orchestrator.run_update(component, &token()).await;
        assert_eq!(response.status, UpdateStatus::Error);
        assert_eq!(response.exit_code, 1);
        assert_eq!(response.version, None);
        assert!(response.message.contains("base URL not configured"));
    }
    assert_eq!(h.manifests.calls(), 0);
}

#[tokio::test]
async fn token_falls_back_to_credential_file() {
    let h = Harness::new(release("2.0.0"), FetchReply::Bytes(b"x"));
    h.seed(Component::Api, "2.0.0");

    let response = h
        .orchestrator()
        .run_update(Component::Api, &UpdateRequest::default())
        .await;
    assert_eq!(response.status, UpdateStatus::Error);
    assert_eq!(response.version, None);
    assert!(response.message.contains("token not provided"));
    assert_eq!(h.manifests.calls(), 0);

    std::fs::write(h.dir.path().join("client_token"), "  file-token\n").unwrap();
    let response = h
        .orchestrator()
        .run_update(Component::Api, &UpdateRequest::default().with_client_id("c-9"))
        .await;
    assert_eq!(response.status, UpdateStatus::NoUpdate);
    let queries = h.manifests.queries.lock().clone();
    assert_eq!(queries[0].token, "file-token");
    assert_eq!(queries[0].client_id.as_deref(), Some("c-9"));
}

#[tokio::test]
async fn manifest_not_found_is_no_update_with_local_version() {
    let h = Harness::new(ManifestReply::NotFound, FetchReply::Bytes(b"x"));
    h.seed(Component::Core, "1.2.0");

    let response = h.orchestrator().run_update(Component::Core, &token()).await;

    assert_eq!(response.status, UpdateStatus::NoUpdate);
    assert_eq!(response.exit_code, 0);
    assert_eq!(response.version.as_deref(), Some("1.2.0"));
    assert!(response.message.contains("404"));
    assert_eq!(h.fetcher.calls(), 0);
}

#[tokio::test]
async fn manifest_failure_is_error_with_local_version() {
    let h = Harness::new(ManifestReply::Status(500), FetchReply::Bytes(b"x"));
    h.seed(Component::Core, "1.2.0");

    let response = h.orchestrator().run_update(Component::Core, &token()).await;

    assert_eq!(response.status, UpdateStatus::Error);
    assert_eq!(response.version.as_deref(), Some("1.2.0"));
    assert!(response.message.contains("HTTP 500"));
}

#[tokio::test]
async fn missing_version_alias_stops_before_download() {
    let h = Harness::new(
        ManifestReply::Body(json!({"release": "1.3.0", "url": "https://x/p.zip"})),
        FetchReply::Bytes(b"x"),
    );

    let response = h.orchestrator().run_update(Component::Core, &token()).await;

    assert_eq!(response.status, UpdateStatus::Error);
    assert_eq!(response.version, None);
    assert!(response.message.contains("no version information"));
    assert_eq!(h.fetcher.calls(), 0);
}

#[tokio::test]
async fn missing_download_url_keeps_manifest() {
    let h = Harness::new(
        ManifestReply::Body(json!({"client_version": "1.3.0"})),
        FetchReply::Bytes(b"x"),
    );
    h.seed(Component::Hcc, "1.2.0");

    let response = h.orchestrator().run_update(Component::Hcc, &token()).await;

    assert_eq!(response.status, UpdateStatus::Error);
    assert_eq!(response.exit_code, 1);
    assert_eq!(response.version.as_deref(), Some("1.2.0"));
    assert!(response.message.contains("no download URL"));
    assert_eq!(h.local_version(Component::Hcc).as_deref(), Some("1.2.0"));
}

#[tokio::test]
async fn equal_versions_skip_unless_forced() {
    let h = Harness::new(release("1.2.0"), FetchReply::Bytes(b"same"));
    h.seed(Component::Core, "1.2.0");
    let orchestrator = h.orchestrator();

    let skipped = orchestrator.run_update(Component::Core, &token()).await;
    assert_eq!(skipped.status, UpdateStatus::NoUpdate);
    assert_eq!(skipped.version.as_deref(), Some("1.2.0"));
    assert_eq!(h.fetcher.calls(), 0);

    let forced = orchestrator
        .run_update(Component::Core, &UpdateRequest::forced().with_token("secret"))
        .await;
    assert_eq!(forced.status, UpdateStatus::Ok);
    assert_eq!(h.fetcher.calls(), 1);
    assert_eq!(h.applier.count(), 1);
}

#[tokio::test]
async fn downgrades_are_applied() {
    let h = Harness::new(release("1.0.0"), FetchReply::Bytes(b"old"));
    h.seed(Component::Core, "2.0.0");

    let response = h.orchestrator().run_update(Component::Core, &token()).await;

    assert_eq!(response.status, UpdateStatus::Ok);
    assert_eq!(h.local_version(Component::Core).as_deref(), Some("1.0.0"));
}

#[tokio::test]
async fn artifact_not_found_is_no_update() {
    let h = Harness::new(release("1.3.0"), FetchReply::NotFound);
    h.seed(Component::Core, "1.2.0");

    let response = h.orchestrator().run_update(Component::Core, &token()).await;

    assert_eq!(response.status, UpdateStatus::NoUpdate);
    assert_eq!(response.version.as_deref(), Some("1.2.0"));
    assert_eq!(h.applier.count(), 0);
}

#[tokio::test]
async fn download_failure_leaves_no_trace() {
    let h = Harness::new(release("1.3.0"), FetchReply::Refused);
    h.seed(Component::Core, "1.2.0");

    let response = h.orchestrator().run_update(Component::Core, &token()).await;

    assert_eq!(response.status, UpdateStatus::Error);
    assert_eq!(response.version.as_deref(), Some("1.2.0"));
    assert!(response.message.starts_with("download failed"));
    assert_eq!(h.local_version(Component::Core).as_deref(), Some("1.2.0"));
    let backups = std::fs::read_dir(h.layout.backup_dir().join("core"))
        .unwrap()
        .count();
    assert_eq!(backups, 0);
}

#[tokio::test]
async fn invalid_declared_checksum_skips_download() {
    let h = Harness::new(
        ManifestReply::Body(json!({
            "version": "1.3.0",
            "download_url": "https://x/p.zip",
            "checksum": "crc32:deadbeef"
        })),
        FetchReply::Bytes(b"x"),
    );

    let response = h.orchestrator().run_update(Component::Core, &token()).await;

    assert_eq!(response.status, UpdateStatus::Error);
    assert!(response.message.contains("unsupported checksum algorithm 'crc32'"));
    assert_eq!(h.fetcher.calls(), 0);
}

#[tokio::test]
async fn checksum_is_recorded_in_local_manifest() {
    let digest = hct_testharness::sha256_hex(b"verified");
    let h = Harness::new(
        ManifestReply::Body(json!({
            "version": "1.3.0",
            "download_url": "https://x/p.zip",
            "checksum": format!("sha256:{digest}")
        })),
        FetchReply::Bytes(b"verified"),
    );

    let response = h.orchestrator().run_update(Component::Api, &token()).await;

    assert_eq!(response.status, UpdateStatus::Ok);
    let local = h.store.load_manifest(Component::Api).unwrap().unwrap();
    assert_eq!(local.checksum, Some(format!("sha256:{digest}")));
    assert_eq!(local.download_url, "https://x/p.zip");
    assert_eq!(local.updated_at, response.started_at);
}

#[tokio::test]
async fn md5_declared_checksum_is_verified_and_applied() {
    let h = Harness::new(
        ManifestReply::Body(json!({
            "version": "1.3.0",
            "download_url": "https://x/p.zip",
            "checksum": "MD5:723AA82A83C278D5E7E7BE9B109B406A"
        })),
        FetchReply::Bytes(b"verified"),
    );

    let response = h.orchestrator().run_update(Component::Hcc, &token()).await;

    assert_eq!(response.status, UpdateStatus::Ok);
    assert_eq!(h.applier.count(), 1);
    let log = std::fs::read_to_string(&response.log_path).unwrap();
    assert!(log.contains("Checksum verified (md5)"));
}

#[tokio::test]
async fn apply_failure_keeps_manifest_and_backup() {
    let h = Harness::with_applier(
        release("1.3.0"),
        FetchReply::Bytes(b"x"),
        RecordingApplier::failing(),
    );
    h.seed(Component::Core, "1.2.0");

    let response = h.orchestrator().run_update(Component::Core, &token()).await;

    assert_eq!(response.status, UpdateStatus::Error);
    assert_eq!(response.version.as_deref(), Some("1.2.0"));
    assert!(response.message.contains("disk full"));
    assert_eq!(h.local_version(Component::Core).as_deref(), Some("1.2.0"));
    let backups = std::fs::read_dir(h.layout.backup_dir().join("core"))
        .unwrap()
        .count();
    assert_eq!(backups, 1);
}

#[tokio::test]
async fn backup_failure_aborts_before_apply() {
    let h = Harness::new(release("1.3.0"), FetchReply::Bytes(b"x"));
    h.seed(Component::Core, "1.2.0");
    std::fs::create_dir_all(h.layout.backup_dir()).unwrap();
    std::fs::write(h.layout.backup_dir().join("core"), b"not a directory").unwrap();

    let response = h.orchestrator().run_update(Component::Core, &token()).await;

    assert_eq!(response.status, UpdateStatus::Error);
    assert_eq!(response.exit_code, 1);
    assert!(response.message.starts_with("backup failed"));
    assert_eq!(h.applier.count(), 0);
    assert_eq!(h.local_version(Component::Core).as_deref(), Some("1.2.0"));
}

struct BrokenStatusStore {
    inner: MemoryStateStore,
}

impl StateStore for BrokenStatusStore {
    fn load_manifest(&self, component: Component) -> hct_persistence::Result<Option<LocalManifest>> {
        self.inner.load_manifest(component)
    }

    fn save_manifest(&self, component: Component, manifest: &LocalManifest) -> hct_persistence::Result<()> {
        self.inner.save_manifest(component, manifest)
    }

    fn record_status(&self, _entry: &StatusEntry) -> hct_persistence::Result<()> {
        Err(PersistenceError::Io(std::io::Error::other("read-only filesystem")))
    }

    fn load_status(&self, component: Component) -> hct_persistence::Result<Option<StatusEntry>> {
        self.inner.load_status(component)
    }
}

#[tokio::test]
async fn status_write_failure_does_not_escape() {
    let h = Harness::new(release("1.3.0"), FetchReply::Bytes(b"x"));
    let store = Arc::new(BrokenStatusStore {
        inner: MemoryStateStore::new(),
    });

    let response = h
        .orchestrator_with_store(store.clone())
        .run_update(Component::Core, &token())
        .await;

    assert_eq!(response.status, UpdateStatus::Ok);
    assert_eq!(
        store.load_manifest(Component::Core).unwrap().map(|m| m.version).as_deref(),
        Some("1.3.0")
    );
    let log = std::fs::read_to_string(&response.log_path).unwrap();
    assert!(log.contains("failed to record status"));
}

#[tokio::test]
async fn same_component_runs_are_serialised() {
    let h = Harness::with_applier(
        release("1.3.0"),
        FetchReply::Bytes(b"x"),
        RecordingApplier::slow(Duration::from_millis(100)),
    );
    let orchestrator = h.orchestrator();
    let forced = UpdateRequest::forced().with_token("secret");

    let (a, b) = tokio::join!(
        orchestrator.run_update(Component::Core, &forced),
        orchestrator.run_update(Component::Core, &forced),
    );
    assert_eq!(a.status, UpdateStatus::Ok);
    assert_eq!(b.status, UpdateStatus::Ok);
    assert_eq!(h.applier.peak.load(Ordering::SeqCst), 1);

    let (c, d) = tokio::join!(
        orchestrator.run_update(Component::Api, &forced),
        orchestrator.run_update(Component::Hcc, &forced),
    );
    assert!(c.is_success() && d.is_success());
    assert_eq!(h.applier.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn back_to_back_runs_keep_their_own_backup_and_log() {
    let h = Harness::new(release("1.3.0"), FetchReply::Numbered);
    let orchestrator = h.orchestrator();
    let forced = UpdateRequest::forced().with_token("secret");

    let first = orchestrator.run_update(Component::Core, &forced).await;
    let second = orchestrator.run_update(Component::Core, &forced).await;

    assert!(first.is_success() && second.is_success());
    assert!(second.started_at > first.started_at);
    assert_ne!(first.log_path, second.log_path);

    let backups = BackupStore::new(h.layout.clone())
        .list(Component::Core)
        .await
        .unwrap();
    let contents: Vec<Vec<u8>> = backups.iter().map(|path| std::fs::read(path).unwrap()).collect();
    assert_eq!(contents, vec![b"payload-1".to_vec(), b"payload-2".to_vec()]);

    for log_path in [&first.log_path, &second.log_path] {
        let log = std::fs::read_to_string(log_path).unwrap();
        assert_eq!(log.matches("Starting core update").count(), 1);
    }
    assert_eq!(
        h.layout.run_logs(Component::Core).unwrap(),
        vec![PathBuf::from(&second.log_path), PathBuf::from(&first.log_path)]
    );
}

#[tokio::test]
async fn check_reports_without_recording() {
    let h = Harness::new(release("1.3.0"), FetchReply::Bytes(b"x"));
    h.seed(Component::Core, "1.2.0");
    let orchestrator = h.orchestrator();

    let check = orchestrator.check(Component::Core, &token()).await.unwrap();
    assert_eq!(check.local_version.as_deref(), Some("1.2.0"));
    assert_eq!(check.remote_version.as_deref(), Some("1.3.0"));
    assert!(check.update_available());
    assert!(h.status(Component::Core).is_none());
    assert_eq!(h.fetcher.calls(), 0);

    let err = orchestrator
        .check(Component::Core, &UpdateRequest::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("token not provided"));
}

#[tokio::test]
async fn scheduler_checks_or_updates_every_component() {
    let h = Harness::new(release("1.3.0"), FetchReply::Bytes(b"x"));
    std::fs::write(h.dir.path().join("client_token"), "scheduled").unwrap();
    let registry = new_registry();
    let metrics = UpdateMetrics::new(registry).unwrap();
    let orchestrator = Arc::new(h.orchestrator().with_metrics(metrics.clone()));

    let check_only = UpdateScheduler::new(orchestrator.clone(), Duration::from_secs(3600), false);
    let outcomes = check_only.run_once().await;
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes
        .iter()
        .all(|(_, outcome)| matches!(outcome, PassOutcome::Checked(Ok(check)) if check.update_available())));
    assert!(h.status(Component::Core).is_none());

    let auto = UpdateScheduler::new(orchestrator, Duration::from_secs(3600), true);
    let outcomes = auto.run_once().await;
    let components: Vec<_> = outcomes.iter().map(|(component, _)| *component).collect();
    assert_eq!(components, vec![Component::Api, Component::Core, Component::Hcc]);
    for component in Component::all() {
        assert_eq!(h.status(component).unwrap().status, UpdateStatus::Ok);
        assert_eq!(metrics.runs(component.as_str(), "ok"), 1);
    }
}

#[tokio::test]
async fn scheduler_stops_on_shutdown_signal() {
    let h = Harness::new(ManifestReply::NotFound, FetchReply::Bytes(b"x"));
    let scheduler = UpdateScheduler::new(Arc::new(h.orchestrator()), Duration::from_secs(3600), true);
    let (tx, rx) = tokio::sync::watch::channel(false);

    let handle = tokio::spawn(async move { scheduler.run(rx).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.manifests.calls(), 3);
}

#[tokio::test]
async fn check_pass_announces_pending_updates() {
    let h = Harness::new(release("1.3.0"), FetchReply::Bytes(b"x"));
    std::fs::write(h.dir.path().join("client_token"), "scheduled").unwrap();
    h.seed(Component::Core, "1.2.0");
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = UpdateScheduler::new(Arc::new(h.orchestrator()), Duration::from_secs(3600), false)
        .with_notifier(notifier.clone());

    scheduler.run_once().await;
    assert_eq!(notifier.ids(), vec!["homecore_updates_available"]);
    let message = notifier.sent.lock()[0].message.clone();
    assert!(message.starts_with("Found 3 update(s)"));
    assert!(message.contains("- core: 1.2.0 → 1.3.0"));
    assert!(message.contains("- api: none → 1.3.0"));
}

#[tokio::test]
async fn update_pass_announces_applied_and_failed_components() {
    let h = Harness::with_applier(
        release("1.3.0"),
        FetchReply::Bytes(b"x"),
        RecordingApplier::failing(),
    );
    std::fs::write(h.dir.path().join("client_token"), "scheduled").unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = UpdateScheduler::new(Arc::new(h.orchestrator()), Duration::from_secs(3600), true)
        .with_notifier(notifier.clone());

    // Every apply fails, so there is nothing to announce.
    scheduler.run_once().await;
    assert!(notifier.ids().is_empty());

    let h = Harness::new(release("1.3.0"), FetchReply::Bytes(b"x"));
    std::fs::write(h.dir.path().join("client_token"), "scheduled").unwrap();
    let scheduler = UpdateScheduler::new(Arc::new(h.orchestrator()), Duration::from_secs(3600), true)
        .with_notifier(notifier.clone());
    scheduler.run_once().await;
    assert_eq!(notifier.ids(), vec!["homecore_updates_applied"]);
    let message = notifier.sent.lock()[0].message.clone();
    assert!(message.starts_with("3 update(s) applied successfully"));
    assert!(!message.contains("Failed:"));
}

#[tokio::test]
async fn quiet_pass_sends_nothing_and_delivery_errors_are_swallowed() {
    let h = Harness::new(ManifestReply::NotFound, FetchReply::Bytes(b"x"));
    std::fs::write(h.dir.path().join("client_token"), "scheduled").unwrap();
    let quiet = Arc::new(RecordingNotifier::default());
    let scheduler = UpdateScheduler::new(Arc::new(h.orchestrator()), Duration::from_secs(3600), true)
        .with_notifier(quiet.clone());
    let outcomes = scheduler.run_once().await;
    assert_eq!(outcomes.len(), 3);
    assert!(quiet.ids().is_empty());

    let h = Harness::new(release("1.3.0"), FetchReply::Bytes(b"x"));
    std::fs::write(h.dir.path().join("client_token"), "scheduled").unwrap();
    let failing = Arc::new(RecordingNotifier {
        fail: true,
        ..RecordingNotifier::default()
    });
    let scheduler = UpdateScheduler::new(Arc::new(h.orchestrator()), Duration::from_secs(3600), true)
        .with_notifier(failing.clone());
    scheduler.run_once().await;
    assert_eq!(failing.ids(), vec!["homecore_updates_applied"]);
    assert_eq!(h.status(Component::Core).unwrap().status, UpdateStatus::Ok);
}

#[tokio::test]
async fn scheduler_announces_start() {
    let h = Harness::new(ManifestReply::NotFound, FetchReply::Bytes(b"x"));
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = UpdateScheduler::new(Arc::new(h.orchestrator()), Duration::from_secs(1800), false)
        .with_notifier(notifier.clone());
    let (_tx, rx) = tokio::sync::watch::channel(true);

    scheduler.run(rx).await;
    assert_eq!(notifier.ids(), vec!["homecore_tools_started"]);
    assert!(notifier.sent.lock()[0].message.contains("every 30 minutes"));
    assert_eq!(h.manifests.calls(), 0);
}
