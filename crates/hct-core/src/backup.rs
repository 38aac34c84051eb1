//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Update engine: manifest retrieval, artifact transfer and orchestration."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hct_common::{Component, RuntimeLayout};
use tokio::fs;
use tracing::debug;

/// Copies of downloaded artifacts, kept under `backups/<component>/` for manual recovery.
#[derive(Debug, Clone)]
pub struct BackupStore {
    layout: RuntimeLayout,
}

impl BackupStore {
    pub fn new(layout: RuntimeLayout) -> Self {
        Self { layout }
    }

    /// Copy `artifact` to `backups/<component>/<stamp>_<filename>`.
    pub async fn store(
        &self,
        component: Component,
        started_at: DateTime<Utc>,
        filename: &str,
        artifact: &Path,
    ) -> io::Result<PathBuf> {
        let target = self.layout.backup_path(component, started_at, filename);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = fs::copy(artifact, &target).await?;
        debug!(%component, path = %target.display(), bytes, "artifact backed up");
        Ok(target)
    }

    /// Backups of a component, oldest first.
    pub async fn list(&self, component: Component) -> io::Result<Vec<PathBuf>> {
        let dir = self.layout.backup_dir().join(component.as_str());
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                backups.push(entry.path());
            }
        }
        backups.sort();
        Ok(backups)
    }
}
