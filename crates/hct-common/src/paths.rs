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
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::component::Component;
use crate::time::run_stamp;

/// On-disk layout of the agent's runtime data directory.
///
/// ```text
/// <root>/logs/<stamp>_<component>_update.log
/// <root>/backups/<component>/<stamp>_<filename>
/// <root>/state/<component>.json
/// <root>/status.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    root: PathBuf,
}

impl RuntimeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn status_file(&self) -> PathBuf {
        self.root.join("status.json")
    }

    /// Local manifest record of a component.
    pub fn manifest_file(&self, component: Component) -> PathBuf {
        self.state_dir().join(format!("{component}.json"))
    }

    /// Per-run log file, keyed by start timestamp and component.
    pub fn run_log_path(&self, component: Component, started_at: DateTime<Utc>) -> PathBuf {
        self.log_dir()
            .join(format!("{}_{component}_update.log", run_stamp(started_at)))
    }

    /// Backup location of an artifact downloaded by the run started at `started_at`.
    pub fn backup_path(
        &self,
        component: Component,
        started_at: DateTime<Utc>,
        filename: &str,
    ) -> PathBuf {
        let sanitized = filename.replace(['/', '\\'], "_");
        self.backup_dir()
            .join(component.as_str())
            .join(format!("{}_{sanitized}", run_stamp(started_at)))
    }

    /// Run logs of `component`, newest first. A missing log directory lists as empty.
    pub fn run_logs(&self, component: Component) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(self.log_dir()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let marker = format!("_{component}_");
        let mut logs = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(".log") && name.contains(&marker) && entry.file_type()?.is_file() {
                logs.push(entry.path());
            }
        }
        logs.sort_by(|a, b| b.cmp(a));
        Ok(logs)
    }

    /// Create the log, backup and state directories, plus one backup namespace per component.
    pub fn ensure_directories(&self) -> io::Result<()> {
        for dir in [self.log_dir(), self.backup_dir(), self.state_dir()] {
            fs::create_dir_all(&dir)?;
        }
        for component in Component::all() {
            fs::create_dir_all(self.backup_dir().join(component.as_str()))?;
        }
        debug!(root = %self.root.display(), "runtime directories ready");
        Ok(())
    }
}
