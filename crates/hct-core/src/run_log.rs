//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Update engine: manifest retrieval, artifact transfer and orchestration."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use hct_common::time::log_timestamp;
use hct_common::Component;
use parking_lot::Mutex;
use tracing::{error, info, warn};

/// Append-only, per-run log file.
///
/// Every line is `[<RFC 3339 timestamp>] <message>` and is mirrored to the
/// process tracing output. A log file that cannot be opened degrades to
/// tracing only; it never fails the run. Clones share the same file.
#[derive(Debug, Clone)]
pub struct RunLog {
    inner: Arc<RunLogInner>,
}

#[derive(Debug)]
struct RunLogInner {
    path: PathBuf,
    component: Component,
    file: Mutex<Option<File>>,
}

impl RunLog {
    pub fn open(path: impl Into<PathBuf>, component: Component) -> Self {
        let path = path.into();
        let file = open_append(&path)
            .map_err(|err| {
                warn!(%component, path = %path.display(), error = %err, "run log unavailable; logging to tracing only");
            })
            .ok();
        Self {
            inner: Arc::new(RunLogInner {
                path,
                component,
                file: Mutex::new(file),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!(component = %self.inner.component, "{message}");
        self.append(message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        error!(component = %self.inner.component, "{message}");
        self.append(message);
    }

    fn append(&self, message: &str) {
        let mut guard = self.inner.file.lock();
        let Some(file) = guard.as_mut() else {
            return;
        };
        let line = format!("[{}] {message}\n", log_timestamp(Utc::now()));
        if let Err(err) = file.write_all(line.as_bytes()).and_then(|()| file.flush()) {
            warn!(path = %self.inner.path.display(), error = %err, "run log write failed; detaching file");
            *guard = None;
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
