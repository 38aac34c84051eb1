//! ---
//! hct_section: "03-persistence-logging"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Persistence abstractions and storage bindings."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use hct_common::{Component, RuntimeLayout};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::records::{LocalManifest, StatusEntry};
use crate::{PersistenceError, Result, StateStore};

/// JSON-file backed [`StateStore`].
///
/// Local manifests live in `state/<component>.json`; status entries share one
/// `status.json` document keyed by component. The status document is rewritten
/// with a read-modify-write cycle serialised by an in-process lock, and every
/// write lands through a temporary file renamed over the target.
#[derive(Debug)]
pub struct FileStateStore {
    layout: RuntimeLayout,
    status_lock: Mutex<()>,
}

impl FileStateStore {
    /// Store rooted at `layout`. Directories are created on first write.
    pub fn new(layout: RuntimeLayout) -> Self {
        Self {
            layout,
            status_lock: Mutex::new(()),
        }
    }

    /// Runtime layout backing this store.
    pub fn layout(&self) -> &RuntimeLayout {
        &self.layout
    }

    fn read_status_document(&self) -> Result<Map<String, Value>> {
        let path = self.layout.status_file();
        match read_json::<Value>(&path)? {
            None => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map),
            Some(_) => {
                warn!(path = %path.display(), "status document is not an object; starting fresh");
                Ok(Map::new())
            }
        }
    }
}

impl StateStore for FileStateStore {
    fn load_manifest(&self, component: Component) -> Result<Option<LocalManifest>> {
        read_json(&self.layout.manifest_file(component))
    }

    fn save_manifest(&self, component: Component, manifest: &LocalManifest) -> Result<()> {
        let path = self.layout.manifest_file(component);
        write_json_atomic(&path, manifest)?;
        debug!(%component, version = %manifest.version, path = %path.display(), "local manifest saved");
        Ok(())
    }

    fn record_status(&self, entry: &StatusEntry) -> Result<()> {
        let _guard = self.status_lock.lock();
        let mut document = self.read_status_document()?;
        document.insert(entry.component.to_string(), serde_json::to_value(entry)?);
        write_json_atomic(&self.layout.status_file(), &Value::Object(document))?;
        debug!(component = %entry.component, status = %entry.status, "status entry recorded");
        Ok(())
    }

    fn load_status(&self, component: Component) -> Result<Option<StatusEntry>> {
        let document = {
            let _guard = self.status_lock.lock();
            self.read_status_document()?
        };
        let Some(raw) = document.get(component.as_str()) else {
            return Ok(None);
        };
        match serde_json::from_value::<StatusEntry>(raw.clone()) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                warn!(%component, error = %err, "ignoring malformed status entry");
                Ok(None)
            }
        }
    }
}

/// Read a JSON document. Missing files and undecodable content both read as `None`.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(PersistenceError::Io(err)),
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "discarding undecodable state document");
            Ok(None)
        }
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| PersistenceError::Io(err.error))?;
    Ok(())
}
