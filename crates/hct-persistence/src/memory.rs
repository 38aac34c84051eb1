//! ---
//! hct_section: "03-persistence-logging"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Persistence abstractions and storage bindings."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::collections::HashMap;

use hct_common::Component;
use parking_lot::RwLock;

use crate::records::{LocalManifest, StatusEntry};
use crate::{Result, StateStore};

/// Volatile [`StateStore`] used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    manifests: RwLock<HashMap<Component, LocalManifest>>,
    statuses: RwLock<HashMap<Component, StatusEntry>>,
}

impl MemoryStateStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a local manifest, as if a previous run had applied it.
    pub fn with_manifest(self, component: Component, manifest: LocalManifest) -> Self {
        self.manifests.write().insert(component, manifest);
        self
    }
}

impl StateStore for MemoryStateStore {
    fn load_manifest(&self, component: Component) -> Result<Option<LocalManifest>> {
        Ok(self.manifests.read().get(&component).cloned())
    }

    fn save_manifest(&self, component: Component, manifest: &LocalManifest) -> Result<()> {
        self.manifests.write().insert(component, manifest.clone());
        Ok(())
    }

    fn record_status(&self, entry: &StatusEntry) -> Result<()> {
        self.statuses.write().insert(entry.component, entry.clone());
        Ok(())
    }

    fn load_status(&self, component: Component) -> Result<Option<StatusEntry>> {
        Ok(self.statuses.read().get(&component).cloned())
    }
}
