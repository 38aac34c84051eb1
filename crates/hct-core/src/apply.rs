//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Update engine: manifest retrieval, artifact transfer and orchestration."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::manifest::RemoteManifest;
use crate::run_log::RunLog;

/// Component-specific installation of a downloaded, verified artifact.
///
/// Implementations must tolerate being invoked again with the same artifact;
/// forced re-applies rely on it.
#[async_trait]
pub trait ArtifactApplier: Send + Sync {
    async fn apply(&self, artifact: &Path, manifest: &RemoteManifest, log: &RunLog) -> Result<()>;
}

/// Installs artifacts into a directory.
///
/// `.zip` archives are extracted and their tree copied over the target;
/// existing files are overwritten and files absent from the archive are
/// left in place. Any other artifact is copied as a single file.
#[derive(Debug, Clone)]
pub struct DirectoryApplier {
    target_dir: PathBuf,
    strip_single_root: bool,
}

impl DirectoryApplier {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            strip_single_root: true,
        }
    }

    /// When the archive holds a single top-level directory, install its contents rather than the directory.
    pub fn strip_single_root(mut self, strip: bool) -> Self {
        self.strip_single_root = strip;
        self
    }
}

#[async_trait]
impl ArtifactApplier for DirectoryApplier {
    async fn apply(&self, artifact: &Path, _manifest: &RemoteManifest, log: &RunLog) -> Result<()> {
        let artifact = artifact.to_path_buf();
        let target = self.target_dir.clone();
        let strip = self.strip_single_root;
        let log = log.clone();
        tokio::task::spawn_blocking(move || install(&artifact, &target, strip, &log))
            .await
            .map_err(|err| anyhow!("apply task failed: {err}"))?
    }
}

fn install(artifact: &Path, target: &Path, strip_single_root: bool, log: &RunLog) -> Result<()> {
    fs::create_dir_all(target)
        .with_context(|| format!("unable to create {}", target.display()))?;

    if !is_zip(artifact) {
        let name = artifact
            .file_name()
            .ok_or_else(|| anyhow!("artifact path {} has no file name", artifact.display()))?;
        let dest = target.join(name);
        fs::copy(artifact, &dest)
            .with_context(|| format!("unable to copy artifact to {}", dest.display()))?;
        log.log(format!("Copied artifact to {}", dest.display()));
        return Ok(());
    }

    let staging = tempfile::Builder::new()
        .prefix("hct-unpack-")
        .tempdir()
        .context("unable to create staging directory")?;
    let entries = extract_zip(artifact, staging.path())?;
    log.log(format!("Extracted {entries} archive entries"));

    let source = if strip_single_root {
        single_root(staging.path())?.unwrap_or_else(|| staging.path().to_path_buf())
    } else {
        staging.path().to_path_buf()
    };
    let copied = copy_tree(&source, target)?;
    log.log(format!("Installed {copied} files into {}", target.display()));
    Ok(())
}

fn is_zip(artifact: &Path) -> bool {
    artifact
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Extract every entry below `dest`, refusing entries that would escape it.
fn extract_zip(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive_path)
        .with_context(|| format!("unable to open {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file).context("artifact is not a valid zip archive")?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            bail!("archive entry '{}' escapes the install directory", entry.name());
        };
        let out = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = File::create(&out)?;
        io::copy(&mut entry, &mut writer)
            .with_context(|| format!("unable to extract '{}'", entry.name()))?;
    }
    Ok(archive.len())
}

fn single_root(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    if entries.len() != 1 {
        return Ok(None);
    }
    let entry = entries.remove(0);
    Ok(entry.file_type()?.is_dir().then(|| entry.path()))
}

fn copy_tree(source: &Path, target: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(source)?;
        let dest = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)
                .with_context(|| format!("unable to install {}", dest.display()))?;
            copied += 1;
        }
    }
    Ok(copied)
}
