//! ---
//! hct_section: "15-testing-qa-runbook"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Loopback fixtures shared by unit and integration tests."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
//! Test fixtures for the update engine: a scripted loopback HTTP server
//! standing in for the manifest and artifact endpoints, plus small helpers to
//! build archives and compare installed trees.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::net::TcpListener;
use std::path::Path;

use anyhow::Result;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub mod server;

pub use server::{RecordedRequest, StubResponse, StubServer, StubServerBuilder};

/// In-memory zip archive holding `entries` as `(path, contents)` pairs.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, contents) in entries {
        writer.start_file(*name, options)?;
        writer.write_all(contents)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// URL on a loopback port that was just released, so connections are refused.
pub fn closed_port_url(path: &str) -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}{path}"))
}

/// Relative path to contents of every file below `root`. Unreadable entries are skipped.
pub fn tree_snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?;
            let contents = std::fs::read(entry.path()).ok()?;
            Some((relative.to_string_lossy().replace('\\', "/"), contents))
        })
        .collect()
}
