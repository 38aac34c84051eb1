//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Update engine: manifest retrieval, artifact transfer and orchestration."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, warn};

/// Resolve the manifest token: a non-blank request token wins, otherwise the
/// trimmed contents of `token_path`. Blank values count as missing.
pub fn resolve_token(request_token: Option<&str>, token_path: &Path) -> Option<String> {
    if let Some(token) = request_token.map(str::trim).filter(|token| !token.is_empty()) {
        return Some(token.to_owned());
    }

    match fs::read_to_string(token_path) {
        Ok(contents) => {
            let token = contents.trim();
            if token.is_empty() {
                debug!(path = %token_path.display(), "credential file is empty");
                None
            } else {
                Some(token.to_owned())
            }
        }
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            warn!(path = %token_path.display(), error = %err, "unable to read credential file");
            None
        }
    }
}
