//! ---
//! hct_section: "14-versioning"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Version metadata and update decision helpers."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use serde::Serialize;

/// Build metadata of the running agent.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    /// Workspace semantic version.
    pub semver: String,
    /// Git commit hash injected through `HCT_GIT_SHA` at build time.
    pub git_sha: String,
    /// Cargo profile used during compilation.
    pub profile: String,
}

impl VersionInfo {
    /// Construct a new [`VersionInfo`] instance using compile-time metadata.
    #[must_use]
    pub fn current() -> Self {
        Self {
            semver: env!("CARGO_PKG_VERSION").to_owned(),
            git_sha: option_env!("HCT_GIT_SHA").unwrap_or("UNKNOWN").to_owned(),
            profile: if cfg!(debug_assertions) {
                "debug".to_owned()
            } else {
                "release".to_owned()
            },
        }
    }

    /// Returns a concise CLI string combining semantic version and git hash.
    #[must_use]
    pub fn cli_string(&self) -> String {
        format!("{} ({})", self.semver, self.git_sha)
    }

    /// Human readable banner used in logging surfaces.
    #[must_use]
    pub fn banner(&self) -> String {
        format!("HomeCore Tools v{} (git {})", self.semver, self.git_sha)
    }

    /// `User-Agent` value sent with manifest and artifact requests.
    #[must_use]
    pub fn user_agent(&self) -> String {
        format!("HomeCore-Tools/{}", self.semver)
    }

    /// Extended string containing build metadata suitable for `--version` flags.
    #[must_use]
    pub fn extended(&self) -> String {
        format!(
            "{banner}\nProfile: {profile}",
            banner = self.banner(),
            profile = self.profile
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_contains_semver() {
        let info = VersionInfo::current();
        let extended = info.extended();
        assert!(extended.contains(&info.semver));
        assert!(info.user_agent().starts_with("HomeCore-Tools/"));
    }
}
