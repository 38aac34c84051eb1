//! ---
//! hct_section: "14-versioning"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Version metadata and update decision helpers."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
//! Version strings are compared for plain equality. There is no ordering:
//! a remote `1.0.0` replaces a local `2.0.0` just like an upgrade would.

use tracing::debug;

/// Result of comparing the recorded version with the remote one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    /// Versions match and the caller did not force; nothing to apply.
    Skip,
    /// Versions differ (or no version was recorded yet).
    Apply,
    /// Versions match but the caller asked to re-apply anyway.
    ForceApply,
}

impl UpdateDecision {
    /// Whether the artifact must be downloaded and applied.
    #[must_use]
    pub fn requires_update(&self) -> bool {
        !matches!(self, UpdateDecision::Skip)
    }
}

/// Decide what to do with a component given its recorded and remote versions.
///
/// A missing local version never equals a remote version, so a first install
/// always resolves to [`UpdateDecision::Apply`].
#[must_use]
pub fn decide(local: Option<&str>, remote: &str, force: bool) -> UpdateDecision {
    let decision = if local != Some(remote) {
        UpdateDecision::Apply
    } else if force {
        UpdateDecision::ForceApply
    } else {
        UpdateDecision::Skip
    };
    debug!(local = local.unwrap_or("none"), remote, force, ?decision, "version decision");
    decision
}

/// `true` when `force` is set or the two versions differ.
#[must_use]
pub fn should_update(local: Option<&str>, remote: &str, force: bool) -> bool {
    decide(local, remote, force).requires_update()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_versions_skip_unless_forced() {
        assert_eq!(decide(Some("1.2.0"), "1.2.0", false), UpdateDecision::Skip);
        assert_eq!(decide(Some("1.2.0"), "1.2.0", true), UpdateDecision::ForceApply);
        assert!(!should_update(Some("1.2.0"), "1.2.0", false));
        assert!(should_update(Some("1.2.0"), "1.2.0", true));
    }

    #[test]
    fn any_difference_applies_including_downgrades() {
        assert_eq!(decide(Some("1.2.0"), "1.3.0", false), UpdateDecision::Apply);
        assert_eq!(decide(Some("2.0.0"), "1.0.0", false), UpdateDecision::Apply);
        assert_eq!(decide(Some("1.2.0"), "1.2.0 ", false), UpdateDecision::Apply);
    }

    #[test]
    fn missing_local_version_always_applies() {
        assert_eq!(decide(None, "0.0.1", false), UpdateDecision::Apply);
        assert_eq!(decide(None, "0.0.1", true), UpdateDecision::Apply);
    }
}
