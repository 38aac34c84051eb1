//! ---
//! hct_section: "14-versioning"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Version metadata and update decision helpers."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Build metadata for the agent binary and the rule deciding whether a
//! component's recorded version must be replaced by the remote one.

pub mod decision;
pub mod version;

pub use decision::{decide, should_update, UpdateDecision};
pub use version::VersionInfo;
