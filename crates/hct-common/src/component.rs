//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Shared primitives and utilities for the update agent."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Independently versioned subsystem managed by the updater.
///
/// Each component owns its own manifest slot, backup namespace, status entry
/// and run logs. Nothing is shared between components.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Component {
    Api,
    Core,
    Hcc,
}

impl Component {
    /// All known components in declaration order.
    pub fn all() -> impl Iterator<Item = Component> {
        Component::iter()
    }

    pub fn as_str(&self) -> &str {
        self.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn names_are_lowercase() {
        let names: Vec<String> = Component::all().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["api", "core", "hcc"]);
        assert_eq!(Component::from_str("hcc").unwrap(), Component::Hcc);
        assert!(Component::from_str("molsmart").is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Component::Core).unwrap();
        assert_eq!(json, "\"core\"");
        let parsed: Component = serde_json::from_str("\"api\"").unwrap();
        assert_eq!(parsed, Component::Api);
    }
}
