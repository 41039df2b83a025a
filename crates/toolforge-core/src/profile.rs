// ABOUTME: Profile metadata owned by the profile registry (C4)
// ABOUTME: A Profile binds a handler source tree to a tool catalog and a server port (spec §3.5)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A named configuration binding a handler source tree to a tool catalog and
/// a server port (spec §3.5, glossary).
///
/// Created by an explicit new-profile operation or by derivation from an
/// existing base; never mutated implicitly (only load/save as a whole via
/// the profile registry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique profile name (letters, digits, underscore; first character
    /// non-digit — enforced by the editor control plane, not here).
    pub name: String,
    /// Path to the handler source tree this profile scans.
    pub source_dir: PathBuf,
    /// Path to the template-definitions file used when rendering generated
    /// servers.
    pub template_definitions_path: PathBuf,
    /// Path to this profile's tool catalog file.
    pub tool_definitions_path: PathBuf,
    /// Directory rotated backups are written under.
    pub backup_dir: PathBuf,
    /// Paths to files declaring type records (validation-model base
    /// classes) the scanner should read in addition to `source_dir`.
    #[serde(default)]
    pub types_files: Vec<PathBuf>,
    /// Listen host for this profile's generated servers.
    pub host: String,
    /// Listen port, unique across every profile in one installation
    /// (spec §3.8 invariant).
    pub port: u16,
    /// Name of the profile this one was derived from, if any (spec §3.5,
    /// glossary "derived profile").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_profile: Option<String>,
}

impl Profile {
    /// True if this profile was created via derivation from another.
    #[must_use]
    pub fn is_derived(&self) -> bool {
        self.base_profile.is_some()
    }
}

/// The on-disk profile index: the sole source of truth for profile metadata
/// (spec §6.1). A JSON mapping `profile_name -> Profile`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileIndex {
    /// Profile name → metadata.
    #[serde(flatten)]
    pub profiles: BTreeMap<String, Profile>,
}

impl ProfileIndex {
    /// An empty index.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up a profile by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// True if `port` is already claimed by a profile other than `exclude`.
    #[must_use]
    pub fn port_in_use(&self, port: u16, exclude: Option<&str>) -> bool {
        self.profiles
            .values()
            .any(|p| p.port == port && Some(p.name.as_str()) != exclude)
    }

    /// The base profile and derived siblings of `name` (spec §4.4 `Family`).
    #[must_use]
    pub fn family<'a>(&'a self, name: &str) -> (Option<&'a Profile>, Vec<&'a Profile>) {
        let base = self
            .profiles
            .get(name)
            .and_then(|p| p.base_profile.as_deref())
            .and_then(|base_name| self.profiles.get(base_name));
        let derived = self
            .profiles
            .values()
            .filter(|p| p.base_profile.as_deref() == Some(name))
            .collect();
        (base, derived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, port: u16) -> Profile {
        Profile {
            name: name.into(),
            source_dir: PathBuf::from("/src"),
            template_definitions_path: PathBuf::from("/templates.json"),
            tool_definitions_path: PathBuf::from("/tools.json"),
            backup_dir: PathBuf::from("/backups"),
            types_files: vec![],
            host: "127.0.0.1".into(),
            port,
            base_profile: None,
        }
    }

    #[test]
    fn port_uniqueness_check_excludes_self() {
        let mut index = ProfileIndex::empty();
        index.profiles.insert("outlook".into(), profile("outlook", 9001));

        assert!(index.port_in_use(9001, None));
        assert!(!index.port_in_use(9001, Some("outlook")));
        assert!(!index.port_in_use(9002, None));
    }

    #[test]
    fn family_reports_base_and_derived_siblings() {
        let mut index = ProfileIndex::empty();
        index.profiles.insert("outlook".into(), profile("outlook", 9001));
        let mut derived = profile("outlook_read", 9002);
        derived.base_profile = Some("outlook".into());
        index.profiles.insert("outlook_read".into(), derived);

        let (base, siblings) = index.family("outlook_read");
        assert_eq!(base.map(|p| p.name.as_str()), Some("outlook"));
        assert!(siblings.is_empty());

        let (base, siblings) = index.family("outlook");
        assert!(base.is_none());
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].name, "outlook_read");
    }
}
