// ABOUTME: Profile Registry (C4) — create/derive/delete profiles, port and path ownership
// ABOUTME: The profile index file is the sole source of truth for profile metadata (spec §4.4, §6.1)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

//! Profile lifecycle operations: create, derive, delete, and family lookup
//! (spec §4.4). [`toolforge_core::profile`] owns the data shapes; this module
//! owns the side-effecting operations over them — reading/writing the index
//! file and the filesystem layout a profile implies.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use toolforge_core::{ErrorKind, Profile, ProfileIndex, ToolDefinition, ToolforgeError, ToolforgeResult};

use crate::atomic_file;
use crate::registry_store::RegistryStore;
use crate::tool_store::ToolStore;

/// The literal confirmation token format delete requires (spec §4.4):
/// `"DELETE <name>"`.
#[must_use]
pub fn delete_confirmation_token(name: &str) -> String {
    format!("DELETE {name}")
}

/// C4: owns the on-disk profile index and the directory layout profiles
/// imply (generated-server directories, registry files).
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    /// Path to the profile index file (spec §6.1).
    pub index_path: PathBuf,
    /// Directory generated server artifacts live under, one subdirectory per
    /// profile (spec §4.6).
    pub generated_dir: PathBuf,
    /// Directory per-server registry files live under (spec §4.2).
    pub registry_dir: PathBuf,
    /// Profile names that can never be deleted (spec §3.5 "Protected
    /// profiles").
    pub protected: BTreeSet<String>,
}

impl ProfileRegistry {
    /// Construct a registry rooted at `index_path`, with companion
    /// `generated_dir`/`registry_dir` and the given protected-name set.
    #[must_use]
    pub fn new(
        index_path: PathBuf,
        generated_dir: PathBuf,
        registry_dir: PathBuf,
        protected: BTreeSet<String>,
    ) -> Self {
        Self {
            index_path,
            generated_dir,
            registry_dir,
            protected,
        }
    }

    /// Load the profile index from disk. A missing file loads as empty — a
    /// fresh installation has no profiles yet.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing index file cannot be parsed.
    pub fn load(&self) -> ToolforgeResult<ProfileIndex> {
        if !self.index_path.exists() {
            return Ok(ProfileIndex::empty());
        }
        let body = std::fs::read(&self.index_path)?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Write the profile index back to disk atomically (spec §5 "Profile
    /// index: single-writer per mutation").
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, index: &ProfileIndex) -> ToolforgeResult<()> {
        let body = serde_json::to_vec_pretty(index)?;
        atomic_file::write_atomic(&self.index_path, &body)?;
        Ok(())
    }

    /// `Create(name, source_dir, port, …)` (spec §4.4): rejects a duplicate
    /// name or an in-use port.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ValidationError`] if `name` is already taken or
    /// `port` is claimed by another profile.
    pub fn create(&self, mut index: ProfileIndex, profile: Profile) -> ToolforgeResult<ProfileIndex> {
        if index.profiles.contains_key(&profile.name) {
            return Err(ToolforgeError::validation(format!(
                "profile '{}' already exists",
                profile.name
            )));
        }
        if index.port_in_use(profile.port, None) {
            return Err(ToolforgeError::validation(format!(
                "port {} is already in use by another profile",
                profile.port
            )));
        }
        index.profiles.insert(profile.name.clone(), profile);
        self.save(&index)?;
        Ok(index)
    }

    /// `Derive(base_name, new_name, port)` (spec §4.4): copies the base's
    /// tool catalog and overlay into the new profile's own files; the new
    /// profile shares `source_dir`/`types_files` with the base and records
    /// `base_profile`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotFound`] if `base_name` is unknown,
    /// [`ErrorKind::ValidationError`] for a duplicate name or in-use port,
    /// or any error the underlying catalog copy raises.
    pub fn derive(
        &self,
        mut index: ProfileIndex,
        base_name: &str,
        new_name: &str,
        port: u16,
        new_tool_definitions_path: PathBuf,
        new_backup_dir: PathBuf,
    ) -> ToolforgeResult<ProfileIndex> {
        let base = index
            .profiles
            .get(base_name)
            .cloned()
            .ok_or_else(|| ToolforgeError::not_found(format!("profile '{base_name}' not found")))?;
        if index.profiles.contains_key(new_name) {
            return Err(ToolforgeError::validation(format!(
                "profile '{new_name}' already exists"
            )));
        }
        if index.port_in_use(port, None) {
            return Err(ToolforgeError::validation(format!(
                "port {port} is already in use by another profile"
            )));
        }

        let base_store = ToolStore::new(base.tool_definitions_path.clone(), base.backup_dir.clone());
        let loaded = base_store.load()?;
        let derived_store = ToolStore::new(new_tool_definitions_path.clone(), new_backup_dir.clone());
        // Seed the derived profile's own files with the base's current
        // catalog+overlay; `expected_mtimes` is empty because the derived
        // store's files do not exist yet.
        derived_store.save_all(&loaded.tools, &loaded.overlay, &Default::default())?;

        let derived = Profile {
            name: new_name.to_owned(),
            source_dir: base.source_dir.clone(),
            template_definitions_path: base.template_definitions_path.clone(),
            tool_definitions_path: new_tool_definitions_path,
            backup_dir: new_backup_dir,
            types_files: base.types_files.clone(),
            host: base.host.clone(),
            port,
            base_profile: Some(base_name.to_owned()),
        };
        index.profiles.insert(new_name.to_owned(), derived);
        self.save(&index)?;
        Ok(index)
    }

    /// `Delete(name, confirm)` (spec §4.4): refuses protected profiles and a
    /// mismatched confirmation token. Removes the profile's editor-side
    /// directory implied by its own paths, the generated-server directory,
    /// the registry file, and the index entry. `source_dir` is never touched.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Protected`] for a protected profile,
    /// [`ErrorKind::ValidationError`] for a wrong confirmation token, or
    /// [`ErrorKind::NotFound`] if `name` is unknown.
    pub fn delete(
        &self,
        mut index: ProfileIndex,
        name: &str,
        confirm: &str,
    ) -> ToolforgeResult<ProfileIndex> {
        if self.protected.contains(name) {
            return Err(ToolforgeError::protected(format!(
                "profile '{name}' is protected and cannot be deleted"
            )));
        }
        let expected = delete_confirmation_token(name);
        if confirm != expected {
            return Err(ToolforgeError::validation(format!(
                "confirmation token must be '{expected}'"
            )));
        }
        let profile = index
            .profiles
            .remove(name)
            .ok_or_else(|| ToolforgeError::not_found(format!("profile '{name}' not found")))?;

        // (a) editor-side directory: the catalog/backup directory this
        // profile owns.
        if let Some(parent) = profile.tool_definitions_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
        let _ = std::fs::remove_dir_all(&profile.backup_dir);

        // (b) generated-server directory.
        let generated_path = self.generated_dir.join(name);
        let _ = std::fs::remove_dir_all(&generated_path);

        // (c) the registry file for this profile. A profile's server name
        // is the profile name by convention unless derived, in which case
        // the base's registry is shared and must not be removed.
        if !profile.is_derived() {
            let registry_path = self.registry_dir.join(format!("registry_{name}.json"));
            let _ = std::fs::remove_file(&registry_path);
        }

        // source_dir is explicitly never touched (spec §4.4).
        self.save(&index)?;
        Ok(index)
    }

    /// `Family(name)` (spec §4.4): base profile and derived siblings.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotFound`] if `name` is unknown.
    pub fn family<'a>(
        &self,
        index: &'a ProfileIndex,
        name: &str,
    ) -> ToolforgeResult<(Option<&'a Profile>, Vec<&'a Profile>)> {
        if !index.profiles.contains_key(name) {
            return Err(ToolforgeError::not_found(format!(
                "profile '{name}' not found"
            )));
        }
        Ok(index.family(name))
    }

    /// Validate a profile identifier: letters, digits, underscore; first
    /// character non-digit (spec §4.9).
    #[must_use]
    pub fn is_valid_identifier(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) if (first.is_ascii_alphabetic() || first == '_') => {}
            _ => return false,
        }
        !name.is_empty() && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    /// Validate a port is in the allowed editor range (spec §4.9: `[1024,
    /// 65535]`).
    #[must_use]
    pub const fn is_valid_port(port: u32) -> bool {
        port >= 1024 && port <= 65535
    }

    /// Non-fatal binding check for a derived profile's tool catalog against
    /// its own base's current registry (spec §9 Open Question 1: the base's
    /// `source_dir` may have drifted out from under a handler a derived
    /// profile still uses; this surfaces a warning per affected tool and
    /// never deletes or mutates anything).
    #[must_use]
    pub fn lint_bindings(
        server_name: &str,
        tools: &[ToolDefinition],
        registry: &RegistryStore,
    ) -> Vec<String> {
        let document = match registry.load(server_name) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                return vec![format!(
                    "no registry found for server '{server_name}' — run a scan before generating"
                )]
            }
            Err(e) => return vec![format!("could not read registry for '{server_name}': {e}")],
        };

        tools
            .iter()
            .filter(|tool| document.lookup(&tool.mcp_service).is_none())
            .map(|tool| {
                format!(
                    "tool '{}' binds to mcp_service '{}', which no longer resolves in server '{server_name}'",
                    tool.name, tool.mcp_service
                )
            })
            .collect()
    }

    /// Merge a freshly scanned set of profiles into the existing index
    /// rather than overwriting it, preserving profiles the scan did not
    /// cover (spec §4.4 "Merge strategy on regeneration").
    #[must_use]
    pub fn merge(mut existing: ProfileIndex, scanned: ProfileIndex) -> ProfileIndex {
        for (name, profile) in scanned.profiles {
            existing.profiles.insert(name, profile);
        }
        existing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn profile(name: &str, port: u16, dir: &Path) -> Profile {
        Profile {
            name: name.into(),
            source_dir: dir.join("source"),
            template_definitions_path: dir.join("templates.json"),
            tool_definitions_path: dir.join(name).join("tool_definitions.json"),
            backup_dir: dir.join(name).join("backups"),
            types_files: vec![],
            host: "127.0.0.1".into(),
            port,
            base_profile: None,
        }
    }

    fn registry(dir: &Path) -> ProfileRegistry {
        ProfileRegistry::new(
            dir.join("profiles.json"),
            dir.join("generated"),
            dir.join("registry"),
            BTreeSet::from(["outlook".to_owned()]),
        )
    }

    #[test]
    fn create_rejects_duplicate_name_and_port() {
        let dir = tempdir().expect("tempdir");
        let reg = registry(dir.path());
        let index = reg.load().expect("load");
        let index = reg
            .create(index, profile("outlook", 9001, dir.path()))
            .expect("first create");

        let dup_name = reg.create(index.clone(), profile("outlook", 9002, dir.path()));
        assert!(matches!(dup_name, Err(ref e) if e.kind == ErrorKind::ValidationError));

        let dup_port = reg.create(index, profile("calendar", 9001, dir.path()));
        assert!(matches!(dup_port, Err(ref e) if e.kind == ErrorKind::ValidationError));
    }

    #[test]
    fn delete_protected_profile_is_refused_and_mutates_nothing() {
        let dir = tempdir().expect("tempdir");
        let reg = registry(dir.path());
        let index = reg.load().expect("load");
        let index = reg
            .create(index, profile("outlook", 9001, dir.path()))
            .expect("create");

        let result = reg.delete(index.clone(), "outlook", &delete_confirmation_token("outlook"));
        assert!(matches!(result, Err(ref e) if e.kind == ErrorKind::Protected));

        let reloaded = reg.load().expect("reload");
        assert!(reloaded.profiles.contains_key("outlook"));
    }

    #[test]
    fn delete_requires_exact_confirmation_token() {
        let dir = tempdir().expect("tempdir");
        let reg = registry(dir.path());
        let index = reg.load().expect("load");
        let index = reg
            .create(index, profile("calendar", 9001, dir.path()))
            .expect("create");

        let result = reg.delete(index, "calendar", "delete calendar");
        assert!(matches!(result, Err(ref e) if e.kind == ErrorKind::ValidationError));
    }

    #[test]
    fn derive_then_delete_leaves_base_untouched() {
        let dir = tempdir().expect("tempdir");
        let reg = registry(dir.path());
        let index = reg.load().expect("load");
        let index = reg
            .create(index, profile("outlook", 9001, dir.path()))
            .expect("create base");

        // "outlook" is protected in this test's registry; use a
        // non-protected base to exercise the full derive+delete scenario
        // (spec §8 S4 uses a different base name but the same shape).
        let reg2 = ProfileRegistry::new(
            dir.path().join("profiles.json"),
            dir.path().join("generated"),
            dir.path().join("registry"),
            BTreeSet::new(),
        );
        let index = reg2
            .derive(
                index,
                "outlook",
                "outlook_read",
                9002,
                dir.path().join("outlook_read").join("tool_definitions.json"),
                dir.path().join("outlook_read").join("backups"),
            )
            .expect("derive");
        assert!(index.profiles.contains_key("outlook_read"));
        assert_eq!(
            index.profiles["outlook_read"].base_profile.as_deref(),
            Some("outlook")
        );

        let index = reg2
            .delete(
                index,
                "outlook_read",
                &delete_confirmation_token("outlook_read"),
            )
            .expect("delete derived");
        assert!(!index.profiles.contains_key("outlook_read"));
        assert!(index.profiles.contains_key("outlook"));
    }

    #[test]
    fn identifier_validation_matches_spec_rule() {
        assert!(ProfileRegistry::is_valid_identifier("outlook_read"));
        assert!(ProfileRegistry::is_valid_identifier("_private"));
        assert!(!ProfileRegistry::is_valid_identifier("1outlook"));
        assert!(!ProfileRegistry::is_valid_identifier(""));
        assert!(!ProfileRegistry::is_valid_identifier("out-look"));
    }

    #[test]
    fn port_validation_matches_spec_range() {
        assert!(ProfileRegistry::is_valid_port(1024));
        assert!(ProfileRegistry::is_valid_port(65535));
        assert!(!ProfileRegistry::is_valid_port(1023));
        assert!(!ProfileRegistry::is_valid_port(65536));
    }

    #[test]
    fn lint_bindings_warns_on_broken_binding_without_mutating_anything() {
        use std::collections::BTreeMap;
        use toolforge_core::{HandlerBinding, HandlerRecord, JsonSchema};

        let dir = tempdir().expect("tempdir");
        let registry = RegistryStore::new(dir.path().join("registry"));
        registry
            .save(
                "outlook",
                &[HandlerRecord {
                    service_name: "fetch_filter".into(),
                    server_name: "outlook".into(),
                    class_name: "MailService".into(),
                    module_path: "mail.service".into(),
                    method_name: "fetch_filter".into(),
                    is_async: true,
                    signature: vec![],
                    description: None,
                    tags: BTreeSet::new(),
                }],
            )
            .expect("seed registry");

        let tool = ToolDefinition {
            name: "mail_fetch".into(),
            description: "fetch mail".into(),
            mcp_service: "renamed_filter".into(),
            input_schema: JsonSchema::empty(),
            service_factors: BTreeMap::new(),
            handler: HandlerBinding {
                class_name: "MailService".into(),
                module_path: "mail.service".into(),
                method: "fetch_filter".into(),
                is_async: true,
            },
        };

        let warnings = ProfileRegistry::lint_bindings("outlook", &[tool], &registry);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("renamed_filter"));
    }

    #[test]
    fn merge_preserves_unscanned_profiles() {
        let dir = tempdir().expect("tempdir");
        let mut existing = ProfileIndex::empty();
        existing
            .profiles
            .insert("reused".into(), profile("reused", 9010, dir.path()));

        let mut scanned = ProfileIndex::empty();
        scanned
            .profiles
            .insert("outlook".into(), profile("outlook", 9001, dir.path()));

        let merged = ProfileRegistry::merge(existing, scanned);
        assert!(merged.profiles.contains_key("reused"));
        assert!(merged.profiles.contains_key("outlook"));
    }
}
