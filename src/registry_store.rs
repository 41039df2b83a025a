// ABOUTME: Registry Store (C2) — persists per-server Handler Records to disk
// ABOUTME: Read/write of registry_<server>.json, revalidated by mtime by in-process callers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

//! Serializes each server's scanned [`HandlerRecord`]s to
//! `registry_<server>.json` under a well-known directory (spec §4.2, §6.2).
//!
//! The store is purely on-disk: it has no process-lifetime cache of its own.
//! Callers that want to avoid re-reading on every lookup may cache, but must
//! revalidate by file mtime (spec §4.2) — [`RegistryStore::mtime`] exists for
//! exactly that.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use toolforge_core::{HandlerRecord, TypeRecord};

use crate::atomic_file;

/// Current registry document schema version (spec §6.2).
const REGISTRY_VERSION: u32 = 1;

/// One entry in a registry file's `services` map (spec §6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryServiceEntry {
    /// Denormalized handler binding.
    pub handler: RegistryHandlerRef,
    /// Textual signature, rendered for human/editor display.
    pub signature: String,
    /// The full parameter list.
    pub parameters: Vec<toolforge_core::Parameter>,
    /// Free-form metadata: description and tags, kept as a JSON object so the
    /// registry file is forward-compatible with metadata fields this crate
    /// does not itself interpret.
    pub metadata: serde_json::Value,
}

/// The handler reference embedded in a registry entry (spec §6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryHandlerRef {
    /// Class the method is declared on.
    pub class_name: String,
    /// Dotted module path.
    pub module_path: String,
    /// Method name.
    pub method: String,
    /// Whether the method is `async`.
    pub is_async: bool,
}

/// One server's registry file on disk (spec §6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDocument {
    /// Schema version.
    pub version: u32,
    /// When this document was last written.
    pub generated_at: DateTime<Utc>,
    /// The server this registry belongs to.
    pub server_name: String,
    /// `service_name` → entry.
    pub services: BTreeMap<String, RegistryServiceEntry>,
}

impl RegistryDocument {
    fn from_handlers(server_name: &str, handlers: &[HandlerRecord]) -> Self {
        let services = handlers
            .iter()
            .map(|h| {
                let signature = h
                    .signature
                    .iter()
                    .map(|p| format!("{}: {}", p.name, p.type_expression.0))
                    .collect::<Vec<_>>()
                    .join(", ");
                (
                    h.service_name.clone(),
                    RegistryServiceEntry {
                        handler: RegistryHandlerRef {
                            class_name: h.class_name.clone(),
                            module_path: h.module_path.clone(),
                            method: h.method_name.clone(),
                            is_async: h.is_async,
                        },
                        signature,
                        parameters: h.signature.clone(),
                        metadata: serde_json::json!({
                            "description": h.description,
                            "tags": h.tags,
                        }),
                    },
                )
            })
            .collect();

        Self {
            version: REGISTRY_VERSION,
            generated_at: Utc::now(),
            server_name: server_name.to_owned(),
            services,
        }
    }

    /// Look up a registered service by name (spec §4.2 `LookupService`).
    #[must_use]
    pub fn lookup(&self, service_name: &str) -> Option<&RegistryServiceEntry> {
        self.services.get(service_name)
    }
}

/// C2: reads and writes per-server registry files under a directory.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    /// Directory holding `registry_<server>.json` files (spec §6.2).
    pub directory: PathBuf,
}

impl RegistryStore {
    /// Construct a store rooted at `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn path_for(&self, server_name: &str) -> PathBuf {
        self.directory.join(format!("registry_{server_name}.json"))
    }

    fn types_path_for(&self, server_name: &str) -> PathBuf {
        self.directory.join(format!("types_{server_name}.json"))
    }

    /// Persist the scanned handlers for `server_name`, overwriting any
    /// existing registry file for that server.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized or the file
    /// cannot be written.
    pub fn save(
        &self,
        server_name: &str,
        handlers: &[HandlerRecord],
    ) -> Result<(), RegistryStoreError> {
        let document = RegistryDocument::from_handlers(server_name, handlers);
        let body = serde_json::to_vec_pretty(&document)?;
        let path = self.path_for(server_name);
        atomic_file::write_atomic(&path, &body)?;
        Ok(())
    }

    /// Load the registry document for `server_name`, if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(&self, server_name: &str) -> Result<Option<RegistryDocument>, RegistryStoreError> {
        let path = self.path_for(server_name);
        if !path.exists() {
            return Ok(None);
        }
        let body = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&body)?))
    }

    /// `LookupService(profile, service_name)` (spec §4.2): load the named
    /// server's registry and look up one service.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry file exists but cannot be parsed.
    pub fn lookup_service(
        &self,
        server_name: &str,
        service_name: &str,
    ) -> Result<Option<RegistryServiceEntry>, RegistryStoreError> {
        Ok(self
            .load(server_name)?
            .and_then(|doc| doc.services.get(service_name).cloned()))
    }

    /// The on-disk modification time of `server_name`'s registry file, for
    /// mtime-based revalidation by in-process callers (spec §4.2).
    #[must_use]
    pub fn mtime(&self, server_name: &str) -> Option<i64> {
        atomic_file::mtime_millis(&self.path_for(server_name))
    }

    /// Path a registry file for `server_name` would live at, whether or not
    /// it currently exists.
    #[must_use]
    pub fn path_for_server(&self, server_name: &str) -> PathBuf {
        self.path_for(server_name)
    }

    /// Persist the type records a scan discovered for `server_name`, as a
    /// sibling file of that server's registry (SPEC_FULL §3 "Type Record →
    /// JSON Schema lowering"). Not part of the registry file format itself
    /// (spec §6.2 names only `services`) — this is additional bookkeeping
    /// the editor's autocomplete reads back via [`Self::load_types`].
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized or the file
    /// cannot be written.
    pub fn save_types(
        &self,
        server_name: &str,
        types: &[TypeRecord],
    ) -> Result<(), RegistryStoreError> {
        let body = serde_json::to_vec_pretty(types)?;
        atomic_file::write_atomic(&self.types_path_for(server_name), &body)?;
        Ok(())
    }

    /// Load the type records recorded for `server_name`, if any have ever
    /// been saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_types(&self, server_name: &str) -> Result<Vec<TypeRecord>, RegistryStoreError> {
        let path = self.types_path_for(server_name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let body = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl Clone for RegistryServiceEntry {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            signature: self.signature.clone(),
            parameters: self.parameters.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Errors from reading or writing registry files.
#[derive(Debug, thiserror::Error)]
pub enum RegistryStoreError {
    /// Underlying filesystem failure.
    #[error("registry store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The document was malformed JSON.
    #[error("registry store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::tempdir;
    use toolforge_core::Parameter;

    fn handler(service_name: &str) -> HandlerRecord {
        HandlerRecord {
            service_name: service_name.into(),
            server_name: "mail".into(),
            class_name: "MailService".into(),
            module_path: "mail.service".into(),
            method_name: "fetch_filter".into(),
            is_async: true,
            signature: vec![Parameter::required("user_email", "string")],
            description: Some("Fetch mail".into()),
            tags: BTreeSet::new(),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().expect("tempdir");
        let store = RegistryStore::new(dir.path());
        store
            .save("mail", &[handler("mail_fetch_filter")])
            .expect("save");

        let loaded = store.load("mail").expect("load").expect("present");
        assert_eq!(loaded.server_name, "mail");
        assert!(loaded.lookup("mail_fetch_filter").is_some());
        assert!(loaded.lookup("missing").is_none());
    }

    #[test]
    fn types_round_trip_and_default_empty_when_unsaved() {
        let dir = tempdir().expect("tempdir");
        let store = RegistryStore::new(dir.path());
        assert!(store.load_types("mail").expect("load").is_empty());

        let types = vec![TypeRecord {
            name: "DatePeriodFilter".into(),
            module_path: "mail.types".into(),
            fields: vec![Parameter::required("start", "string")],
        }];
        store.save_types("mail", &types).expect("save types");
        let loaded = store.load_types("mail").expect("reload");
        assert_eq!(loaded, types);
    }

    #[test]
    fn lookup_service_returns_none_for_unknown_server() {
        let dir = tempdir().expect("tempdir");
        let store = RegistryStore::new(dir.path());
        let result = store.lookup_service("ghost", "anything").expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn mtime_is_none_before_first_save() {
        let dir = tempdir().expect("tempdir");
        let store = RegistryStore::new(dir.path());
        assert!(store.mtime("mail").is_none());
        store.save("mail", &[handler("x")]).expect("save");
        assert!(store.mtime("mail").is_some());
    }
}
