// ABOUTME: Tool Definition Store (C3) — owns the canonical per-profile tool catalog on disk
// ABOUTME: Atomic save with mtime-based optimistic concurrency, rotating backups (spec §4.3)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

//! The tool definition store is the single writer of a profile's tool
//! catalog file (spec §3.6, §4.3). Every mutation — `SaveAll`, `UpdateTool`,
//! `DeleteTool`, backup restore — funnels through [`ToolStore::save_all`],
//! which performs the mtime compare-and-swap and backup rotation described
//! in spec §4.3 and §5 ("File atomicity").

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use toolforge_core::{ErrorKind, InternalArgsOverlay, ToolDefinition, ToolforgeError, ToolforgeResult};

use crate::atomic_file;

/// The mtime of every file a `Load` call read, returned so a later `SaveAll`
/// can detect concurrent writers (spec §4.3, SPEC_FULL §3 "mtime recording
/// format").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMtimes {
    /// `path -> millis since epoch` for every file this snapshot covers.
    #[serde(flatten)]
    pub entries: BTreeMap<String, i64>,
}

impl FileMtimes {
    /// Record one file's mtime, if it exists.
    pub fn record(&mut self, path: &Path) {
        if let Some(millis) = atomic_file::mtime_millis(path) {
            self.entries.insert(path.display().to_string(), millis);
        }
    }

    /// True if every recorded mtime still matches what is on disk.
    #[must_use]
    pub fn still_current(&self) -> bool {
        self.entries.iter().all(|(path, expected)| {
            atomic_file::mtime_millis(Path::new(path)) == Some(*expected)
        })
    }

    /// The first path whose on-disk mtime no longer matches, if any — used
    /// to name the conflicting file in a 409 response (spec §6.5).
    #[must_use]
    pub fn first_conflicting_path(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|(path, expected)| {
                atomic_file::mtime_millis(Path::new(path)) != Some(**expected)
            })
            .map(|(path, _)| path.as_str())
    }
}

/// The on-disk tool catalog document (spec §3.6, §6.3): an ordered sequence
/// of tools plus the source-file mtimes recorded at the last successful
/// load, kept alongside for the *next* load's concurrency snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ToolCatalogDocument {
    tools: Vec<ToolDefinition>,
}

/// Everything [`ToolStore::load`] hands back: the tool catalog, the
/// internal-args overlay, and a concurrency snapshot to pass back into
/// [`ToolStore::save_all`].
#[derive(Debug, Clone)]
pub struct LoadedTools {
    /// The profile's tool catalog, in file order.
    pub tools: Vec<ToolDefinition>,
    /// The sibling internal-args overlay document.
    pub overlay: InternalArgsOverlay,
    /// mtimes of every file this load touched.
    pub file_mtimes: FileMtimes,
}

/// C3: owns one profile's tool catalog file and its overlay sibling.
#[derive(Debug, Clone)]
pub struct ToolStore {
    /// Path to the tool catalog file (spec §3.5 `tool_definitions_path`).
    pub tool_definitions_path: PathBuf,
    /// Path to the internal-args overlay sibling file.
    pub overlay_path: PathBuf,
    /// Directory rotated backups are written into (spec §3.5 `backup_dir`).
    pub backup_dir: PathBuf,
    /// Registry files this profile's tools reference (spec §4.3: `Load`
    /// "returns the recorded mtimes of every file it read (tool catalog,
    /// overlay, registry)"). Included in the same [`FileMtimes`] snapshot
    /// as the catalog and overlay so a registry rewritten between `Load`
    /// and `SaveAll` is caught by the same concurrency check (spec §8
    /// property 9), not silently ignored.
    pub registry_paths: Vec<PathBuf>,
}

impl ToolStore {
    /// Construct a store for one profile. `overlay_path` is derived from
    /// `tool_definitions_path` by convention (`<stem>.overlay.json`) unless
    /// the profile records a different one. Carries no registry files to
    /// watch; call [`Self::with_registry_paths`] to add them.
    #[must_use]
    pub fn new(tool_definitions_path: PathBuf, backup_dir: PathBuf) -> Self {
        let overlay_path = overlay_path_for(&tool_definitions_path);
        Self {
            tool_definitions_path,
            overlay_path,
            backup_dir,
            registry_paths: Vec::new(),
        }
    }

    /// Add the registry file(s) a profile's tools bind against, so `Load`
    /// and `SaveAll` fold their mtimes into the same concurrency snapshot
    /// as the catalog and overlay (spec §4.3).
    #[must_use]
    pub fn with_registry_paths(mut self, registry_paths: Vec<PathBuf>) -> Self {
        self.registry_paths = registry_paths;
        self
    }

    /// `Load(profile) -> (tools[], overlay, file_mtimes)` (spec §4.3).
    ///
    /// A missing catalog file loads as an empty one rather than an error —
    /// a freshly created profile has no tools yet.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be parsed.
    pub fn load(&self) -> ToolforgeResult<LoadedTools> {
        let document = read_json_or_default::<ToolCatalogDocument>(&self.tool_definitions_path)?;
        let overlay = read_json_or_default::<InternalArgsOverlay>(&self.overlay_path)?;

        let mut file_mtimes = FileMtimes::default();
        file_mtimes.record(&self.tool_definitions_path);
        file_mtimes.record(&self.overlay_path);
        for registry_path in &self.registry_paths {
            file_mtimes.record(registry_path);
        }

        Ok(LoadedTools {
            tools: document.tools,
            overlay,
            file_mtimes,
        })
    }

    /// `SaveAll(profile, tools, overlay, expected_mtimes) -> ConflictError | OK`
    /// (spec §4.3): compare-and-swap over the recorded mtimes, then
    /// backup-then-atomic-write both the catalog and the overlay.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ConcurrencyConflict`] if any `expected_mtimes`
    /// entry no longer matches the file on disk (no write performed), or an
    /// I/O/serialization error if the write itself fails.
    pub fn save_all(
        &self,
        tools: &[ToolDefinition],
        overlay: &InternalArgsOverlay,
        expected_mtimes: &FileMtimes,
    ) -> ToolforgeResult<FileMtimes> {
        if !expected_mtimes.still_current() {
            let conflicting = expected_mtimes
                .first_conflicting_path()
                .unwrap_or("tool catalog");
            return Err(ToolforgeError::new(
                ErrorKind::ConcurrencyConflict,
                format!("concurrent modification detected on {conflicting}"),
            ));
        }

        let document = ToolCatalogDocument {
            tools: tools.to_vec(),
        };
        let catalog_body = serde_json::to_vec_pretty(&document)?;
        let overlay_body = serde_json::to_vec_pretty(overlay)?;

        atomic_file::write_with_backup(
            &self.tool_definitions_path,
            &self.backup_dir,
            &catalog_body,
        )
        .map_err(io_err)?;
        atomic_file::write_with_backup(&self.overlay_path, &self.backup_dir, &overlay_body)
            .map_err(io_err)?;

        let mut new_mtimes = FileMtimes::default();
        new_mtimes.record(&self.tool_definitions_path);
        new_mtimes.record(&self.overlay_path);
        for registry_path in &self.registry_paths {
            new_mtimes.record(registry_path);
        }
        Ok(new_mtimes)
    }

    /// `UpdateTool(profile, index, tool)` (spec §4.3): single-tool variant
    /// over [`Self::save_all`].
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotFound`] if `index` is out of range, otherwise
    /// the same errors as [`Self::save_all`].
    pub fn update_tool(
        &self,
        loaded: &LoadedTools,
        index: usize,
        tool: ToolDefinition,
    ) -> ToolforgeResult<FileMtimes> {
        let mut tools = loaded.tools.clone();
        let slot = tools
            .get_mut(index)
            .ok_or_else(|| ToolforgeError::not_found(format!("no tool at index {index}")))?;
        *slot = tool;
        self.save_all(&tools, &loaded.overlay, &loaded.file_mtimes)
    }

    /// `DeleteTool(profile, index)` (spec §4.3): removes the tool, rotates a
    /// backup, and returns the backup filename.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotFound`] if `index` is out of range, otherwise
    /// the same errors as [`Self::save_all`].
    pub fn delete_tool(
        &self,
        loaded: &LoadedTools,
        index: usize,
    ) -> ToolforgeResult<(FileMtimes, Option<String>)> {
        let mut tools = loaded.tools.clone();
        if index >= tools.len() {
            return Err(ToolforgeError::not_found(format!(
                "no tool at index {index}"
            )));
        }
        let removed = tools.remove(index);
        let mut overlay = loaded.overlay.clone();
        overlay.entries.remove(&removed.name);

        let before = atomic_file::mtime_millis(&self.tool_definitions_path);
        let new_mtimes = self.save_all(&tools, &overlay, &loaded.file_mtimes)?;
        let backup_name = list_backups(&self.backup_dir)
            .ok()
            .and_then(|mut names| {
                names.sort();
                names.pop()
            })
            .filter(|_| before.is_some());
        Ok((new_mtimes, backup_name))
    }

    /// `ListBackups(profile)` (spec §4.3): every rotated backup filename for
    /// this profile's catalog, newest last.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup directory cannot be read.
    pub fn list_backups(&self) -> std::io::Result<Vec<String>> {
        list_backups(&self.backup_dir)
    }

    /// `ReadBackup(profile, filename)` (spec §4.3): read one backup's raw
    /// catalog JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `filename` escapes `backup_dir` or cannot be read.
    pub fn read_backup(&self, filename: &str) -> ToolforgeResult<Vec<ToolDefinition>> {
        let path = self.safe_backup_path(filename)?;
        let document = read_json_or_default::<ToolCatalogDocument>(&path)?;
        Ok(document.tools)
    }

    /// `RestoreBackup(profile, filename)` (spec §4.3): first backs up the
    /// current state, then replaces it atomically with the named backup's
    /// contents.
    ///
    /// # Errors
    ///
    /// Returns an error if `filename` does not resolve to a real backup or
    /// the restore write fails.
    pub fn restore_backup(
        &self,
        loaded: &LoadedTools,
        filename: &str,
    ) -> ToolforgeResult<FileMtimes> {
        let tools = self.read_backup(filename)?;
        self.save_all(&tools, &loaded.overlay, &loaded.file_mtimes)
    }

    fn safe_backup_path(&self, filename: &str) -> ToolforgeResult<PathBuf> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return Err(ToolforgeError::validation(format!(
                "invalid backup filename '{filename}'"
            )));
        }
        let path = self.backup_dir.join(filename);
        if !path.exists() {
            return Err(ToolforgeError::not_found(format!(
                "backup '{filename}' not found"
            )));
        }
        Ok(path)
    }
}

fn overlay_path_for(tool_definitions_path: &Path) -> PathBuf {
    let stem = tool_definitions_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tool_definitions".to_owned());
    let ext = tool_definitions_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "json".to_owned());
    tool_definitions_path.with_file_name(format!("{stem}.overlay.{ext}"))
}

fn list_backups(backup_dir: &Path) -> std::io::Result<Vec<String>> {
    if !backup_dir.exists() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = std::fs::read_dir(backup_dir)?
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".bak"))
        .collect();
    names.sort();
    Ok(names)
}

fn read_json_or_default<T>(path: &Path) -> ToolforgeResult<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if !path.exists() {
        return Ok(T::default());
    }
    let body = std::fs::read(path).map_err(io_err)?;
    Ok(serde_json::from_slice(&body)?)
}

fn io_err(err: std::io::Error) -> ToolforgeError {
    ToolforgeError::from(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use toolforge_core::{HandlerBinding, JsonSchema, PropertySchema};

    fn tool(name: &str) -> ToolDefinition {
        let mut schema = JsonSchema::empty();
        schema.insert_property("user_email".into(), PropertySchema::scalar("string"), true);
        ToolDefinition {
            name: name.into(),
            description: "Fetch mail".into(),
            mcp_service: "fetch_filter".into(),
            input_schema: schema,
            service_factors: BTreeMap::new(),
            handler: HandlerBinding {
                class_name: "MailService".into(),
                module_path: "mail.service".into(),
                method: "fetch_filter".into(),
                is_async: true,
            },
        }
    }

    fn store_in(dir: &Path) -> ToolStore {
        ToolStore::new(
            dir.join("tool_definitions.json"),
            dir.join("backups"),
        )
    }

    #[test]
    fn load_on_missing_file_is_empty() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let loaded = store.load().expect("load");
        assert!(loaded.tools.is_empty());
        assert!(loaded.overlay.entries.is_empty());
    }

    #[test]
    fn save_then_load_round_trips_byte_identically_modulo_ordering() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let loaded = store.load().expect("load");

        let tools = vec![tool("mail_fetch_filter")];
        let mtimes = store
            .save_all(&tools, &loaded.overlay, &loaded.file_mtimes)
            .expect("save");
        assert!(mtimes.still_current());

        let reloaded = store.load().expect("reload");
        assert_eq!(reloaded.tools, tools);

        // Property 5: Load -> Save with unchanged content is idempotent.
        let resaved = store
            .save_all(&reloaded.tools, &reloaded.overlay, &reloaded.file_mtimes)
            .expect("resave");
        assert!(resaved.still_current());
    }

    #[test]
    fn save_all_with_stale_mtime_returns_conflict_and_writes_nothing() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let loaded = store.load().expect("load");
        store
            .save_all(&[tool("a")], &loaded.overlay, &loaded.file_mtimes)
            .expect("first save");

        // `loaded.file_mtimes` is now stale (it predates the first save).
        let result = store.save_all(&[tool("b")], &loaded.overlay, &loaded.file_mtimes);
        assert!(matches!(
            result,
            Err(ref e) if e.kind == ErrorKind::ConcurrencyConflict
        ));

        // On-disk content still reflects the winning writer's save.
        let current = store.load().expect("load after conflict");
        assert_eq!(current.tools, vec![tool("a")]);
    }

    /// Property 9 (spec §8), extended to cover the registry file spec §4.3
    /// names alongside the catalog and overlay: a registry rewritten out
    /// from under a profile between `Load` and `SaveAll` must surface as a
    /// `ConcurrencyConflict`, not be silently invisible to the check.
    ///
    /// Drifts the recorded mtime directly rather than racing a real
    /// rewrite against filesystem mtime resolution (mirrors
    /// `atomic_file::mtime_millis_changes_after_rewrite`'s own caution
    /// about coarse-grained mtimes).
    #[test]
    fn save_all_detects_a_registry_file_rewritten_since_load() {
        let dir = tempdir().expect("tempdir");
        let registry_path = dir.path().join("registry_outlook.json");
        std::fs::write(&registry_path, b"{}").expect("seed registry");

        let store = store_in(dir.path()).with_registry_paths(vec![registry_path.clone()]);
        let mut loaded = store.load().expect("load");
        let key = registry_path.display().to_string();
        assert!(loaded.file_mtimes.entries.contains_key(&key));

        // Simulate a scan having rewritten the registry since this Load
        // snapshot was taken, without depending on real mtime resolution.
        let recorded = loaded.file_mtimes.entries[&key];
        loaded.file_mtimes.entries.insert(key.clone(), recorded - 1);

        let result = store.save_all(&[tool("a")], &loaded.overlay, &loaded.file_mtimes);
        match result {
            Err(ref e) if e.kind == ErrorKind::ConcurrencyConflict => {
                assert!(e.message.contains(&key), "message should name the conflicting registry file: {e}");
            }
            other => panic!("expected ConcurrencyConflict naming {key}, got {other:?}"),
        }
    }

    #[test]
    fn delete_tool_rotates_a_backup_and_removes_overlay_entries() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let loaded = store.load().expect("load");
        store
            .save_all(&[tool("a"), tool("b")], &loaded.overlay, &loaded.file_mtimes)
            .expect("seed");

        let loaded = store.load().expect("reload");
        let (_, backup) = store.delete_tool(&loaded, 0).expect("delete");
        assert!(backup.is_some());

        let after = store.load().expect("reload after delete");
        assert_eq!(after.tools.len(), 1);
        assert_eq!(after.tools[0].name, "b");
    }

    #[test]
    fn restore_backup_brings_back_prior_content() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let loaded = store.load().expect("load");
        store
            .save_all(&[tool("a")], &loaded.overlay, &loaded.file_mtimes)
            .expect("first save");

        let loaded = store.load().expect("reload");
        store
            .save_all(&[tool("b")], &loaded.overlay, &loaded.file_mtimes)
            .expect("second save");

        let backups = store.list_backups().expect("list backups");
        assert_eq!(backups.len(), 1);

        let loaded = store.load().expect("reload before restore");
        store
            .restore_backup(&loaded, &backups[0])
            .expect("restore");

        let restored = store.load().expect("reload after restore");
        assert_eq!(restored.tools, vec![tool("a")]);
    }
}
