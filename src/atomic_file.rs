// ABOUTME: Shared atomic-write-with-backup-rotation helper used by C3 and C4
// ABOUTME: write-temp-in-same-dir -> fsync -> rename-over-target, backup first (spec §5)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

//! The single file-write primitive every on-disk store in this crate builds
//! on (spec §5 "File atomicity"): backup the current file if one exists,
//! write the new content to a temp file in the same directory, fsync, then
//! rename over the target. Rename within one directory is atomic on every
//! platform this crate targets.

use chrono::Utc;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `contents` to `target`, first rotating any existing file at
/// `target` into `backup_dir` as `<stem>.<unix millis>.bak`.
///
/// Returns the backup path, or `None` if `target` did not exist yet.
///
/// # Errors
///
/// Returns an error if any filesystem operation fails.
pub fn write_with_backup(
    target: &Path,
    backup_dir: &Path,
    contents: &[u8],
) -> std::io::Result<Option<PathBuf>> {
    let backup_path = if target.exists() {
        fs::create_dir_all(backup_dir)?;
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "backup".to_owned());
        let backup = backup_dir.join(format!("{stem}.{}.bak", Utc::now().timestamp_millis()));
        fs::copy(target, &backup)?;
        Some(backup)
    } else {
        None
    };

    write_atomic(target, contents)?;
    Ok(backup_path)
}

/// Write `contents` to `target` via a same-directory temp file, fsync, then
/// rename — no backup rotation.
///
/// # Errors
///
/// Returns an error if any filesystem operation fails.
pub fn write_atomic(target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let temp_path = dir.join(format!(
        ".{}.tmp-{}",
        target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned()),
        std::process::id()
    ));
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, target)?;
    Ok(())
}

/// The mtime of `path` as whole milliseconds since the Unix epoch, or `None`
/// if the file does not exist. Used for the optimistic-concurrency check in
/// C3's `SaveAll` (spec §4.3, §8 property 9).
#[must_use]
pub fn mtime_millis(path: &Path) -> Option<i64> {
    let metadata = fs::metadata(path).ok()?;
    let modified = metadata.modified().ok()?;
    let duration = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    i64::try_from(duration.as_millis()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_with_backup_rotates_existing_content() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("tool_definitions.json");
        let backup_dir = dir.path().join("backups");

        write_with_backup(&target, &backup_dir, b"{\"version\":1}").expect("first write");
        let backup = write_with_backup(&target, &backup_dir, b"{\"version\":2}")
            .expect("second write")
            .expect("backup created on second write");

        assert_eq!(fs::read(&target).expect("read target"), b"{\"version\":2}");
        assert_eq!(fs::read(&backup).expect("read backup"), b"{\"version\":1}");
    }

    #[test]
    fn write_with_backup_returns_none_for_first_write() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("tool_definitions.json");
        let backup_dir = dir.path().join("backups");

        let backup =
            write_with_backup(&target, &backup_dir, b"{}").expect("write succeeds");
        assert!(backup.is_none());
    }

    #[test]
    fn mtime_millis_changes_after_rewrite() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("file.json");
        write_atomic(&target, b"one").expect("write");
        let first = mtime_millis(&target).expect("mtime exists");
        std::thread::sleep(std::time::Duration::from_millis(5));
        write_atomic(&target, b"two").expect("rewrite");
        let second = mtime_millis(&target).expect("mtime exists");
        assert!(second >= first);
    }
}
