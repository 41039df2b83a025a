// ABOUTME: Source Scanner (C1) — walks a handler source tree and extracts Handler/Type Records
// ABOUTME: Parses the registration marker and signatures without executing any scanned source
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

//! Discovers registered handler methods and validation-model type records
//! from a handler source tree (spec §4.1).
//!
//! The scanner never imports or executes scanned source. It works line- and
//! regex-oriented over the handler language's textual surface rather than
//! building a full abstract syntax tree — there is no AST-grade parser crate
//! for the handler language in this workspace's dependency stack, and the
//! spec's own signature shapes (decorator-marked methods, `Field(...)`-style
//! defaults, `Optional[T]`/`List[T]` annotations) are all regular enough to
//! recognize at the text level.

mod python;

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use toolforge_core::{HandlerRecord, TypeRecord};
use walkdir::WalkDir;

/// Directory name fragments the scanner never descends into (spec §4.1:
/// "skipping dependency and cache directories").
const SKIPPED_DIR_NAMES: &[&str] = &[
    "__pycache__",
    ".venv",
    "venv",
    "node_modules",
    ".git",
    ".cache",
    "tests",
    "test",
    "dist",
    "build",
    ".mypy_cache",
    ".pytest_cache",
];

/// A single file-scoped problem encountered while scanning. Per spec §4.1,
/// unparseable files are skipped, not fatal — the diagnostic records why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDiagnostic {
    /// File the diagnostic applies to.
    pub file: PathBuf,
    /// Human-readable explanation.
    pub message: String,
}

/// The result of scanning one server's handler source tree: every
/// registered handler, every recognized type record, and diagnostics for
/// anything skipped.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Handlers discovered, in file-then-declaration order.
    pub handlers: Vec<HandlerRecord>,
    /// Type records discovered, in file-then-declaration order.
    pub types: Vec<TypeRecord>,
    /// Per-file problems that did not abort the scan.
    pub diagnostics: Vec<ScanDiagnostic>,
}

/// Error returned when a scan cannot produce a usable manifest at all
/// (spec §4.1: "a duplicate `service_name` within a server is a hard
/// error — the whole manifest is rejected").
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScanError {
    /// Two handlers in the same server declared the same `service_name`.
    #[error("duplicate service_name '{service_name}' in server '{server_name}' ({first} and {second})")]
    DuplicateServiceName {
        /// The server whose manifest is rejected.
        server_name: String,
        /// The conflicting service name.
        service_name: String,
        /// First file declaring it.
        first: String,
        /// Second file declaring it.
        second: String,
    },
}

fn is_skipped_dir(entry_name: &str) -> bool {
    entry_name.starts_with('.') || SKIPPED_DIR_NAMES.contains(&entry_name)
}

fn module_path_for(source_dir: &Path, file: &Path) -> String {
    file.strip_prefix(source_dir)
        .unwrap_or(file)
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(".")
}

/// Walk `source_dir` for `.py` files and the extra `types_files`, extracting
/// every registered handler and type record (spec §4.1).
///
/// `server_name` is stamped onto every [`HandlerRecord`] produced; the
/// scanner itself has no notion of which profile it runs for.
///
/// # Errors
///
/// Returns [`ScanError::DuplicateServiceName`] if two handlers in this scan
/// declare the same `service_name` — the whole manifest is rejected rather
/// than silently picking one (spec §4.1).
pub fn scan_source_tree(
    source_dir: &Path,
    types_files: &[PathBuf],
    server_name: &str,
) -> Result<ScanReport, ScanError> {
    let mut report = ScanReport::default();
    let mut seen_service_names: std::collections::HashMap<String, String> =
        std::collections::HashMap::new();

    let mut files: Vec<PathBuf> = WalkDir::new(source_dir)
        .into_iter()
        .filter_entry(|entry| {
            entry.file_type().is_file()
                || entry
                    .file_name()
                    .to_str()
                    .is_none_or(|name| !is_skipped_dir(name))
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some("py"))
        .map(|entry| entry.path().to_path_buf())
        .collect();
    files.sort();

    let extra_types: HashSet<PathBuf> = types_files.iter().cloned().collect();
    for extra in &extra_types {
        if !files.contains(extra) {
            files.push(extra.clone());
        }
    }
    files.sort();

    for file in &files {
        let content = match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(err) => {
                report.diagnostics.push(ScanDiagnostic {
                    file: file.clone(),
                    message: format!("could not read file: {err}"),
                });
                continue;
            }
        };

        let module_path = module_path_for(source_dir, file);
        let parsed = python::parse_module(&content, &module_path, server_name);

        for handler in parsed.handlers {
            if let Some(existing_file) =
                seen_service_names.insert(handler.service_name.clone(), file.display().to_string())
            {
                return Err(ScanError::DuplicateServiceName {
                    server_name: server_name.to_owned(),
                    service_name: handler.service_name,
                    first: existing_file,
                    second: file.display().to_string(),
                });
            }
            report.handlers.push(handler);
        }
        report.types.extend(parsed.types);
        report
            .diagnostics
            .extend(parsed.diagnostics.into_iter().map(|message| ScanDiagnostic {
                file: file.clone(),
                message,
            }));
    }

    Ok(report)
}

/// Every handler's referenced record types that were not found among the
/// scanned type records — surfaced as a lint, not an error (spec §9 Open
/// Question 1: the scanner never auto-deletes or hard-fails on a broken
/// binding, only warns).
#[must_use]
pub fn unresolved_record_types(report: &ScanReport) -> BTreeSet<String> {
    let known: BTreeSet<&str> = report.types.iter().map(|t| t.name.as_str()).collect();
    let mut missing = BTreeSet::new();
    for handler in &report.handlers {
        for param in &handler.signature {
            let kind = param.type_expression.inner_kind();
            if !param.type_expression.is_scalar() && !known.contains(kind) {
                missing.insert(kind.to_owned());
            }
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn scans_a_small_handler_tree() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("mail")).expect("mkdir");
        let mut file =
            std::fs::File::create(dir.path().join("mail/service.py")).expect("create file");
        writeln!(
            file,
            r#"
class DatePeriodFilter(BaseModel):
    from_: str = Field(description="start of range")
    to: Optional[str] = None

class MailService:
    @mcp_service(server_name="mail", service_name="mail_fetch_filter", description="Fetch mail")
    async def fetch_filter(self, user_email: str, filter_params: DatePeriodFilter, client_filter: Optional[dict] = None):
        ...
"#
        )
        .expect("write file");

        let report = scan_source_tree(dir.path(), &[], "mail").expect("scan succeeds");
        assert_eq!(report.handlers.len(), 1);
        let handler = &report.handlers[0];
        assert_eq!(handler.service_name, "mail_fetch_filter");
        assert_eq!(handler.method_name, "fetch_filter");
        assert!(handler.is_async);
        assert_eq!(handler.signature.len(), 3);
        assert_eq!(handler.signature[0].name, "user_email");
        assert!(handler.signature[0].is_required);
        assert_eq!(handler.signature[2].name, "client_filter");
        assert!(!handler.signature[2].is_required);

        assert_eq!(report.types.len(), 1);
        assert_eq!(report.types[0].name, "DatePeriodFilter");
    }

    #[test]
    fn duplicate_service_name_rejects_whole_manifest() {
        let dir = tempdir().expect("tempdir");
        let mut a = std::fs::File::create(dir.path().join("a.py")).expect("create a");
        writeln!(
            a,
            r#"
class A:
    @mcp_service(server_name="mail", service_name="dup")
    def one(self):
        ...
"#
        )
        .expect("write a");
        let mut b = std::fs::File::create(dir.path().join("b.py")).expect("create b");
        writeln!(
            b,
            r#"
class B:
    @mcp_service(server_name="mail", service_name="dup")
    def two(self):
        ...
"#
        )
        .expect("write b");

        let result = scan_source_tree(dir.path(), &[], "mail");
        assert!(matches!(result, Err(ScanError::DuplicateServiceName { .. })));
    }
}
