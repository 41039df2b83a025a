// ABOUTME: Process Supervisor (C8) — starts, stops, and tracks generated server child processes
// ABOUTME: One (profile, protocol) -> {pid, started_at, port, status} entry, each with its own sub-lock (spec §4.8)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

//! Supervises the lifetime of generated-server child processes. The table
//! itself is guarded by a [`dashmap::DashMap`] (spec §5 "guarded by a
//! mutex; each ... entry has its own sub-lock for long operations" — a
//! concurrent map gives us the outer guarantee, and each entry additionally
//! carries a [`tokio::sync::Mutex`] so a slow `Start`/`Stop` on one
//! `(profile, protocol)` never blocks a `Status` read on another).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use toolforge_core::{ErrorKind, Profile, ToolforgeError, ToolforgeResult};

use crate::generator::Protocol;

/// Bounded wait before `Start` gives up on a liveness check (spec §5).
const START_TIMEOUT: Duration = Duration::from_secs(15);
/// Bounded wait before `Stop` requires `force` (spec §5).
const STOP_TIMEOUT: Duration = Duration::from_secs(10);
/// Marker inserted into a spawned child's argv so a restarted supervisor can
/// recognize its own orphaned children (spec §4.8 "scanning for children
/// matching a recorded marker").
const MARKER_ENV_VAR: &str = "TOOLFORGE_SUPERVISOR_MARKER";

/// One `(profile, protocol)` pair's lifecycle state (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// No child process tracked.
    Stopped,
    /// Spawn requested, liveness not yet confirmed.
    Starting,
    /// Liveness check succeeded.
    Running,
    /// Termination requested, exit not yet confirmed.
    Stopping,
}

/// A supervised process's externally visible state (spec §4.8 `Status`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// OS process id, present while a child is tracked.
    pub pid: Option<u32>,
    /// When the child was last successfully started.
    pub started_at: Option<DateTime<Utc>>,
    /// The port the child was told to listen on (REST/stream only).
    pub port: Option<u16>,
    /// Current lifecycle state.
    pub status: ProcessStatus,
}

impl Default for ProcessInfo {
    fn default() -> Self {
        Self {
            pid: None,
            started_at: None,
            port: None,
            status: ProcessStatus::Stopped,
        }
    }
}

/// Dashboard entry: one profile/protocol's process state plus which
/// generated artifacts actually exist on disk (spec §4.8 `Dashboard`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardEntry {
    /// Profile name.
    pub profile: String,
    /// Protocol flavor.
    pub protocol: &'static str,
    /// Current process state.
    pub info: ProcessInfo,
    /// Whether the artifact for this protocol has been generated.
    pub built: bool,
}

#[derive(Debug)]
struct Entry {
    info: Mutex<ProcessInfo>,
    child: Mutex<Option<Child>>,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            info: Mutex::new(ProcessInfo::default()),
            child: Mutex::new(None),
        }
    }
}

/// C8: the in-memory process table plus the operations spec §4.8 names.
#[derive(Default, Clone)]
pub struct Supervisor {
    entries: Arc<DashMap<(String, &'static str), Arc<Entry>>>,
}

impl Supervisor {
    /// An empty supervisor with no tracked processes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(profile: &str, protocol: Protocol) -> (String, &'static str) {
        (profile.to_owned(), protocol.file_name())
    }

    fn entry(&self, profile: &str, protocol: Protocol) -> Arc<Entry> {
        self.entries
            .entry(Self::key(profile, protocol))
            .or_insert_with(|| Arc::new(Entry::default()))
            .clone()
    }

    /// Resolve the generated artifact path for `(profile, protocol)`, if it
    /// exists on disk (spec §4.8 `Start` "resolves the server artifact path
    /// from profile config; if absent, returns `NotBuilt`").
    fn artifact_path(profile: &Profile, protocol: Protocol) -> PathBuf {
        profile
            .tool_definitions_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("mcp_server")
            .join(protocol.file_name())
    }

    /// `Start(profile, protocol)` (spec §4.8): refuses if already running,
    /// spawns the artifact binary with `MCP_SERVER_PORT`/`MCP_YAML_PATH` set
    /// from profile config, and waits for a liveness check.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotBuilt`] if the artifact is absent, or
    /// [`ErrorKind::SpawnFailed`] if the child exits (or never becomes live)
    /// within [`START_TIMEOUT`].
    pub async fn start(&self, profile: &Profile, protocol: Protocol) -> ToolforgeResult<ProcessInfo> {
        let entry = self.entry(&profile.name, protocol);
        let mut info_guard = entry.info.lock().await;
        // Property 11 (spec §8): starting an already-running pair returns
        // the existing PID rather than spawning a second process.
        if info_guard.status == ProcessStatus::Running {
            return Ok(info_guard.clone());
        }

        let artifact = Self::artifact_path(profile, protocol);
        if !artifact.exists() {
            return Err(ToolforgeError::new(
                ErrorKind::NotBuilt,
                format!("no generated artifact at {}", artifact.display()),
            ));
        }

        info_guard.status = ProcessStatus::Starting;
        drop(info_guard);

        let mut command = Command::new(&artifact);
        command
            .arg(artifact.display().to_string())
            .env(MARKER_ENV_VAR, &artifact)
            .env("MCP_SERVER_PORT", profile.port.to_string())
            .env(
                "MCP_YAML_PATH",
                profile.tool_definitions_path.display().to_string(),
            )
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let spawn_result = command.spawn();
        let mut info_guard = entry.info.lock().await;
        let mut child_guard = entry.child.lock().await;
        let child = match spawn_result {
            Ok(child) => child,
            Err(err) => {
                info_guard.status = ProcessStatus::Stopped;
                return Err(ToolforgeError::new(
                    ErrorKind::SpawnFailed,
                    format!("failed to spawn {}: {err}", artifact.display()),
                ));
            }
        };
        let pid = child.id();

        let live = tokio::time::timeout(START_TIMEOUT, liveness_check(protocol, profile.port)).await;
        match live {
            Ok(true) => {
                info_guard.pid = pid;
                info_guard.started_at = Some(Utc::now());
                info_guard.port = Some(profile.port);
                info_guard.status = ProcessStatus::Running;
                *child_guard = Some(child);
                Ok(info_guard.clone())
            }
            _ => {
                info_guard.status = ProcessStatus::Stopped;
                drop(child_guard);
                // Spawn succeeded but the server never came up live; reap it
                // so no orphan lingers (spec §7 "a failed Start reaps the
                // child").
                let mut child = child;
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(ToolforgeError::new(
                    ErrorKind::SpawnFailed,
                    format!("{} did not become live within {START_TIMEOUT:?}", artifact.display()),
                ))
            }
        }
    }

    /// `Stop(profile, protocol, force)` (spec §4.8): sends a graceful
    /// termination signal (`SIGTERM` on Unix, via [`send_terminate`]) and,
    /// if `force` and the process is still alive after [`STOP_TIMEOUT`],
    /// kills it.
    ///
    /// # Errors
    ///
    /// Never returns an error for a process that is already stopped (that
    /// is a no-op, matching "a process absent from the table is `stopped`").
    pub async fn stop(&self, profile_name: &str, protocol: Protocol, force: bool) -> ToolforgeResult<ProcessInfo> {
        let entry = self.entry(profile_name, protocol);
        let mut info_guard = entry.info.lock().await;
        let mut child_guard = entry.child.lock().await;

        let Some(mut child) = child_guard.take() else {
            // A reattached orphan (spec §4.8 reconciliation) has a `pid` but
            // no waitable `Child` — this process isn't its parent.
            if info_guard.status == ProcessStatus::Running {
                if let Some(pid) = info_guard.pid {
                    return stop_reattached(&mut *info_guard, pid, force, profile_name, protocol).await;
                }
            }
            info_guard.status = ProcessStatus::Stopped;
            return Ok(info_guard.clone());
        };

        info_guard.status = ProcessStatus::Stopping;

        if let Some(pid) = child.id() {
            send_terminate(pid);
        }

        let graceful = tokio::time::timeout(STOP_TIMEOUT, child.wait()).await;
        if graceful.is_err() {
            if force {
                let _ = child.start_kill();
                let _ = child.wait().await;
            } else {
                *child_guard = Some(child);
                info_guard.status = ProcessStatus::Running;
                return Err(ToolforgeError::new(
                    ErrorKind::SpawnFailed,
                    format!("{profile_name}/{} did not exit within {STOP_TIMEOUT:?}; retry with force", protocol.file_name()),
                ));
            }
        }

        info_guard.pid = None;
        info_guard.started_at = None;
        info_guard.status = ProcessStatus::Stopped;
        Ok(info_guard.clone())
    }

    /// `Restart(profile, protocol)` (spec §4.8): `Stop` then `Start`.
    ///
    /// # Errors
    ///
    /// Propagates whatever `stop` or `start` returns.
    pub async fn restart(&self, profile: &Profile, protocol: Protocol) -> ToolforgeResult<ProcessInfo> {
        self.stop(&profile.name, protocol, true).await?;
        self.start(profile, protocol).await
    }

    /// `Status(profile, protocol)` (spec §4.8): a process absent from the
    /// table reads as `stopped`.
    pub async fn status(&self, profile_name: &str, protocol: Protocol) -> ProcessInfo {
        match self.entries.get(&Self::key(profile_name, protocol)) {
            Some(entry) => entry.info.lock().await.clone(),
            None => ProcessInfo::default(),
        }
    }

    /// `Dashboard()` (spec §4.8): state for every `(profile, protocol)` pair
    /// mentioned in `profiles`, plus which protocols have a generated
    /// artifact on disk.
    pub async fn dashboard(&self, profiles: &[Profile]) -> Vec<DashboardEntry> {
        let mut out = Vec::new();
        for profile in profiles {
            for protocol in [Protocol::Rest, Protocol::Stream, Protocol::Stdio] {
                let info = self.status(&profile.name, protocol).await;
                let built = Self::artifact_path(profile, protocol).exists();
                out.push(DashboardEntry {
                    profile: profile.name.clone(),
                    protocol: protocol.file_name(),
                    info,
                    built,
                });
            }
        }
        out
    }

    /// Scan `/proc` for already-running children bearing `MARKER_ENV_VAR`
    /// set to one of `profiles`' generated-artifact paths, and reattach any
    /// match's PID into this supervisor's table as `running` (spec §4.8
    /// "detect orphan children across its own restarts by scanning for
    /// children matching a recorded marker ... and reattaching where
    /// possible"). Returns the number of entries reattached.
    ///
    /// A reattached entry gets `pid`/`port`/`status` but no
    /// [`tokio::process::Child`] handle — the OS only lets a process
    /// `wait()` on its own children, and a reattached orphan isn't this
    /// process's child. [`Supervisor::stop`] accounts for this: when an
    /// entry is `running` with no tracked `Child`, it signals by PID and
    /// polls [`process_alive`] instead of `child.wait()`.
    #[cfg(target_os = "linux")]
    pub async fn reconcile_orphans(&self, profiles: &[Profile]) -> usize {
        let mut reattached = 0;
        for profile in profiles {
            for protocol in [Protocol::Rest, Protocol::Stream, Protocol::Stdio] {
                let key = Self::key(&profile.name, protocol);
                if self.entries.contains_key(&key) {
                    continue;
                }
                let artifact = Self::artifact_path(profile, protocol);
                let marker_value = artifact.display().to_string();
                let Some(pid) = find_pid_with_marker(&marker_value) else {
                    continue;
                };
                let entry = self.entry(&profile.name, protocol);
                let mut info = entry.info.lock().await;
                info.pid = Some(pid);
                info.status = ProcessStatus::Running;
                info.port = matches!(protocol, Protocol::Rest | Protocol::Stream).then_some(profile.port);
                reattached += 1;
                tracing::info!(
                    profile = profile.name.as_str(),
                    protocol = protocol.file_name(),
                    pid,
                    "reattached orphaned child"
                );
            }
        }
        reattached
    }

    /// No `/proc` to scan off Linux; a fresh supervisor on these targets
    /// starts every entry at `stopped` and relies on callers re-issuing
    /// `Start`, which is safe because `Start` itself refuses only when
    /// already `running`.
    #[cfg(not(target_os = "linux"))]
    #[allow(clippy::unused_async)]
    pub async fn reconcile_orphans(&self, _profiles: &[Profile]) -> usize {
        0
    }
}

/// Read `/proc/<pid>/environ` for every numeric entry under `/proc` and
/// return the first pid whose environment carries `MARKER_ENV_VAR` set to
/// `marker_value` (spec §4.8 "scanning for children matching a recorded
/// marker"). A process that exits mid-scan, or whose `environ` this process
/// lacks permission to read, is silently skipped rather than aborting the
/// scan.
#[cfg(target_os = "linux")]
fn find_pid_with_marker(marker_value: &str) -> Option<u32> {
    let marker_entry = format!("{MARKER_ENV_VAR}={marker_value}");
    let proc_entries = std::fs::read_dir("/proc").ok()?;
    for entry in proc_entries.flatten() {
        let file_name = entry.file_name();
        let Some(pid_str) = file_name.to_str() else {
            continue;
        };
        let Ok(pid) = pid_str.parse::<u32>() else {
            continue;
        };
        let Ok(environ) = std::fs::read(entry.path().join("environ")) else {
            continue;
        };
        let matches = environ
            .split(|&byte| byte == 0)
            .any(|var| var == marker_entry.as_bytes());
        if matches {
            return Some(pid);
        }
    }
    None
}

/// Whether `pid` still exists, checked with a signal-0 `kill` (sends no
/// signal, only reports `ESRCH` if the process is gone). Used by
/// `Supervisor::stop` to poll a reattached orphan it holds no waitable
/// `Child` handle for.
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let raw_pid = i32::try_from(pid).unwrap_or(i32::MAX);
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw_pid), None).is_ok()
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}

/// Send `SIGTERM` to `pid` (spec §4.8 `Stop` "sends a graceful termination
/// signal"). Uses `nix`'s safe wrapper over `kill(2)` rather than a raw
/// `unsafe` call, since this crate denies `unsafe_code`. A process that has
/// already exited is not an error here — `Stop`'s subsequent `child.wait()`
/// observes the exit either way.
#[cfg(unix)]
fn send_terminate(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw_pid = i32::try_from(pid).unwrap_or(i32::MAX);
    if let Err(err) = kill(Pid::from_raw(raw_pid), Signal::SIGTERM) {
        tracing::debug!(pid, %err, "SIGTERM delivery failed (process may have already exited)");
    }
}

/// No signal-sending crate is wired up for non-Unix targets; `Stop` falls
/// back to waiting out [`STOP_TIMEOUT`] and `force`-killing, same as before
/// this spec §4.8 behavior was added for Unix.
#[cfg(not(unix))]
fn send_terminate(_pid: u32) {}

/// Send `SIGKILL` to `pid`, the `force` fallback for a reattached orphan
/// that ignored `SIGTERM` (there is no `Child::start_kill` to call — see
/// [`stop_reattached`]).
#[cfg(unix)]
fn send_kill(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw_pid = i32::try_from(pid).unwrap_or(i32::MAX);
    let _ = kill(Pid::from_raw(raw_pid), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn send_kill(_pid: u32) {}

/// `Stop` for an entry reattached by [`Supervisor::reconcile_orphans`]:
/// signal by PID and poll [`process_alive`] instead of `Child::wait`, since
/// a reattached orphan has no waitable handle.
async fn stop_reattached(
    info: &mut ProcessInfo,
    pid: u32,
    force: bool,
    profile_name: &str,
    protocol: Protocol,
) -> ToolforgeResult<ProcessInfo> {
    info.status = ProcessStatus::Stopping;
    send_terminate(pid);

    let deadline = tokio::time::Instant::now() + STOP_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if !process_alive(pid) {
            info.pid = None;
            info.started_at = None;
            info.status = ProcessStatus::Stopped;
            return Ok(info.clone());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    if !force {
        info.status = ProcessStatus::Running;
        return Err(ToolforgeError::new(
            ErrorKind::SpawnFailed,
            format!("{profile_name}/{} did not exit within {STOP_TIMEOUT:?}; retry with force", protocol.file_name()),
        ));
    }

    send_kill(pid);
    tokio::time::sleep(Duration::from_millis(200)).await;
    info.pid = None;
    info.started_at = None;
    info.status = ProcessStatus::Stopped;
    Ok(info.clone())
}

/// `starting -> running` liveness check (spec §4.8): port-open for
/// REST/stream, a bounded sleep stand-in for stdio's "first-frame echo"
/// since a stdio child has no socket to probe from the supervisor side.
async fn liveness_check(protocol: Protocol, port: u16) -> bool {
    match protocol {
        Protocol::Rest | Protocol::Stream => {
            for _ in 0..30 {
                if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            false
        }
        Protocol::Stdio => {
            tokio::time::sleep(Duration::from_millis(200)).await;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn profile(name: &str, port: u16) -> Profile {
        Profile {
            name: name.into(),
            source_dir: PathBuf::from("/src"),
            template_definitions_path: PathBuf::from("/templates.json"),
            tool_definitions_path: PathBuf::from(format!("/{name}/tool_definitions.json")),
            backup_dir: PathBuf::from(format!("/{name}/backups")),
            types_files: vec![],
            host: "127.0.0.1".into(),
            port,
            base_profile: None,
        }
    }

    #[tokio::test]
    async fn status_of_untracked_pair_is_stopped() {
        let supervisor = Supervisor::new();
        let info = supervisor.status("outlook", Protocol::Rest).await;
        assert_eq!(info.status, ProcessStatus::Stopped);
        assert!(info.pid.is_none());
    }

    #[tokio::test]
    async fn start_without_artifact_is_not_built() {
        let supervisor = Supervisor::new();
        let profile = profile("outlook", 9101);
        let err = supervisor
            .start(&profile, Protocol::Rest)
            .await
            .expect_err("no artifact on disk");
        assert_eq!(err.kind, ErrorKind::NotBuilt);
    }

    /// Property 11 (spec §8): starting an already-running pair returns the
    /// existing PID and does not attempt a second spawn.
    #[tokio::test]
    async fn start_on_already_running_pair_returns_existing_pid_without_respawning() {
        let supervisor = Supervisor::new();
        let entry = supervisor.entry("outlook", Protocol::Rest);
        {
            let mut info = entry.info.lock().await;
            info.status = ProcessStatus::Running;
            info.pid = Some(4242);
            info.port = Some(9101);
        }

        let profile = profile("outlook", 9101);
        let info = supervisor.start(&profile, Protocol::Rest).await.expect("already running is not an error");
        assert_eq!(info.pid, Some(4242));
        assert_eq!(info.status, ProcessStatus::Running);
    }

    #[tokio::test]
    async fn stop_on_untracked_pair_is_a_no_op() {
        let supervisor = Supervisor::new();
        let info = supervisor.stop("outlook", Protocol::Rest, false).await.expect("no error");
        assert_eq!(info.status, ProcessStatus::Stopped);
    }

    #[tokio::test]
    async fn dashboard_reports_every_protocol_for_every_profile() {
        let supervisor = Supervisor::new();
        let profiles = vec![profile("outlook", 9101)];
        let dashboard = supervisor.dashboard(&profiles).await;
        assert_eq!(dashboard.len(), 3);
        assert!(dashboard.iter().all(|e| !e.built));
    }

    /// Spec §4.8 MUST: a child bearing this supervisor's marker, spawned by
    /// some prior process, is detected and reattached rather than left
    /// invisible to `Status`/`Stop`.
    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn reconcile_orphans_reattaches_a_process_bearing_the_marker() {
        let supervisor = Supervisor::new();
        let test_profile = profile("outlook_orphan", 9191);
        let artifact = Supervisor::artifact_path(&test_profile, Protocol::Rest);

        let mut child = Command::new("sleep")
            .arg("5")
            .env(MARKER_ENV_VAR, artifact.display().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn a throwaway marked process");
        let pid = child.id().expect("spawned child has a pid");

        let reattached = supervisor.reconcile_orphans(std::slice::from_ref(&test_profile)).await;
        assert_eq!(reattached, 1);

        let info = supervisor.status(&test_profile.name, Protocol::Rest).await;
        assert_eq!(info.pid, Some(pid));
        assert_eq!(info.status, ProcessStatus::Running);

        let _ = child.start_kill();
        let _ = child.wait().await;
    }

    /// `Stop` on a reattached orphan (no tracked [`Child`]) signals by PID
    /// and polls liveness instead of `Child::wait`.
    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn stop_terminates_a_reattached_orphan_without_a_child_handle() {
        let supervisor = Supervisor::new();
        let test_profile = profile("outlook_orphan_stop", 9192);
        let artifact = Supervisor::artifact_path(&test_profile, Protocol::Rest);

        let mut child = Command::new("sleep")
            .arg("30")
            .env(MARKER_ENV_VAR, artifact.display().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn a throwaway marked process");
        let pid = child.id().expect("spawned child has a pid");

        let reattached = supervisor.reconcile_orphans(std::slice::from_ref(&test_profile)).await;
        assert_eq!(reattached, 1);

        let info = supervisor
            .stop(&test_profile.name, Protocol::Rest, false)
            .await
            .expect("reattached orphan stops gracefully");
        assert_eq!(info.status, ProcessStatus::Stopped);
        assert!(!process_alive(pid));

        let _ = child.wait().await;
    }
}
