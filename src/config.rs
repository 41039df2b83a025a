// ABOUTME: Environment-derived configuration for the editor control plane and generated servers
// ABOUTME: Mirrors the env vars a generated server reads at startup (spec §6.6)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

//! Runtime configuration, read once at process startup from the
//! environment.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Configuration for the `toolforge-editor` control-plane process.
#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Directory the profile index, tool catalogs, overlays, and backups
    /// live under.
    pub state_dir: PathBuf,
    /// Listen host for the editor's own HTTP API.
    pub host: String,
    /// Listen port for the editor's own HTTP API.
    pub port: u16,
    /// Directory generated server artifacts are written into (spec §4.6).
    pub generated_dir: PathBuf,
}

impl EditorConfig {
    /// Read editor configuration from the environment, applying the same
    /// defaults a freshly installed toolkit ships with.
    ///
    /// # Errors
    ///
    /// Returns an error if `TOOLFORGE_PORT` is set but not a valid `u16`.
    pub fn from_env() -> Result<Self> {
        let state_dir = env::var("TOOLFORGE_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_state_dir());
        let host = env::var("TOOLFORGE_EDITOR_HOST").unwrap_or_else(|_| "127.0.0.1".into());
        let port = env::var("TOOLFORGE_EDITOR_PORT")
            .unwrap_or_else(|_| "8765".into())
            .parse::<u16>()
            .context("TOOLFORGE_EDITOR_PORT must be a valid port number")?;
        let generated_dir = env::var("TOOLFORGE_GENERATED_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| state_dir.join("generated"));

        Ok(Self {
            state_dir,
            host,
            port,
            generated_dir,
        })
    }

    /// Path to the profile index document (spec §6.1).
    #[must_use]
    pub fn profile_index_path(&self) -> PathBuf {
        self.state_dir.join("profiles.json")
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolforge")
}

/// The configuration a generated server reads from its environment at
/// startup (spec §6.6). `toolforge-editor` does not construct this directly
/// — it is read back by the generated `main` the server generator emits —
/// but the shape is shared so the generator and the dispatcher runtime agree
/// on variable names.
#[derive(Debug, Clone)]
pub struct GeneratedServerConfig {
    /// Profile this server instance was generated for.
    pub profile_name: String,
    /// Listen host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Path to the tool catalog this server was generated from.
    pub tool_definitions_path: PathBuf,
}

impl GeneratedServerConfig {
    /// Listen-port override read by every generated server at startup
    /// (spec §6.6).
    pub const PORT_VAR: &'static str = "MCP_SERVER_PORT";
    /// Tool-catalog-path override read by every generated server at startup
    /// (spec §6.6).
    pub const TOOL_DEFINITIONS_PATH_VAR: &'static str = "MCP_YAML_PATH";

    /// Read a generated server's configuration from its environment,
    /// falling back to the `profile_name`/`host`/`port`/`tool_definitions_path`
    /// baked into the artifact at generation time when the corresponding
    /// override variable is unset (spec §4.6 "Ports and paths").
    ///
    /// # Errors
    ///
    /// Returns an error if `MCP_SERVER_PORT` is set but not a valid `u16`.
    pub fn from_env_or_defaults(
        profile_name: &str,
        default_host: &str,
        default_port: u16,
        default_tool_definitions_path: &std::path::Path,
    ) -> Result<Self> {
        let port = match env::var(Self::PORT_VAR) {
            Ok(raw) => raw
                .parse::<u16>()
                .context("MCP_SERVER_PORT must be a valid port number")?,
            Err(_) => default_port,
        };
        let tool_definitions_path = env::var(Self::TOOL_DEFINITIONS_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_tool_definitions_path.to_path_buf());

        Ok(Self {
            profile_name: profile_name.to_owned(),
            host: default_host.to_owned(),
            port,
            tool_definitions_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn editor_config_applies_defaults_when_unset() {
        for var in [
            "TOOLFORGE_STATE_DIR",
            "TOOLFORGE_EDITOR_HOST",
            "TOOLFORGE_EDITOR_PORT",
            "TOOLFORGE_GENERATED_DIR",
        ] {
            env::remove_var(var);
        }
        let config = EditorConfig::from_env().expect("defaults are always valid");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8765);
    }

    #[test]
    #[serial]
    fn editor_config_rejects_invalid_port() {
        env::set_var("TOOLFORGE_EDITOR_PORT", "not-a-port");
        let result = EditorConfig::from_env();
        env::remove_var("TOOLFORGE_EDITOR_PORT");
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn generated_server_config_falls_back_to_baked_in_defaults() {
        env::remove_var(GeneratedServerConfig::PORT_VAR);
        env::remove_var(GeneratedServerConfig::TOOL_DEFINITIONS_PATH_VAR);
        let config = GeneratedServerConfig::from_env_or_defaults(
            "outlook",
            "127.0.0.1",
            9001,
            &PathBuf::from("/etc/toolforge/outlook/tools.json"),
        )
        .expect("defaults are always valid");
        assert_eq!(config.port, 9001);
        assert_eq!(
            config.tool_definitions_path,
            PathBuf::from("/etc/toolforge/outlook/tools.json")
        );
    }

    #[test]
    #[serial]
    fn generated_server_config_env_override_wins() {
        env::set_var(GeneratedServerConfig::PORT_VAR, "9500");
        let config = GeneratedServerConfig::from_env_or_defaults(
            "outlook",
            "127.0.0.1",
            9001,
            &PathBuf::from("/etc/toolforge/outlook/tools.json"),
        )
        .expect("valid port override");
        env::remove_var(GeneratedServerConfig::PORT_VAR);
        assert_eq!(config.port, 9500);
    }

    #[test]
    #[serial]
    fn generated_server_config_rejects_invalid_port_override() {
        env::set_var(GeneratedServerConfig::PORT_VAR, "not-a-port");
        let result = GeneratedServerConfig::from_env_or_defaults(
            "outlook",
            "127.0.0.1",
            9001,
            &PathBuf::from("/etc/toolforge/outlook/tools.json"),
        );
        env::remove_var(GeneratedServerConfig::PORT_VAR);
        assert!(result.is_err());
    }
}
