// ABOUTME: Structured logging setup for the editor, generated servers, and the CLI
// ABOUTME: Configures tracing subscriber format, level, and noise reduction for observability
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

//! Logging configuration shared by every Toolforge binary.

use anyhow::Result;
use std::env;
use std::io;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for the global tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format, for local development.
    Pretty,
    /// One JSON object per line, for ingestion by log collectors.
    Json,
    /// Single-line, no ANSI, minimal fields — for supervised child processes
    /// whose stdout the supervisor captures into its own log stream.
    Compact,
}

/// Logging configuration for one process.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Base log level applied when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Include file/line in each event.
    pub include_location: bool,
    /// Name attached to every event via `service.name`.
    pub service_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
            include_location: false,
            service_name: "toolforge".into(),
        }
    }
}

impl LoggingConfig {
    /// Read logging configuration from the process environment
    /// (`TOOLFORGE_LOG_LEVEL`, `LOG_FORMAT`, `LOG_INCLUDE_LOCATION`,
    /// `SERVICE_NAME`). `RUST_LOG`, if set, overrides `TOOLFORGE_LOG_LEVEL`
    /// at `init` time with a full `EnvFilter` directive.
    #[must_use]
    pub fn from_env(default_service_name: &str) -> Self {
        let level = env::var("TOOLFORGE_LOG_LEVEL").unwrap_or_else(|_| "info".into());
        let format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        };
        Self {
            level,
            format,
            include_location: env::var("LOG_INCLUDE_LOCATION").is_ok(),
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| default_service_name.into()),
        }
    }

    /// Initialize the global tracing subscriber. Safe to call at most once
    /// per process (generated servers call this from their own `main`, the
    /// editor from its own, the CLI only when `--verbose`/subcommands need
    /// it).
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed.
    pub fn init(&self) -> Result<()> {
        let env_filter = env::var("RUST_LOG").map_or_else(
            |_| EnvFilter::new(&self.level),
            |directive| EnvFilter::new(directive),
        );

        let registry = tracing_subscriber::registry().with(env_filter);

        match self.format {
            LogFormat::Json => {
                let layer = fmt::layer()
                    .with_file(self.include_location)
                    .with_line_number(self.include_location)
                    .with_target(true)
                    .with_writer(io::stdout)
                    .json();
                registry.with(layer).try_init()?;
            }
            LogFormat::Pretty => {
                let layer = fmt::layer()
                    .with_file(self.include_location)
                    .with_line_number(self.include_location)
                    .with_target(true)
                    .with_writer(io::stdout);
                registry.with(layer).try_init()?;
            }
            LogFormat::Compact => {
                let layer = fmt::layer()
                    .compact()
                    .with_file(false)
                    .with_line_number(false)
                    .with_target(false)
                    .with_writer(io::stdout);
                registry.with(layer).try_init()?;
            }
        }

        info!(
            service.name = %self.service_name,
            log.level = %self.level,
            "toolforge logging initialized"
        );
        Ok(())
    }
}

/// Initialize logging from the environment with `service_name` as the
/// fallback `SERVICE_NAME`.
///
/// # Errors
///
/// Returns an error if the subscriber is already initialized.
pub fn init_from_env(service_name: &str) -> Result<()> {
    LoggingConfig::from_env(service_name).init()
}
