// ABOUTME: Editor Control Plane daemon binary — hosts the HTTP API an external editor UI drives
// ABOUTME: Reads EditorConfig from the environment and serves the routes assembled in toolforge::editor

#![forbid(unsafe_code)]

//! # Toolforge Editor
//!
//! Long-running `HTTP` server hosting the Editor Control Plane (C9):
//! profile management, tool catalog editing, and generated-server
//! lifecycle control, all driven by an external editor UI that is out of
//! scope for this toolkit.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use toolforge::config::EditorConfig;
use toolforge::editor::{self, EditorState};

#[tokio::main]
async fn main() -> Result<()> {
    toolforge::logging::init_from_env("toolforge-editor")?;

    let config = EditorConfig::from_env().context("failed to read editor configuration")?;
    let protected_profiles = protected_profiles_from_env();

    info!(
        host = %config.host,
        port = config.port,
        state_dir = %config.state_dir.display(),
        "starting toolforge-editor"
    );

    let state = Arc::new(EditorState::from_config(config.clone(), protected_profiles));

    match state.profiles.load() {
        Ok(index) => {
            let profiles: Vec<_> = index.profiles.into_values().collect();
            let reattached = state.supervisor.reconcile_orphans(&profiles).await;
            if reattached > 0 {
                info!(reattached, "reattached orphaned children from a prior run");
            }
        }
        Err(err) => {
            tracing::warn!(%err, "skipping orphan reconciliation: failed to load profile index");
        }
    }

    let app = editor::router(state);

    let address = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind editor listener on {address}"))?;

    info!(%address, "toolforge-editor listening");
    axum::serve(listener, app)
        .await
        .context("editor server loop exited with an error")?;

    Ok(())
}

/// Profile names that can never be deleted (spec §4.4), read as a
/// comma-separated list from `TOOLFORGE_PROTECTED_PROFILES`. Defaults to
/// `default`, the profile every fresh installation ships with.
fn protected_profiles_from_env() -> BTreeSet<String> {
    std::env::var("TOOLFORGE_PROTECTED_PROFILES").map_or_else(
        |_| BTreeSet::from(["default".to_owned()]),
        |raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect()
        },
    )
}
