// ABOUTME: Server lifecycle + generator-trigger routes for the Editor Control Plane (C9, spec §6.5)
// ABOUTME: Wraps the process supervisor (C8) and the server generator (C6) behind one small HTTP surface
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use toolforge_core::{Profile, ToolforgeError};

use crate::error::AppResult;
use crate::generator::{self, Protocol};

use super::EditorState;

/// Server lifecycle and generator routes implementation.
pub struct ServerRoutes;

#[derive(Debug, Deserialize)]
struct ProfileProtocolQuery {
    profile: String,
    protocol: ProtocolParam,
}

/// `Stop(profile, protocol, force=false)` (spec.md §4.8): `force` defaults
/// to `false` so a caller gets the graceful `SIGTERM`-then-timeout path
/// unless it explicitly opts into killing on timeout.
#[derive(Debug, Deserialize)]
struct StopQuery {
    profile: String,
    protocol: ProtocolParam,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
struct ProfileQuery {
    profile: String,
}

/// Wire-level spelling of [`Protocol`] used by query strings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ProtocolParam {
    Rest,
    Stream,
    Stdio,
}

impl From<ProtocolParam> for Protocol {
    fn from(value: ProtocolParam) -> Self {
        match value {
            ProtocolParam::Rest => Self::Rest,
            ProtocolParam::Stream => Self::Stream,
            ProtocolParam::Stdio => Self::Stdio,
        }
    }
}

impl ServerRoutes {
    /// Register every `/api/server*` route.
    #[must_use]
    pub fn routes() -> Router<Arc<EditorState>> {
        Router::new()
            .route("/api/server/status", get(Self::status))
            .route("/api/server/start", post(Self::start))
            .route("/api/server/stop", post(Self::stop))
            .route("/api/server/restart", post(Self::restart))
            .route("/api/server/dashboard", get(Self::dashboard))
            .route("/api/server-generator", post(Self::generate))
    }

    async fn status(
        State(state): State<Arc<EditorState>>,
        Query(query): Query<ProfileProtocolQuery>,
    ) -> AppResult<Json<serde_json::Value>> {
        let info = state
            .supervisor
            .status(&query.profile, query.protocol.into())
            .await;
        Ok(Json(serde_json::to_value(info).unwrap_or(serde_json::Value::Null)))
    }

    async fn start(
        State(state): State<Arc<EditorState>>,
        Query(query): Query<ProfileProtocolQuery>,
    ) -> AppResult<Json<serde_json::Value>> {
        let profile = resolve_profile(&state, &query.profile)?;
        let info = state.supervisor.start(&profile, query.protocol.into()).await?;
        Ok(Json(serde_json::to_value(info).unwrap_or(serde_json::Value::Null)))
    }

    async fn stop(
        State(state): State<Arc<EditorState>>,
        Query(query): Query<StopQuery>,
    ) -> AppResult<Json<serde_json::Value>> {
        let info = state
            .supervisor
            .stop(&query.profile, query.protocol.into(), query.force)
            .await?;
        Ok(Json(serde_json::to_value(info).unwrap_or(serde_json::Value::Null)))
    }

    async fn restart(
        State(state): State<Arc<EditorState>>,
        Query(query): Query<ProfileProtocolQuery>,
    ) -> AppResult<Json<serde_json::Value>> {
        let profile = resolve_profile(&state, &query.profile)?;
        let info = state.supervisor.restart(&profile, query.protocol.into()).await?;
        Ok(Json(serde_json::to_value(info).unwrap_or(serde_json::Value::Null)))
    }

    async fn dashboard(State(state): State<Arc<EditorState>>) -> AppResult<Json<serde_json::Value>> {
        let index = state.profiles.load()?;
        let profiles: Vec<Profile> = index.profiles.into_values().collect();
        let entries = state.supervisor.dashboard(&profiles).await;
        Ok(Json(serde_json::json!({ "dashboard": entries })))
    }

    async fn generate(
        State(state): State<Arc<EditorState>>,
        Query(query): Query<ProfileQuery>,
    ) -> AppResult<Json<serde_json::Value>> {
        let profile = resolve_profile(&state, &query.profile)?;
        let loaded = state.tool_store(&profile).load()?;

        generator::validate_service_bindings(&loaded.tools, &state.registry, &profile.name)?;

        let mut written = Vec::new();
        for protocol in [Protocol::Rest, Protocol::Stream, Protocol::Stdio] {
            let content = match protocol {
                Protocol::Rest => generator::rest::render(&profile, &loaded.tools)?,
                Protocol::Stream => generator::stream::render(&profile, &loaded.tools)?,
                Protocol::Stdio => generator::stdio::render(&profile, &loaded.tools)?,
            };
            let profile_dir = profile
                .tool_definitions_path
                .parent()
                .map_or_else(|| std::path::PathBuf::from("."), std::path::Path::to_path_buf);
            let path = generator::write_artifact(&profile_dir, protocol, &content)?;
            written.push(path.display().to_string());
        }

        Ok(Json(serde_json::json!({ "generated": written })))
    }
}

fn resolve_profile(state: &EditorState, name: &str) -> Result<Profile, ToolforgeError> {
    let index = state.profiles.load()?;
    index
        .profiles
        .get(name)
        .cloned()
        .ok_or_else(|| ToolforgeError::not_found(format!("profile '{name}' not found")))
}

/// Register every `/api/server*` route (module-level entry point used by
/// [`super::router`]).
#[must_use]
pub fn routes() -> Router<Arc<EditorState>> {
    ServerRoutes::routes()
}
