// ABOUTME: Tool catalog routes for the Editor Control Plane (C9) — load/save-all/delete (spec §6.5)
// ABOUTME: SaveAll enforces optimistic concurrency via file_mtimes (spec §4.9)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use toolforge_core::{InternalArgsOverlay, ToolDefinition, ToolforgeError};

use crate::error::AppResult;
use crate::tool_store::FileMtimes;

use super::EditorState;

/// Tool catalog routes implementation.
pub struct ToolRoutes;

#[derive(Debug, Deserialize)]
struct ProfileQuery {
    profile: String,
}

#[derive(Debug, Deserialize)]
struct SaveAllRequest {
    tools: Vec<ToolDefinition>,
    overlay: InternalArgsOverlay,
    file_mtimes: FileMtimes,
}

impl ToolRoutes {
    /// Register every `/api/tools*` route.
    #[must_use]
    pub fn routes() -> Router<Arc<EditorState>> {
        Router::new()
            .route("/api/tools", get(Self::load))
            .route("/api/tools/save-all", post(Self::save_all))
            .route("/api/tools/:index", axum::routing::delete(Self::delete))
            .route("/api/types", get(Self::types))
    }

    /// Named record types known for `profile`'s server, lowered to the
    /// `JsonSchema` shape a `base_model` property refers to (SPEC_FULL §3,
    /// editor autocomplete).
    async fn types(
        State(state): State<Arc<EditorState>>,
        Query(query): Query<ProfileQuery>,
    ) -> AppResult<Json<serde_json::Value>> {
        let profile = resolve_profile(&state, &query.profile)?;
        let types = state
            .registry
            .load_types(&profile.name)
            .map_err(|e| ToolforgeError::new(toolforge_core::ErrorKind::HandlerError, e.to_string()))?;
        let registry = crate::type_registry::TypeRegistry::from_types(&types);
        let schemas: serde_json::Map<String, serde_json::Value> = registry
            .names()
            .into_iter()
            .filter_map(|name| {
                registry
                    .schema_for(name)
                    .map(|schema| (name.to_owned(), serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)))
            })
            .collect();
        Ok(Json(serde_json::Value::Object(schemas)))
    }

    async fn load(
        State(state): State<Arc<EditorState>>,
        Query(query): Query<ProfileQuery>,
    ) -> AppResult<Json<serde_json::Value>> {
        let profile = resolve_profile(&state, &query.profile)?;
        let loaded = state.tool_store(&profile).load()?;
        Ok(Json(serde_json::json!({
            "tools": loaded.tools,
            "overlay": loaded.overlay,
            "file_mtimes": loaded.file_mtimes,
        })))
    }

    async fn save_all(
        State(state): State<Arc<EditorState>>,
        Query(query): Query<ProfileQuery>,
        Json(body): Json<SaveAllRequest>,
    ) -> AppResult<Json<serde_json::Value>> {
        let profile = resolve_profile(&state, &query.profile)?;
        let new_mtimes = state
            .tool_store(&profile)
            .save_all(&body.tools, &body.overlay, &body.file_mtimes)?;
        Ok(Json(serde_json::json!({ "file_mtimes": new_mtimes })))
    }

    async fn delete(
        State(state): State<Arc<EditorState>>,
        Path(index): Path<usize>,
        Query(query): Query<ProfileQuery>,
    ) -> AppResult<Json<serde_json::Value>> {
        let profile = resolve_profile(&state, &query.profile)?;
        let store = state.tool_store(&profile);
        let loaded = store.load()?;
        let (new_mtimes, backup) = store.delete_tool(&loaded, index)?;
        Ok(Json(serde_json::json!({
            "file_mtimes": new_mtimes,
            "backup": backup,
        })))
    }
}

fn resolve_profile(state: &EditorState, name: &str) -> Result<toolforge_core::Profile, ToolforgeError> {
    let index = state.profiles.load()?;
    index
        .profiles
        .get(name)
        .cloned()
        .ok_or_else(|| ToolforgeError::not_found(format!("profile '{name}' not found")))
}

/// Register every `/api/tools*` route (module-level entry point used by
/// [`super::router`]).
#[must_use]
pub fn routes() -> Router<Arc<EditorState>> {
    ToolRoutes::routes()
}
