// ABOUTME: Profile routes for the Editor Control Plane (C9) — list/create/derive/delete (spec §6.5)
// ABOUTME: Enforces identifier/port validity and confirm-token equality per spec §4.9
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use toolforge_core::{Profile, ToolforgeError};

use crate::error::AppResult;
use crate::profile_registry::ProfileRegistry;

use super::EditorState;

/// Profile routes implementation, mirroring the teacher's `XxxRoutes`
/// convention.
pub struct ProfileRoutes;

impl ProfileRoutes {
    /// Register every `/api/profiles*` route.
    #[must_use]
    pub fn routes() -> Router<Arc<EditorState>> {
        Router::new()
            .route("/api/profiles", get(Self::list).post(Self::create))
            .route("/api/profiles/derive", post(Self::derive))
            .route("/api/delete-mcp-profile", delete(Self::delete))
            .route("/api/profiles/lint", get(Self::lint))
    }

    /// Non-fatal binding-health check for one profile's tool catalog against
    /// its server's current registry (spec §9 Open Question 1). Never
    /// mutates the catalog — a caller decides whether to act on a warning.
    async fn lint(
        State(state): State<Arc<EditorState>>,
        Query(query): Query<LintQuery>,
    ) -> AppResult<Json<serde_json::Value>> {
        let index = state.profiles.load()?;
        let profile = index
            .profiles
            .get(&query.profile)
            .cloned()
            .ok_or_else(|| ToolforgeError::not_found(format!("profile '{}' not found", query.profile)))?;

        let server_name = profile.base_profile.as_deref().unwrap_or(&profile.name);
        let loaded = state.tool_store(&profile).load()?;
        let warnings = ProfileRegistry::lint_bindings(server_name, &loaded.tools, &state.registry);
        Ok(Json(serde_json::json!({ "warnings": warnings })))
    }

    async fn list(State(state): State<Arc<EditorState>>) -> AppResult<Json<serde_json::Value>> {
        let index = state.profiles.load()?;
        Ok(Json(serde_json::json!({ "profiles": index.profiles })))
    }

    async fn create(
        State(state): State<Arc<EditorState>>,
        Json(body): Json<CreateProfileRequest>,
    ) -> AppResult<Json<serde_json::Value>> {
        validate_new_profile(&body.name, body.port)?;

        let profile_dir = state.config.state_dir.join("profiles").join(&body.name);
        let profile = Profile {
            name: body.name.clone(),
            source_dir: PathBuf::from(&body.source_dir),
            template_definitions_path: PathBuf::from(&body.template_definitions_path),
            tool_definitions_path: profile_dir.join("tool_definitions.json"),
            backup_dir: profile_dir.join("backups"),
            types_files: body.types_files.into_iter().map(PathBuf::from).collect(),
            host: body.host.unwrap_or_else(|| "127.0.0.1".into()),
            port: body.port,
            base_profile: None,
        };

        let index = state.profiles.load()?;
        let index = state.profiles.create(index, profile)?;
        Ok(Json(serde_json::json!({ "profiles": index.profiles })))
    }

    async fn derive(
        State(state): State<Arc<EditorState>>,
        Json(body): Json<DeriveProfileRequest>,
    ) -> AppResult<Json<serde_json::Value>> {
        validate_new_profile(&body.new_name, body.port)?;

        let profile_dir = state.config.state_dir.join("profiles").join(&body.new_name);
        let index = state.profiles.load()?;
        let index = state.profiles.derive(
            index,
            &body.base_name,
            &body.new_name,
            body.port,
            profile_dir.join("tool_definitions.json"),
            profile_dir.join("backups"),
        )?;
        Ok(Json(serde_json::json!({ "profiles": index.profiles })))
    }

    async fn delete(
        State(state): State<Arc<EditorState>>,
        Json(body): Json<DeleteProfileRequest>,
    ) -> AppResult<Json<serde_json::Value>> {
        let index = state.profiles.load()?;
        let index = state.profiles.delete(index, &body.name, &body.confirm)?;
        Ok(Json(serde_json::json!({ "profiles": index.profiles })))
    }
}

/// Shared identifier/port validation for `create` and `derive` (spec §4.9).
fn validate_new_profile(name: &str, port: u16) -> Result<(), ToolforgeError> {
    if !ProfileRegistry::is_valid_identifier(name) {
        return Err(ToolforgeError::validation(format!(
            "'{name}' is not a valid profile identifier (letters, digits, underscore; first character non-digit)"
        )));
    }
    if !ProfileRegistry::is_valid_port(u32::from(port)) {
        return Err(ToolforgeError::validation(format!(
            "port {port} is outside the allowed range [1024, 65535]"
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CreateProfileRequest {
    name: String,
    source_dir: String,
    template_definitions_path: String,
    #[serde(default)]
    types_files: Vec<String>,
    host: Option<String>,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct DeriveProfileRequest {
    base_name: String,
    new_name: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct LintQuery {
    profile: String,
}

#[derive(Debug, Deserialize)]
struct DeleteProfileRequest {
    name: String,
    confirm: String,
}

/// Register every `/api/profiles*` route (module-level entry point used by
/// [`super::router`]).
#[must_use]
pub fn routes() -> Router<Arc<EditorState>> {
    ProfileRoutes::routes()
}
