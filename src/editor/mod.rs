// ABOUTME: Editor Control Plane (C9) — the HTTP API an external editor UI drives
// ABOUTME: Profiles, tool catalog, and server lifecycle routes, all built on shared EditorState (spec §4.9, §6.5)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

//! The only component allowed to invoke [`crate::profile_registry::ProfileRegistry`]'s
//! destructive operations (spec §4.9). Organized by domain, mirroring the
//! teacher's own `routes/` layout: one module per resource, each exposing a
//! `routes()` constructor that threads a shared, `Clone`-able context
//! through every handler.

pub mod profiles;
pub mod servers;
pub mod tools;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::{BoxError, Router};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::EditorConfig;
use crate::profile_registry::ProfileRegistry;
use crate::registry_store::RegistryStore;
use crate::supervisor::Supervisor;
use crate::tool_store::ToolStore;

/// Context shared across every editor API handler (spec §4.9): the profile
/// registry, the per-server registry store, and the process supervisor.
/// Cloning is cheap — everything inside is already reference-counted or
/// trivially `Clone`.
#[derive(Clone)]
pub struct EditorState {
    /// Process-wide configuration read at startup.
    pub config: EditorConfig,
    /// C4: profile lifecycle.
    pub profiles: ProfileRegistry,
    /// C2: per-server handler registries.
    pub registry: RegistryStore,
    /// C8: generated-server process table.
    pub supervisor: Supervisor,
}

impl EditorState {
    /// Build the state a fresh `toolforge-editor` process wires up at
    /// startup, deriving `ProfileRegistry`/`RegistryStore` locations from
    /// `config` and starting with an empty [`Supervisor`].
    #[must_use]
    pub fn from_config(config: EditorConfig, protected_profiles: BTreeSet<String>) -> Self {
        let profiles = ProfileRegistry::new(
            config.profile_index_path(),
            config.generated_dir.clone(),
            config.state_dir.join("mcp_service_registry"),
            protected_profiles,
        );
        let registry = RegistryStore::new(config.state_dir.join("mcp_service_registry"));
        Self {
            config,
            profiles,
            registry,
            supervisor: Supervisor::new(),
        }
    }

    /// Construct the [`ToolStore`] for `profile`'s catalog (spec §4.3: one
    /// store per profile, rooted at that profile's own paths), watching the
    /// mtime of the registry file its tools bind against alongside the
    /// catalog and overlay (spec §4.3 `Load`'s "tool catalog, overlay,
    /// registry").
    #[must_use]
    pub fn tool_store(&self, profile: &toolforge_core::Profile) -> ToolStore {
        let server_name = profile.base_profile.as_deref().unwrap_or(&profile.name);
        let registry_path = self.registry.path_for_server(server_name);
        ToolStore::new(profile.tool_definitions_path.clone(), profile.backup_dir.clone())
            .with_registry_paths(vec![registry_path])
    }
}

/// Assemble the full editor API router (spec §6.5), wrapped in the same
/// trace/CORS/timeout middleware stack the teacher's own routers apply
/// (spec §5 "Editor API requests carry a per-request timeout (default
/// 30 s)"): the external editor UI is a browser-based collaborator, so CORS
/// is permissive by default, matching the teacher's local-development
/// posture rather than a locked-down production one.
#[must_use]
pub fn router(state: Arc<EditorState>) -> Router {
    Router::new()
        .merge(profiles::routes())
        .merge(tools::routes())
        .merge(servers::routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(HandleErrorLayer::new(handle_request_timeout))
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
}

/// Maps a request that exceeded the 30 s per-request timeout to an HTTP
/// response — `TimeoutLayer`'s `Elapsed` error has to be turned into a
/// response before axum's `Router` will accept the layer (its `Service`
/// impl requires an infallible error type).
async fn handle_request_timeout(_err: BoxError) -> StatusCode {
    StatusCode::REQUEST_TIMEOUT
}
