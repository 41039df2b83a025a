// ABOUTME: Dispatcher Runtime (C7) — the shared library linked into every generated server
// ABOUTME: Tool-table lookup, default injection, required-property check, handler invocation (spec §4.7)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

//! The runtime half of a generated server. Generated code (see
//! [`crate::generator`]) calls into this module rather than re-implementing
//! merge and dispatch logic inline; [`merge_onto`] itself forwards straight
//! into `toolforge_core::argument_model::merge_json_objects`, so there is
//! exactly one merge implementation, not a tested reference plus a
//! diverging runtime copy.
//!
//! Concrete handler implementations are supplied by the embedding
//! application; this crate only defines the [`ServiceInstance`] trait and a
//! table keyed by module path (spec §4.7 step 3, "invokes the handler on the
//! service instance resolved from the module-path table"). It never knows
//! what a handler actually does.

use std::collections::HashMap;
use std::sync::Arc;

pub use toolforge_core::ToolforgeError;
use toolforge_core::{ErrorKind, ToolforgeResult};

/// One service module's bound implementation, supplied by the embedding
/// application (spec §3 Non-goals: "handlers invoked by the dispatcher are
/// opaque to it").
///
/// A generated server never constructs a concrete type itself; it only
/// knows the `module_path` string recorded at scan time and calls
/// [`ServiceInstances::invoke`] with it.
#[async_trait::async_trait]
pub trait ServiceInstance: Send + Sync {
    /// Invoke `method` on this service with already-merged `call_args`,
    /// returning the raw JSON result (spec §4.7 step 3).
    async fn invoke(
        &self,
        method: &str,
        call_args: serde_json::Map<String, serde_json::Value>,
    ) -> ToolforgeResult<serde_json::Value>;
}

/// The module-path table a generated server's dispatch function resolves
/// handlers through (spec §4.6 "invokes the handler on the service instance
/// resolved from the module-path table").
///
/// Service-instance singletons are constructed once at startup and are
/// read-only thereafter at the dispatcher level (spec §5 "Shared-resource
/// policy"); any mutable state inside a handler is the handler's own
/// responsibility.
#[derive(Clone, Default)]
pub struct ServiceInstances {
    by_module: HashMap<String, Arc<dyn ServiceInstance>>,
}

impl ServiceInstances {
    /// An empty table with no bound service instances.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            by_module: HashMap::new(),
        }
    }

    /// Bind `module_path` to a concrete [`ServiceInstance`].
    #[must_use]
    pub fn with_service(mut self, module_path: impl Into<String>, instance: Arc<dyn ServiceInstance>) -> Self {
        self.by_module.insert(module_path.into(), instance);
        self
    }

    /// Construct the table a generated server's `main` uses at startup.
    ///
    /// This crate has no knowledge of concrete handler implementations
    /// (spec §3 Non-goals), so the default table is empty; an embedding
    /// application that links this crate into a generated artifact is
    /// expected to provide its own `main` that populates
    /// [`ServiceInstances`] via [`ServiceInstances::with_service`] before
    /// serving requests. `from_env` exists so generated `main` functions
    /// have a single, consistent construction point to call, matching the
    /// shape every other generated-server concern (port, tool-catalog path)
    /// already takes from the environment.
    ///
    /// # Errors
    ///
    /// Never returns an error today; the `Result` return keeps this call
    /// site forward-compatible with embeddings that need to fail fast (for
    /// example, a missing required credential) without changing every
    /// generated artifact's signature.
    pub fn from_env() -> ToolforgeResult<Self> {
        Ok(Self::empty())
    }

    /// Resolve `module_path` and invoke `method` on it with `call_args`
    /// (spec §4.7 step 3). `service_name` is carried through for error
    /// messages and future per-service tracing, not for lookup — lookup is
    /// by `module_path` alone, since two tools may bind to the same module
    /// under different `mcp_service` names.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ServiceBindingError`] if no instance is bound
    /// for `module_path`, or whatever error the handler itself returns.
    pub async fn invoke(
        &self,
        module_path: &str,
        method: &str,
        service_name: &str,
        call_args: serde_json::Map<String, serde_json::Value>,
    ) -> ToolforgeResult<serde_json::Value> {
        let instance = self.by_module.get(module_path).ok_or_else(|| {
            ToolforgeError::new(
                ErrorKind::ServiceBindingError,
                format!("no service instance bound for module '{module_path}' (service '{service_name}')"),
            )
        })?;
        instance.invoke(method, call_args).await
    }
}

/// Resolves once `SIGTERM` (or `Ctrl+C`) arrives, for use with
/// `axum::serve(..).with_graceful_shutdown(..)` in the REST and stream
/// generated artifacts (spec §4.8 `Stop` "sends graceful termination
/// signal"). Without this hook a generated server only ever exits via a
/// hard kill, which is what left [`crate::supervisor::Supervisor::stop`]
/// unable to do anything but wait out its timeout.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Merge `update` onto `target`, recursing one level deeper wherever both
/// sides hold a nested object at the same key and replacing wholesale
/// otherwise (spec §4.5 "nested objects are replaced wholesale unless both
/// sides are objects"). This is the runtime-callable counterpart the
/// generator emits calls to; it is a thin wrapper over
/// [`toolforge_core::argument_model::merge_json_objects`] so generated
/// servers execute the exact same merge the C5 reference is tested against,
/// not a second hand-written copy of it.
pub fn merge_onto(
    target: &mut serde_json::Map<String, serde_json::Value>,
    update: &serde_json::Map<String, serde_json::Value>,
) {
    toolforge_core::argument_model::merge_json_objects(target, update);
}

/// Inject each property's schema `default` into `call_args` when absent
/// (spec §4.7 step 2, "shallow for objects"), then verify every property in
/// `required` is present, returning [`ErrorKind::InvalidArgument`] naming
/// the first missing one (spec §4.7, "must refuse requests whose argument
/// shape violates `input_schema.required`").
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidArgument`] if a required property is still
/// absent after default injection.
pub fn apply_defaults_and_validate(
    schema: &toolforge_core::JsonSchema,
    call_args: &mut serde_json::Map<String, serde_json::Value>,
) -> ToolforgeResult<()> {
    for (name, property) in &schema.properties {
        if !call_args.contains_key(name) {
            if let Some(default) = &property.default {
                call_args.insert(name.clone(), default.clone());
            }
        }
    }
    for required in &schema.required {
        if !call_args.contains_key(required) {
            return Err(ToolforgeError::new(
                ErrorKind::InvalidArgument,
                format!("missing required property '{required}'"),
            ));
        }
    }
    Ok(())
}
