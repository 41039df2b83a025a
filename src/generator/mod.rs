// ABOUTME: Server Generator (C6) — renders per-protocol server artifacts from the tool catalog
// ABOUTME: Shared handler-body rendering; protocol-specific wrapping lives in rest/stdio/stream
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

//! `Generate(profile, protocol) -> source_file_path` (spec §4.6). Writes a
//! single Rust source file under the profile's `mcp_server/` directory: a
//! tool table, one handler function per tool, a service-instance table, and
//! a protocol-specific request loop (spec §3.7).
//!
//! Per spec §9 "Dynamic attribute lookup on a service instance" is replaced
//! here with a static mapping from `service_name` to a
//! `(service_instance_slot, method_pointer)` pair, built at generation time
//! — the rendered `SERVICE_INSTANCES` table and per-tool `match` arm below
//! are that static mapping.

pub mod rest;
pub mod stdio;
pub mod stream;

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use toolforge_core::{ErrorKind, JsonSchema, ToolDefinition, ToolforgeError, ToolforgeResult};

use crate::registry_store::RegistryStore;

/// Which transport flavor to render (spec §3.7, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// One HTTP POST endpoint per tool plus `GET /tools/list`.
    Rest,
    /// Long-lived bidirectional HTTP stream carrying stdio-format frames.
    Stream,
    /// Framed newline-delimited JSON on stdin/stdout, single-threaded.
    Stdio,
}

impl Protocol {
    /// The generated file's name within a profile's `mcp_server/` directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Rest => "server_rest.rs",
            Self::Stream => "server_stream.rs",
            Self::Stdio => "server_stdio.rs",
        }
    }
}

/// Validates every tool's `mcp_service` resolves to exactly one handler
/// record in the given server's registry (spec §3.8, §7 `ServiceBindingError`,
/// §8 property 3) before any rendering happens — a failed validation means
/// `Generate` aborts cleanly with no partial file (spec §7 propagation rule).
///
/// # Errors
///
/// Returns [`ErrorKind::ServiceBindingError`] naming the first tool whose
/// `mcp_service` does not resolve.
pub fn validate_service_bindings(
    tools: &[ToolDefinition],
    registry: &RegistryStore,
    server_name: &str,
) -> ToolforgeResult<()> {
    let document = registry
        .load(server_name)
        .map_err(|e| ToolforgeError::new(ErrorKind::ServiceBindingError, e.to_string()))?
        .ok_or_else(|| {
            ToolforgeError::new(
                ErrorKind::ServiceBindingError,
                format!("no registry found for server '{server_name}'"),
            )
        })?;

    for tool in tools {
        if document.lookup(&tool.mcp_service).is_none() {
            return Err(ToolforgeError::new(
                ErrorKind::ServiceBindingError,
                format!(
                    "tool '{}' binds to unknown mcp_service '{}' in server '{server_name}'",
                    tool.name, tool.mcp_service
                ),
            ));
        }
    }
    Ok(())
}

/// A Rust identifier derived from a tool name (which may contain characters
/// that are not valid in a Rust identifier).
fn safe_ident(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if ident.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

/// Render the sanitized `input_schema` for `tools/list` (spec §4.6 REST
/// protocol, §8 property/scenario S3): internal properties never appear
/// because they were already removed from `input_schema.properties` when
/// moved to the overlay (spec §3.4) — this function trusts that invariant
/// and simply serializes what is visible.
#[must_use]
pub fn sanitized_schema(schema: &JsonSchema) -> serde_json::Value {
    serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({}))
}

/// Render one tool's handler function body (shared across all three
/// protocols — spec §4.6 "Rendering"): builds `call_args`, merges per §4.5,
/// invokes the bound handler, and wraps the result.
///
/// Object-typed factor defaults are embedded as `serde_json::json!` literals
/// computed at generation time (they are fixed per-profile configuration);
/// the caller-supplied overlay is merged at *runtime* via
/// [`toolforge_core::argument_model::merge_json_objects`]-equivalent calls
/// emitted into the function body, so caller input neither needs to be
/// known nor baked in at generation time. Primitive-typed internal/
/// signature-defaults factors are rendered as literal `serde_json::json!`
/// values, never as a type-constructor call — spec §8 scenario S2's
/// "`call_args["top"] = 50`, never `call_args["top"] = integer()`"
/// requirement.
pub fn render_tool_handler(tool: &ToolDefinition) -> String {
    let fn_name = format!("handle_{}", safe_ident(&tool.name));
    let schema_const = format!("SCHEMA_{}", safe_ident(&tool.name).to_uppercase());
    let mut body = String::new();
    let schema_json = serde_json::to_string(&tool.input_schema).unwrap_or_else(|_| "{}".to_string());
    let _ = writeln!(body, "static {schema_const}: &str = r#\"{schema_json}\"#;");
    let _ = writeln!(body, "/// Generated from tool `{}`.", tool.name);
    let _ = writeln!(
        body,
        "async fn {fn_name}(mut caller_args: serde_json::Map<String, serde_json::Value>, services: &ServiceInstances) -> Result<serde_json::Value, ToolforgeError> {{"
    );
    let _ = writeln!(
        body,
        "    let schema: toolforge_core::JsonSchema = serde_json::from_str({schema_const}).unwrap_or_default();"
    );
    let _ = writeln!(
        body,
        "    toolforge::dispatcher::apply_defaults_and_validate(&schema, &mut caller_args)?;"
    );
    let _ = writeln!(body, "    let mut call_args: serde_json::Map<String, serde_json::Value> = serde_json::Map::new();");

    // Group schema properties and factors by resolved target parameter.
    let mut targets: std::collections::BTreeMap<String, TargetRender> = std::collections::BTreeMap::new();
    for (prop_name, prop) in &tool.input_schema.properties {
        let target = prop.resolved_target(prop_name).to_owned();
        let entry = targets.entry(target).or_default();
        entry.is_object |= prop.schema_type == "object";
        entry.caller_property = Some(prop_name.clone());
    }
    for factor in tool.service_factors.values() {
        let entry = targets.entry(factor.target_param.clone()).or_default();
        entry.is_object |= factor.is_object_valued();
        match factor.source {
            toolforge_core::FactorSource::Internal => {
                entry.internal_literal = factor_literal(factor);
            }
            toolforge_core::FactorSource::SignatureDefaults => {
                entry.signature_defaults_literal = factor_literal(factor);
            }
        }
    }

    for (target, render) in &targets {
        if render.is_object {
            let _ = writeln!(body, "    {{");
            let _ = writeln!(body, "        let mut merged = serde_json::Map::new();");
            if let Some(literal) = &render.internal_literal {
                let _ = writeln!(
                    body,
                    "        if let Some(obj) = ({literal}).as_object() {{ toolforge::dispatcher::merge_onto(&mut merged, obj); }}"
                );
            }
            if let Some(literal) = &render.signature_defaults_literal {
                let _ = writeln!(
                    body,
                    "        if let Some(obj) = ({literal}).as_object() {{ toolforge::dispatcher::merge_onto(&mut merged, obj); }}"
                );
            }
            if let Some(prop_name) = &render.caller_property {
                let _ = writeln!(
                    body,
                    "        if let Some(serde_json::Value::Object(caller_obj)) = caller_args.get({prop_name:?}) {{"
                );
                let _ = writeln!(body, "            toolforge::dispatcher::merge_onto(&mut merged, caller_obj);");
                let _ = writeln!(body, "        }}");
            }
            let _ = writeln!(
                body,
                "        if !merged.is_empty() {{ call_args.insert({target:?}.to_string(), serde_json::Value::Object(merged)); }}"
            );
            let _ = writeln!(body, "    }}");
        } else {
            // Primitive: caller wins, else signature-defaults, else internal.
            if let Some(prop_name) = &render.caller_property {
                let _ = writeln!(
                    body,
                    "    if let Some(v) = caller_args.get({prop_name:?}) {{ call_args.insert({target:?}.to_string(), v.clone()); }}"
                );
                if let Some(literal) = render
                    .signature_defaults_literal
                    .as_ref()
                    .or(render.internal_literal.as_ref())
                {
                    let _ = writeln!(
                        body,
                        "    else {{ call_args.insert({target:?}.to_string(), {literal}); }}"
                    );
                }
            } else if let Some(literal) = render
                .signature_defaults_literal
                .as_ref()
                .or(render.internal_literal.as_ref())
            {
                let _ = writeln!(
                    body,
                    "    call_args.insert({target:?}.to_string(), {literal});"
                );
            }
        }
    }

    let _ = writeln!(
        body,
        "    let result = services.invoke({:?}, {:?}, {:?}, call_args).await?;",
        tool.handler.module_path, tool.handler.method, tool.mcp_service
    );
    let _ = writeln!(body, "    Ok(result)");
    let _ = writeln!(body, "}}");
    body
}

#[derive(Debug, Default)]
struct TargetRender {
    is_object: bool,
    caller_property: Option<String>,
    internal_literal: Option<String>,
    signature_defaults_literal: Option<String>,
}

/// Render a [`toolforge_core::FactorSpec`]'s value as a Rust `serde_json::json!`
/// literal expression — never a constructor call (spec §8 S2).
fn factor_literal(factor: &toolforge_core::FactorSpec) -> Option<String> {
    if let Some(map) = &factor.value {
        let value = serde_json::Value::Object(map.clone());
        Some(format!("serde_json::json!({value})"))
    } else {
        factor
            .primitive_default
            .as_ref()
            .map(|v| format!("serde_json::json!({v})"))
    }
}

/// Render the static tool table: a `match` from tool name to its generated
/// handler function (the static replacement for runtime `getattr`, spec §9).
pub fn render_tool_dispatch(tools: &[ToolDefinition]) -> String {
    let mut body = String::new();
    let _ = writeln!(
        body,
        "async fn dispatch(tool_name: &str, caller_args: serde_json::Map<String, serde_json::Value>, services: &ServiceInstances) -> Result<serde_json::Value, ToolforgeError> {{"
    );
    let _ = writeln!(body, "    match tool_name {{");
    for tool in tools {
        let fn_name = format!("handle_{}", safe_ident(&tool.name));
        let _ = writeln!(
            body,
            "        {:?} => {fn_name}(caller_args, services).await,",
            tool.name
        );
    }
    let _ = writeln!(
        body,
        "        _ => Err(ToolforgeError::tool_not_found(tool_name)),"
    );
    let _ = writeln!(body, "    }}");
    let _ = writeln!(body, "}}");
    body
}

/// Render the sanitized tool list served by `tools/list` (REST) or an
/// equivalent listing frame (stdio/stream) as a `serde_json::json!` array
/// literal embedded in the generated source (spec §4.6, §8 S3).
pub fn render_tool_list_literal(tools: &[ToolDefinition]) -> String {
    let entries: Vec<serde_json::Value> = tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "name": t.name,
                "description": t.description,
                "input_schema": sanitized_schema(&t.input_schema),
            })
        })
        .collect();
    serde_json::Value::Array(entries).to_string()
}

/// Compute every handler parameter that appears uncovered for a required
/// property — a static detectability check surfaced as a generation error
/// rather than a runtime failure (spec §8 property 4).
///
/// # Errors
///
/// Returns [`ErrorKind::ServiceBindingError`] naming the first tool/required
/// property combination with no contributing factor or schema property.
pub fn check_required_coverage(tools: &[ToolDefinition]) -> ToolforgeResult<()> {
    for tool in tools {
        let contributed = toolforge_core::argument_model::contributed_parameters(tool);
        let mut missing: BTreeSet<&str> = BTreeSet::new();
        for required in &tool.input_schema.required {
            let target = tool
                .input_schema
                .properties
                .get(required)
                .map(|p| p.resolved_target(required))
                .unwrap_or(required.as_str());
            if !contributed.contains(target) {
                missing.insert(required.as_str());
            }
        }
        if let Some(first) = missing.into_iter().next() {
            return Err(ToolforgeError::new(
                ErrorKind::ServiceBindingError,
                format!(
                    "tool '{}' has no contributing source for required property '{first}'",
                    tool.name
                ),
            ));
        }
    }
    Ok(())
}

/// Write a rendered artifact under `profile_dir/mcp_server/<protocol file>`.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn write_artifact(profile_dir: &Path, protocol: Protocol, content: &str) -> std::io::Result<PathBuf> {
    let dir = profile_dir.join("mcp_server");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(protocol.file_name());
    crate::atomic_file::write_atomic(&path, content.as_bytes())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use toolforge_core::{FactorSource, FactorSpec, HandlerBinding, PropertySchema};

    fn sample_tool() -> ToolDefinition {
        let mut schema = JsonSchema::empty();
        schema.insert_property(
            "DatePeriodFilter".into(),
            PropertySchema {
                target_param: Some("filter_params".into()),
                ..PropertySchema::scalar("object")
            },
            true,
        );
        let mut service_factors = BTreeMap::new();
        service_factors.insert(
            "ttt".into(),
            FactorSpec {
                source: FactorSource::Internal,
                target_param: "top".into(),
                type_hint: "integer".into(),
                value: None,
                primitive_default: Some(serde_json::json!(50)),
                description: None,
            },
        );
        ToolDefinition {
            name: "mail_fetch_filter".into(),
            description: "Fetch mail".into(),
            mcp_service: "fetch_filter".into(),
            input_schema: schema,
            service_factors,
            handler: HandlerBinding {
                class_name: "MailService".into(),
                module_path: "mail.service".into(),
                method: "fetch_filter".into(),
                is_async: true,
            },
        }
    }

    /// Scenario S2 (spec §8): a primitive internal factor renders as a
    /// literal assignment, never a type-constructor call.
    #[test]
    fn s2_primitive_internal_factor_renders_as_literal() {
        let rendered = render_tool_handler(&sample_tool());
        assert!(rendered.contains(r#"call_args.insert("top".to_string(), serde_json::json!(50));"#));
        assert!(!rendered.contains("integer()"));
    }

    #[test]
    fn object_property_merges_at_runtime_via_shared_helper() {
        let rendered = render_tool_handler(&sample_tool());
        assert!(rendered.contains("merge_onto"));
        assert!(rendered.contains(r#"caller_args.get("DatePeriodFilter")"#));
    }

    /// Scenario S1 (spec §8): an object-valued signature-defaults factor
    /// sharing a target with an object caller property must render a
    /// `Map`-typed argument to `merge_onto`, not a bare `&serde_json::Value`
    /// literal (which would fail to type-check in the generated server).
    #[test]
    fn s1_object_valued_factor_literal_renders_as_map_typed_merge() {
        let mut tool = sample_tool();
        tool.service_factors.insert(
            "date_period_defaults".into(),
            FactorSpec {
                source: FactorSource::SignatureDefaults,
                target_param: "filter_params".into(),
                type_hint: "object".into(),
                value: Some(
                    serde_json::json!({"test_field": "test_value"})
                        .as_object()
                        .unwrap()
                        .clone(),
                ),
                primitive_default: None,
                description: None,
            },
        );

        let rendered = render_tool_handler(&tool);
        assert!(
            rendered.contains(
                r#"if let Some(obj) = (serde_json::json!({"test_field":"test_value"})).as_object() { toolforge::dispatcher::merge_onto(&mut merged, obj); }"#
            ),
            "expected a Map-typed merge_onto call, got:\n{rendered}"
        );
        assert!(
            !rendered.contains("merge_onto(&mut merged, &serde_json::json!("),
            "must never pass a bare &Value literal to merge_onto:\n{rendered}"
        );
    }

    #[test]
    fn tool_dispatch_has_a_match_arm_per_tool_and_a_not_found_fallback() {
        let tools = vec![sample_tool()];
        let rendered = render_tool_dispatch(&tools);
        assert!(rendered.contains(r#""mail_fetch_filter" => handle_mail_fetch_filter"#));
        assert!(rendered.contains("tool_not_found"));
    }

    /// Scenario S3 (spec §8): an internal property must not appear in the
    /// sanitized tools/list rendering. `sample_tool` has no internal
    /// property moved out, so this asserts the positive case; the overlay
    /// removal itself is tested in `toolforge_core::overlay`.
    #[test]
    fn sanitized_schema_omits_nothing_not_already_removed() {
        let tool = sample_tool();
        let literal = render_tool_list_literal(std::slice::from_ref(&tool));
        assert!(literal.contains("DatePeriodFilter"));
    }

    #[test]
    fn required_coverage_check_passes_when_factor_covers_required_target() {
        let tool = sample_tool();
        assert!(check_required_coverage(std::slice::from_ref(&tool)).is_ok());
    }

    #[test]
    fn required_coverage_check_fails_when_nothing_covers_a_required_property() {
        let mut tool = sample_tool();
        tool.input_schema
            .insert_property("missing_required".into(), PropertySchema::scalar("string"), true);
        let result = check_required_coverage(std::slice::from_ref(&tool));
        assert!(matches!(result, Err(ref e) if e.kind == ErrorKind::ServiceBindingError));
    }
}
