// ABOUTME: REST protocol rendering for the Server Generator (C6)
// ABOUTME: One POST /tools/<name> endpoint per tool, plus GET /tools/list (spec §4.6, §6.4)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

use std::fmt::Write as _;

use toolforge_core::{Profile, ToolDefinition, ToolforgeResult};

use super::{render_tool_dispatch, render_tool_handler, render_tool_list_literal};

/// Render the REST-flavored generated server artifact: `POST /tools/<tool>`
/// per tool, `GET /tools/list` returning the sanitized schema set, and a
/// clean-shutdown exit path (spec §4.6 "REST").
///
/// # Errors
///
/// Returns an error if any rendered tool fails the required-parameter
/// coverage check (spec §8 property 4).
pub fn render(profile: &Profile, tools: &[ToolDefinition]) -> ToolforgeResult<String> {
    super::check_required_coverage(tools)?;

    let mut out = String::new();
    let _ = writeln!(out, "// Generated by toolforge-editor. Do not edit by hand.");
    let _ = writeln!(out, "// Profile: {}  Protocol: rest", profile.name);
    out.push_str("#![allow(clippy::all)]\n\n");
    out.push_str("use axum::{extract::{Path, State}, routing::{get, post}, Json, Router};\n");
    out.push_str("use std::sync::Arc;\n");
    out.push_str("use toolforge::dispatcher::{ServiceInstances, ToolforgeError};\n\n");
    let _ = writeln!(out, "const PROFILE_NAME: &str = {:?};", profile.name);
    let _ = writeln!(out, "const DEFAULT_PORT: u16 = {};", profile.port);
    let _ = writeln!(
        out,
        "const DEFAULT_TOOL_DEFINITIONS_PATH: &str = {:?};",
        profile.tool_definitions_path.display().to_string()
    );
    out.push('\n');
    let _ = writeln!(
        out,
        "static TOOLS_LIST: &str = r#\"{}\"#;",
        render_tool_list_literal(tools)
    );
    out.push('\n');

    for tool in tools {
        out.push_str(&render_tool_handler(tool));
        out.push('\n');
    }
    out.push_str(&render_tool_dispatch(tools));
    out.push('\n');

    out.push_str(
        r#"
async fn tools_list() -> Json<serde_json::Value> {
    Json(serde_json::from_str(TOOLS_LIST).unwrap_or_else(|_| serde_json::json!([])))
}

async fn invoke_tool(
    Path(tool_name): Path<String>,
    State(services): State<Arc<ServiceInstances>>,
    Json(args): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let caller_args = args.as_object().cloned().unwrap_or_default();
    match dispatch(&tool_name, caller_args, &services).await {
        Ok(value) => Json(serde_json::json!({ "status": "ok", "value": value })),
        Err(err) => Json(serde_json::json!({
            "status": "error",
            "kind": err.kind.as_str(),
            "message": err.message,
        })),
    }
}

fn router(services: Arc<ServiceInstances>) -> Router {
    Router::new()
        .route("/tools/list", get(tools_list))
        .route("/tools/:tool_name", post(invoke_tool))
        .with_state(services)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    toolforge::logging::init_from_env("mcp-server-rest")?;
    let port = toolforge::config::GeneratedServerConfig::from_env_or_defaults(
        PROFILE_NAME,
        "127.0.0.1",
        DEFAULT_PORT,
        std::path::Path::new(DEFAULT_TOOL_DEFINITIONS_PATH),
    )?
    .port;
    let services = Arc::new(ServiceInstances::from_env()?);
    let app = router(services);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "rest mcp server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(toolforge::dispatcher::shutdown_signal())
        .await?;
    Ok(())
}
"#,
    );

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use toolforge_core::{HandlerBinding, JsonSchema, PropertySchema};

    fn profile() -> Profile {
        Profile {
            name: "outlook".into(),
            source_dir: PathBuf::from("/src"),
            template_definitions_path: PathBuf::from("/templates.json"),
            tool_definitions_path: PathBuf::from("/outlook/tool_definitions.json"),
            backup_dir: PathBuf::from("/outlook/backups"),
            types_files: vec![],
            host: "127.0.0.1".into(),
            port: 9001,
            base_profile: None,
        }
    }

    fn tool() -> ToolDefinition {
        let mut schema = JsonSchema::empty();
        schema.insert_property("user_email".into(), PropertySchema::scalar("string"), true);
        ToolDefinition {
            name: "mail_fetch_filter".into(),
            description: "Fetch mail".into(),
            mcp_service: "fetch_filter".into(),
            input_schema: schema,
            service_factors: BTreeMap::new(),
            handler: HandlerBinding {
                class_name: "MailService".into(),
                module_path: "mail.service".into(),
                method: "fetch_filter".into(),
                is_async: true,
            },
        }
    }

    #[test]
    fn renders_one_route_per_tool_and_a_list_route() {
        let rendered = render(&profile(), &[tool()]).expect("renders");
        assert!(rendered.contains("/tools/list"));
        assert!(rendered.contains("/tools/:tool_name"));
        assert!(rendered.contains("handle_mail_fetch_filter"));
    }

    /// Property 7 (spec §8): regenerating from unchanged inputs is
    /// byte-identical.
    #[test]
    fn generation_is_idempotent_over_unchanged_inputs() {
        let first = render(&profile(), &[tool()]).expect("first render");
        let second = render(&profile(), &[tool()]).expect("second render");
        assert_eq!(first, second);
    }
}
