// ABOUTME: Stdio protocol rendering for the Server Generator (C6)
// ABOUTME: Framed newline-delimited JSON on stdin/stdout, one request per frame, single-threaded (spec §4.6)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

use std::fmt::Write as _;

use toolforge_core::{Profile, ToolDefinition, ToolforgeResult};

use super::{render_tool_dispatch, render_tool_handler, render_tool_list_literal};

/// Render the stdio-flavored generated server artifact: one JSON request
/// frame read per line of stdin, one JSON response frame written per line
/// of stdout, processed strictly sequentially (spec §4.6 "Stdio", §5
/// "strictly sequential").
///
/// # Errors
///
/// Returns an error if any rendered tool fails the required-parameter
/// coverage check (spec §8 property 4).
pub fn render(profile: &Profile, tools: &[ToolDefinition]) -> ToolforgeResult<String> {
    super::check_required_coverage(tools)?;

    let mut out = String::new();
    let _ = writeln!(out, "// Generated by toolforge-editor. Do not edit by hand.");
    let _ = writeln!(out, "// Profile: {}  Protocol: stdio", profile.name);
    out.push_str("#![allow(clippy::all)]\n\n");
    out.push_str("use std::io::{BufRead, Write as _};\n");
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
#[derive(serde::Deserialize)]
struct RequestFrame {
    id: serde_json::Value,
    tool: String,
    #[serde(default)]
    arguments: serde_json::Map<String, serde_json::Value>,
}

async fn handle_frame(frame: RequestFrame, services: &ServiceInstances) -> serde_json::Value {
    if frame.tool == "tools/list" {
        let list: serde_json::Value =
            serde_json::from_str(TOOLS_LIST).unwrap_or_else(|_| serde_json::json!([]));
        return serde_json::json!({ "id": frame.id, "status": "ok", "value": list });
    }
    match dispatch(&frame.tool, frame.arguments, services).await {
        Ok(value) => serde_json::json!({ "id": frame.id, "status": "ok", "value": value }),
        Err(err) => serde_json::json!({
            "id": frame.id,
            "status": "error",
            "kind": err.kind.as_str(),
            "message": err.message,
        }),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    toolforge::logging::init_from_env("mcp-server-stdio")?;
    let _config = toolforge::config::GeneratedServerConfig::from_env_or_defaults(
        PROFILE_NAME,
        "127.0.0.1",
        DEFAULT_PORT,
        std::path::Path::new(DEFAULT_TOOL_DEFINITIONS_PATH),
    )?;
    let services = ServiceInstances::from_env()?;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    tracing::info!("stdio mcp server ready");
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<RequestFrame>(&line) {
            Ok(frame) => handle_frame(frame, &services).await,
            Err(err) => serde_json::json!({
                "id": serde_json::Value::Null,
                "status": "error",
                "kind": "InvalidArgument",
                "message": err.to_string(),
            }),
        };
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }
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
    fn renders_a_single_threaded_line_loop() {
        let rendered = render(&profile(), &[tool()]).expect("renders");
        assert!(rendered.contains("stdin.lock().lines()"));
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
