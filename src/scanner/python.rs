// ABOUTME: Regex/line-oriented Python surface parser backing the Source Scanner (C1)
// ABOUTME: Recognizes @mcp_service-decorated methods and BaseModel-derived type records
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use toolforge_core::{HandlerRecord, Parameter, TypeExpression, TypeRecord};

/// The decorator name marking a registered handler method (spec §4.1: "a
/// registration marker — a decorator/annotation named `mcp_service` or
/// equivalent").
const REGISTRATION_MARKER: &str = "mcp_service";

/// The base-class name marking a validation-model type record (spec §4.1:
/// "a configured marker, e.g. a validation-model base").
const TYPE_RECORD_MARKER: &str = "BaseModel";

macro_rules! cached_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> Option<&'static Regex> {
            static CACHE: OnceLock<Option<Regex>> = OnceLock::new();
            CACHE.get_or_init(|| Regex::new($pattern).ok()).as_ref()
        }
    };
}

cached_regex!(class_re, r"^class\s+(\w+)\s*(?:\(([^)]*)\))?\s*:");
cached_regex!(decorator_re, r"^@(\w+)\s*\((.*)\)\s*$");
cached_regex!(decorator_bare_re, r"^@(\w+)\s*$");
cached_regex!(
    def_re,
    r"^(async\s+)?def\s+(\w+)\s*\((.*)\)\s*(->.*)?:\s*$"
);
cached_regex!(field_re, r"^(\w+)\s*:\s*([^=]+?)(?:=\s*(.+))?$");

/// Parsed contents of a single source file.
#[derive(Debug, Default)]
pub(super) struct ParsedModule {
    pub(super) handlers: Vec<HandlerRecord>,
    pub(super) types: Vec<TypeRecord>,
    pub(super) diagnostics: Vec<String>,
}

#[derive(Debug, Clone)]
struct ClassContext {
    name: String,
    indent: usize,
    is_type_record: bool,
}

fn indent_of(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

/// Join continuation lines starting at `start` until bracket depth returns to
/// zero, returning the combined logical line and the index of the first
/// unconsumed physical line. A single, self-contained statement — a class
/// header, a decorator call, a `def` signature, or a field declaration — is
/// always on one logical line even when the source wraps it across several
/// physical ones.
fn logical_line(lines: &[&str], start: usize) -> (String, usize) {
    let mut buf = String::new();
    let mut depth: i32 = 0;
    let mut idx = start;
    loop {
        let line = lines[idx];
        if !buf.is_empty() {
            buf.push(' ');
        }
        buf.push_str(line.trim());
        for ch in line.chars() {
            match ch {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ => {}
            }
        }
        idx += 1;
        if depth <= 0 || idx >= lines.len() {
            break;
        }
    }
    (buf, idx)
}

/// Split `s` on top-level commas, respecting nested brackets and quoted
/// strings.
fn split_top_level(s: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    current.push(c);
                }
                ')' | ']' | '}' => {
                    depth -= 1;
                    current.push(c);
                }
                c if c == separator && depth == 0 => {
                    parts.push(current.trim().to_owned());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_owned());
    }
    parts
}

fn strip_quotes(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' || first == b'\'') && first == last {
            return Some(raw[1..raw.len() - 1].to_owned());
        }
    }
    None
}

/// Parse a Python literal into a JSON value where expressible; `None`
/// covers every shape the spec says to fall back on (function calls, enum
/// references, comprehensions).
fn python_literal_to_json(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    match raw {
        "None" => return Some(Value::Null),
        "True" => return Some(Value::Bool(true)),
        "False" => return Some(Value::Bool(false)),
        _ => {}
    }
    if let Some(s) = strip_quotes(raw) {
        return Some(Value::String(s));
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    if let Ok(f) = raw.parse::<f64>() {
        return serde_json::Number::from_f64(f).map(Value::Number);
    }
    if raw.starts_with('[') && raw.ends_with(']') {
        let inner = &raw[1..raw.len() - 1];
        if inner.trim().is_empty() {
            return Some(Value::Array(vec![]));
        }
        let elements: Option<Vec<Value>> = split_top_level(inner, ',')
            .iter()
            .map(|elem| python_literal_to_json(elem))
            .collect();
        return elements.map(Value::Array);
    }
    None
}

/// Parse a `Field(...)`-style pydantic constructor call, returning
/// `(default_value, description)`.
fn parse_field_constructor(raw: &str) -> (Option<Value>, Option<String>) {
    let Some(inner) = raw
        .strip_prefix("Field(")
        .and_then(|rest| rest.strip_suffix(')'))
    else {
        return (python_literal_to_json(raw), None);
    };

    let mut default_value = None;
    let mut description = None;
    for kwarg in split_top_level(inner, ',') {
        let Some((key, value)) = kwarg.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "default" => default_value = python_literal_to_json(value),
            "description" => description = strip_quotes(value),
            _ => {}
        }
    }
    (default_value, description)
}

/// Map a Python type annotation onto this workspace's language-neutral
/// [`TypeExpression`] textual form (spec §3.1).
fn python_type_to_expression(raw: &str) -> String {
    let raw = raw.trim();
    let lower = raw.to_lowercase();

    if let Some(inner) = raw
        .strip_prefix("Optional[")
        .and_then(|r| r.strip_suffix(']'))
    {
        return format!("optional<{}>", python_type_to_expression(inner));
    }
    for prefix in ["List[", "list["] {
        if let Some(inner) = raw.strip_prefix(prefix).and_then(|r| r.strip_suffix(']')) {
            return format!("list<{}>", python_type_to_expression(inner));
        }
    }
    match lower.as_str() {
        "str" => "string".to_owned(),
        "int" => "integer".to_owned(),
        "float" => "number".to_owned(),
        "bool" => "boolean".to_owned(),
        "list" => "array".to_owned(),
        "dict" | "any" => "object".to_owned(),
        _ if lower.starts_with("dict[") => "object".to_owned(),
        _ => raw.to_owned(),
    }
}

fn parse_parameter(raw: &str) -> Option<Parameter> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "self" || raw == "cls" {
        return None;
    }
    // name[: type][ = default]
    let (name_and_type, default_raw) = match split_top_level(raw, '=').as_slice() {
        [single] => (single.clone(), None),
        [head, tail @ ..] => (head.clone(), Some(tail.join("="))),
        [] => return None,
    };
    let (name, type_text) = match name_and_type.split_once(':') {
        Some((n, t)) => (n.trim().to_owned(), t.trim().to_owned()),
        None => (name_and_type.trim().to_owned(), "object".to_owned()),
    };
    if name.is_empty() {
        return None;
    }

    let type_expression = python_type_to_expression(&type_text);

    let (has_default, default_value, description) = match default_raw {
        Some(raw_default) => {
            let raw_default = raw_default.trim();
            let (value, description) = parse_field_constructor(raw_default);
            (true, value, description)
        }
        None => (false, None, None),
    };

    Some(Parameter {
        name,
        type_expression: TypeExpression::new(type_expression),
        is_required: !has_default,
        has_default,
        default_value,
        description,
    })
}

fn parse_decorator_kwargs(inner: &str) -> std::collections::HashMap<String, String> {
    let mut kwargs = std::collections::HashMap::new();
    for piece in split_top_level(inner, ',') {
        if let Some((key, value)) = piece.split_once('=') {
            kwargs.insert(key.trim().to_owned(), value.trim().to_owned());
        }
    }
    kwargs
}

/// Parse one source file's text into handler and type records, filtering
/// handlers to those whose decorator names `target_server_name`.
pub(super) fn parse_module(
    content: &str,
    module_path: &str,
    target_server_name: &str,
) -> ParsedModule {
    let mut result = ParsedModule::default();
    let lines: Vec<&str> = content.lines().collect();
    let mut current_class: Option<ClassContext> = None;
    let mut pending_decorator: Option<std::collections::HashMap<String, String>> = None;
    let mut current_fields: Vec<Parameter> = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let raw_line = lines[i];
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            i += 1;
            continue;
        }
        let this_indent = indent_of(raw_line);

        if trimmed.starts_with("class ") {
            if let Some(finished) = current_class.take() {
                if finished.is_type_record && !current_fields.is_empty() {
                    result.types.push(TypeRecord {
                        name: finished.name,
                        module_path: module_path.to_owned(),
                        fields: std::mem::take(&mut current_fields),
                    });
                }
            }
            current_fields.clear();
            let (logical, next_i) = logical_line(&lines, i);
            i = next_i;
            if let Some(caps) = class_re().and_then(|re| re.captures(&logical)) {
                let name = caps[1].to_owned();
                let bases = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                let is_type_record = bases.contains(TYPE_RECORD_MARKER);
                current_class = Some(ClassContext {
                    name,
                    indent: this_indent,
                    is_type_record,
                });
            } else {
                result
                    .diagnostics
                    .push(format!("could not parse class header: {logical}"));
            }
            continue;
        }

        let Some(class) = current_class.clone() else {
            i += 1;
            continue;
        };

        if this_indent <= class.indent {
            if class.is_type_record && !current_fields.is_empty() {
                result.types.push(TypeRecord {
                    name: class.name.clone(),
                    module_path: module_path.to_owned(),
                    fields: std::mem::take(&mut current_fields),
                });
            }
            current_class = None;
            continue;
        }

        if decorator_re().is_some_and(|re| re.is_match(trimmed)) {
            let (logical, next_i) = logical_line(&lines, i);
            i = next_i;
            if let Some(logical_caps) = decorator_re().and_then(|re| re.captures(&logical)) {
                let decorator_name = logical_caps[1].to_owned();
                if decorator_name == REGISTRATION_MARKER {
                    pending_decorator = Some(parse_decorator_kwargs(&logical_caps[2]));
                }
            }
            continue;
        }
        if decorator_bare_re().is_some_and(|re| re.is_match(trimmed)) {
            i += 1;
            continue;
        }

        if trimmed.starts_with("def ") || trimmed.starts_with("async def ") {
            let (logical, next_i) = logical_line(&lines, i);
            i = next_i;
            let Some(caps) = def_re().and_then(|re| re.captures(&logical)) else {
                result
                    .diagnostics
                    .push(format!("could not parse method signature: {logical}"));
                pending_decorator = None;
                continue;
            };
            let Some(decorator) = pending_decorator.take() else {
                continue;
            };
            let Some(server_name) = decorator.get("server_name").and_then(|v| strip_quotes(v))
            else {
                result.diagnostics.push(format!(
                    "method '{}' carries @{REGISTRATION_MARKER} with no server_name; skipped",
                    &caps[2]
                ));
                continue;
            };
            if server_name != target_server_name {
                continue;
            }
            let is_async = caps.get(1).is_some();
            let method_name = caps[2].to_owned();
            let params_raw = &caps[3];
            let signature: Vec<Parameter> = split_top_level(params_raw, ',')
                .iter()
                .filter_map(|p| parse_parameter(p))
                .collect();
            let service_name = decorator
                .get("service_name")
                .and_then(|v| strip_quotes(v))
                .unwrap_or_else(|| method_name.clone());
            let description = decorator.get("description").and_then(|v| strip_quotes(v));
            let tags = decorator
                .get("tags")
                .and_then(|v| python_literal_to_json(v))
                .and_then(|v| v.as_array().cloned())
                .map(|arr| {
                    arr.into_iter()
                        .filter_map(|v| v.as_str().map(str::to_owned))
                        .collect()
                })
                .unwrap_or_default();

            result.handlers.push(HandlerRecord {
                service_name,
                server_name,
                class_name: class.name.clone(),
                module_path: module_path.to_owned(),
                method_name,
                is_async,
                signature,
                description,
                tags,
            });
            continue;
        }

        if class.is_type_record {
            let (logical, next_i) = logical_line(&lines, i);
            if let Some(caps) = field_re().and_then(|re| re.captures(&logical)) {
                let name = caps[1].to_owned();
                let type_text = caps[2].trim().to_owned();
                let default_raw = caps.get(3).map(|m| m.as_str().trim().to_owned());
                let type_expression = python_type_to_expression(&type_text);
                let (has_default, default_value, description) = match default_raw {
                    Some(raw_default) => {
                        let (value, description) = parse_field_constructor(&raw_default);
                        (true, value, description)
                    }
                    None => (false, None, None),
                };
                current_fields.push(Parameter {
                    name,
                    type_expression: TypeExpression::new(type_expression),
                    is_required: !has_default,
                    has_default,
                    default_value,
                    description,
                });
            }
            i = next_i;
            continue;
        }

        i += 1;
    }

    if let Some(finished) = current_class {
        if finished.is_type_record && !current_fields.is_empty() {
            result.types.push(TypeRecord {
                name: finished.name,
                module_path: module_path.to_owned(),
                fields: current_fields,
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decorated_handler_and_type_record() {
        let source = r#"
class DatePeriodFilter(BaseModel):
    from_: str = Field(description="start of range")
    to: Optional[str] = None

class MailService:
    @mcp_service(server_name="mail", service_name="mail_fetch_filter", description="Fetch mail", tags=["mail", "read"])
    async def fetch_filter(self, user_email: str, filter_params: DatePeriodFilter, client_filter: Optional[dict] = None):
        ...
"#;
        let parsed = parse_module(source, "mail.service", "mail");
        assert_eq!(parsed.handlers.len(), 1);
        let handler = &parsed.handlers[0];
        assert_eq!(handler.service_name, "mail_fetch_filter");
        assert_eq!(handler.server_name, "mail");
        assert!(handler.is_async);
        assert_eq!(handler.tags.len(), 2);
        assert_eq!(handler.signature.len(), 3);
        assert_eq!(handler.signature[1].type_expression.0, "DatePeriodFilter");
        assert_eq!(handler.signature[2].type_expression.0, "optional<object>");
        assert!(!handler.signature[2].is_required);

        assert_eq!(parsed.types.len(), 1);
        let type_record = &parsed.types[0];
        assert_eq!(type_record.name, "DatePeriodFilter");
        assert_eq!(type_record.fields.len(), 2);
        assert_eq!(
            type_record.fields[0].description.as_deref(),
            Some("start of range")
        );
    }

    #[test]
    fn handler_for_a_different_server_is_skipped() {
        let source = r#"
class Other:
    @mcp_service(server_name="calendar", service_name="list_events")
    def list_events(self):
        ...
"#;
        let parsed = parse_module(source, "calendar.service", "mail");
        assert!(parsed.handlers.is_empty());
    }

    #[test]
    fn undecorated_method_is_not_registered() {
        let source = r#"
class MailService:
    def helper(self, x: int):
        ...
"#;
        let parsed = parse_module(source, "mail.service", "mail");
        assert!(parsed.handlers.is_empty());
    }

    #[test]
    fn integer_default_renders_as_json_number_not_object() {
        let source = r#"
class MailService:
    @mcp_service(server_name="mail", service_name="top_n")
    def top_n(self, limit: int = 50):
        ...
"#;
        let parsed = parse_module(source, "mail.service", "mail");
        let param = &parsed.handlers[0].signature[0];
        assert_eq!(param.default_value, Some(Value::from(50)));
    }
}
