// ABOUTME: Handler and type records produced by the source scanner (C1)
// ABOUTME: These are the per-server manifest entries persisted by the registry store (C2)

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A language-neutral textual type expression captured from a handler
/// signature or a type-record field declaration.
///
/// Preserved verbatim from source rather than parsed into a closed type
/// system (spec §3.1): the generator and editor only ever need to *display*
/// and *pattern-match* a handful of well-known shapes (`optional<T>`,
/// `list<T>`, a bare scalar kind, or a named record type), never evaluate
/// the expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeExpression(pub String);

impl TypeExpression {
    /// The built-in scalar kinds spec §3.1 enumerates.
    const SCALAR_KINDS: &'static [&'static str] =
        &["string", "integer", "number", "boolean", "array", "object"];

    /// Construct from a raw textual type expression.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// True if this expression names one of the built-in scalar kinds
    /// (ignoring an `optional<...>` or `list<...>` wrapper).
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        Self::SCALAR_KINDS.contains(&self.inner_kind())
    }

    /// True if this expression is a primitive (non-object, non-array) scalar.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self.inner_kind(),
            "string" | "integer" | "number" | "boolean"
        )
    }

    /// The kind with an `optional<...>`/`list<...>` wrapper stripped, or the
    /// name of the referenced record type if this is not a scalar.
    #[must_use]
    pub fn inner_kind(&self) -> &str {
        let s = self.0.trim();
        for wrapper in ["optional<", "list<"] {
            if let Some(rest) = s.strip_prefix(wrapper) {
                if let Some(inner) = rest.strip_suffix('>') {
                    return inner.trim();
                }
            }
        }
        s
    }

    /// True if this expression is wrapped in `optional<...>`.
    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.0.trim().starts_with("optional<")
    }

    /// True if this expression is wrapped in `list<...>`.
    #[must_use]
    pub fn is_list(&self) -> bool {
        self.0.trim().starts_with("list<")
    }
}

/// A single parameter of a handler method, or a single field of a type
/// record (spec §3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter or field name.
    pub name: String,
    /// Textual, language-neutral type expression.
    pub type_expression: TypeExpression,
    /// Whether the caller must supply this parameter.
    pub is_required: bool,
    /// Whether the source declares a default value for this parameter.
    pub has_default: bool,
    /// The default value, when JSON-expressible and captured verbatim.
    /// `None` when `has_default` is false, or when a default exists but is
    /// not a literal the scanner can capture (spec §4.1: "otherwise
    /// `has_default=true` and `default_value=null`").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    /// Human-readable description, from a docstring or `Field(...)`-style
    /// constructor argument.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Parameter {
    /// Construct a required parameter with no default.
    #[must_use]
    pub fn required(name: impl Into<String>, type_expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_expression: TypeExpression::new(type_expression),
            is_required: true,
            has_default: false,
            default_value: None,
            description: None,
        }
    }

    /// Construct an optional parameter carrying a captured default.
    #[must_use]
    pub fn with_default(
        name: impl Into<String>,
        type_expression: impl Into<String>,
        default_value: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            type_expression: TypeExpression::new(type_expression),
            is_required: false,
            has_default: true,
            default_value: Some(default_value),
            description: None,
        }
    }
}

/// A registered handler method (spec §3.1, §4.1).
///
/// Produced by the source scanner, persisted by the registry store keyed by
/// `server_name`, and later denormalized into [`crate::tool::ToolDefinition::handler`]
/// at tool-save time so generated servers do not depend on the registry at
/// runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerRecord {
    /// Unique (within a server) name this handler is addressed by.
    pub service_name: String,
    /// The server manifest this handler belongs to.
    pub server_name: String,
    /// The class the method is declared on.
    pub class_name: String,
    /// Dotted module path, derived from the source file's path.
    pub module_path: String,
    /// The method name itself.
    pub method_name: String,
    /// Whether the method is declared `async`.
    pub is_async: bool,
    /// Positional-then-keyword parameter list in declaration order
    /// (receiver/self already discarded).
    pub signature: Vec<Parameter>,
    /// Optional human-readable description, from a docstring or decorator
    /// argument.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form tags attached via the registration marker.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl HandlerRecord {
    /// Look up a parameter of this handler's signature by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.signature.iter().find(|p| p.name == name)
    }

    /// The subset of parameter names that are required.
    #[must_use]
    pub fn required_parameter_names(&self) -> Vec<&str> {
        self.signature
            .iter()
            .filter(|p| p.is_required)
            .map(|p| p.name.as_str())
            .collect()
    }
}

/// A named record type referenced by handler signatures (spec §3.2).
///
/// Recognized by the scanner from declarations whose base class matches a
/// configured validation-model marker; used by the editor to autocomplete
/// nested object schemas via a property's `base_model` extension
/// (spec §3.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRecord {
    /// The type's name, as referenced by `type_expression` and `base_model`.
    pub name: String,
    /// Dotted module path this type is declared in.
    pub module_path: String,
    /// Ordered fields, each mirroring a [`Parameter`].
    pub fields: Vec<Parameter>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_expression_strips_wrappers() {
        let opt = TypeExpression::new("optional<string>");
        assert!(opt.is_optional());
        assert_eq!(opt.inner_kind(), "string");
        assert!(opt.is_primitive());

        let list = TypeExpression::new("list<DatePeriodFilter>");
        assert!(list.is_list());
        assert_eq!(list.inner_kind(), "DatePeriodFilter");
        assert!(!list.is_scalar());
    }

    #[test]
    fn bare_scalar_is_primitive() {
        let t = TypeExpression::new("integer");
        assert!(t.is_scalar());
        assert!(t.is_primitive());
        assert!(!t.is_optional());
    }

    #[test]
    fn handler_record_finds_required_parameters() {
        let handler = HandlerRecord {
            service_name: "fetch_filter".into(),
            server_name: "mail".into(),
            class_name: "MailService".into(),
            module_path: "mail.service".into(),
            method_name: "fetch_filter".into(),
            is_async: true,
            signature: vec![
                Parameter::required("user_email", "string"),
                Parameter::required("filter_params", "DatePeriodFilter"),
                Parameter::with_default(
                    "client_filter",
                    "optional<object>",
                    serde_json::Value::Null,
                ),
            ],
            description: None,
            tags: BTreeSet::new(),
        };

        assert_eq!(
            handler.required_parameter_names(),
            vec!["user_email", "filter_params"]
        );
        assert!(handler.parameter("client_filter").is_some());
        assert!(handler.parameter("missing").is_none());
    }
}
