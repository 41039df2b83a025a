// ABOUTME: The externally visible Tool Definition model owned by the tool definition store (C3)
// ABOUTME: input_schema + service_factors + a denormalized handler reference (spec §3.3)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// JSON-Schema-like description of a tool's input (spec §3.3).
///
/// Deliberately not the full JSON Schema vocabulary: only what the tri-layer
/// argument model and the editor's autocomplete need.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    /// Property name → schema node.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertySchema>,
    /// Names of properties the caller must supply.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub required: BTreeSet<String>,
}

impl JsonSchema {
    /// An empty object schema.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Remove a property (and drop it from `required`), returning it if
    /// present. Used by the internal-args overlay move (spec §3.4, §4.3).
    pub fn remove_property(&mut self, name: &str) -> Option<PropertySchema> {
        self.required.remove(name);
        self.properties.remove(name)
    }

    /// Re-insert a property, adding it back to `required` iff `was_required`.
    pub fn insert_property(&mut self, name: String, schema: PropertySchema, was_required: bool) {
        if was_required {
            self.required.insert(name.clone());
        }
        self.properties.insert(name, schema);
    }
}

/// A single property node inside a tool's [`JsonSchema`] (spec §3.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    /// Schema kind: one of the scalar kinds, `array`, or `object`.
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Human-readable description shown to the calling agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The value injected by the dispatcher when the caller omits this
    /// property (spec §4.7 step 2). A required property never carries one
    /// (spec §3.8 invariant).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Maps this property onto a handler parameter whose name differs from
    /// the property name, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_param: Option<String>,
    /// The named record type whose shape this object property follows, when
    /// set (used by the editor for nested-object autocomplete).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_model: Option<String>,
    /// Nested properties, present when `schema_type == "object"` and the
    /// shape is spelled out rather than referenced via `base_model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, PropertySchema>>,
}

impl PropertySchema {
    /// Construct a bare scalar property with no default or target-param
    /// remap.
    #[must_use]
    pub fn scalar(schema_type: impl Into<String>) -> Self {
        Self {
            schema_type: schema_type.into(),
            description: None,
            default: None,
            target_param: None,
            base_model: None,
            properties: None,
        }
    }

    /// The handler parameter this property contributes to: `target_param`
    /// when set, else the property's own name (spec §4.5 "target-param
    /// resolution").
    #[must_use]
    pub fn resolved_target<'a>(&'a self, property_name: &'a str) -> &'a str {
        self.target_param.as_deref().unwrap_or(property_name)
    }
}

/// Which provenance layer a [`FactorSpec`] belongs to (spec §3.3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorSource {
    /// Invisible to the calling agent.
    Internal,
    /// Visible as part of the tool signature, but with an installation-chosen
    /// default.
    SignatureDefaults,
}

/// A configured value contributing to a handler argument, either invisible
/// to the caller (`internal`) or visible with a built-in default
/// (`signature_defaults`) (spec §3.3, glossary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSpec {
    /// Which layer this factor occupies.
    pub source: FactorSource,
    /// The handler parameter this factor overrides.
    pub target_param: String,
    /// Textual type hint, mirroring [`crate::handler::TypeExpression`].
    pub type_hint: String,
    /// Object-typed default set, for object-typed handler parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Map<String, serde_json::Value>>,
    /// Scalar default, for primitive-typed handler parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primitive_default: Option<serde_json::Value>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FactorSpec {
    /// True when this factor contributes an object-typed value rather than a
    /// scalar.
    #[must_use]
    pub const fn is_object_valued(&self) -> bool {
        self.value.is_some()
    }
}

/// A denormalized snapshot of the [`crate::handler::HandlerRecord`] a tool
/// binds to, copied at save time so generated servers are independent of the
/// registry at runtime (spec §3.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerBinding {
    /// The class the handler method is declared on.
    pub class_name: String,
    /// Dotted module path.
    pub module_path: String,
    /// The method name.
    pub method: String,
    /// Whether the method is `async`.
    pub is_async: bool,
}

/// The externally visible operation a generated server exposes (spec §3.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique (within a profile) tool name.
    pub name: String,
    /// Human-readable description shown in `tools/list`.
    pub description: String,
    /// The `service_name` this tool binds to in the server's handler
    /// registry.
    pub mcp_service: String,
    /// The JSON-Schema-like input shape the calling agent sees.
    pub input_schema: JsonSchema,
    /// Factor-key → [`FactorSpec`] map contributing internal or
    /// signature-defaults values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub service_factors: BTreeMap<String, FactorSpec>,
    /// Denormalized handler reference, set at save time.
    pub handler: HandlerBinding,
}

impl ToolDefinition {
    /// Every property name currently visible on this tool's schema.
    #[must_use]
    pub fn visible_properties(&self) -> Vec<&str> {
        self.input_schema
            .properties
            .keys()
            .map(String::as_str)
            .collect()
    }

    /// Factors belonging to the given [`FactorSource`].
    pub fn factors_with_source(
        &self,
        source: FactorSource,
    ) -> impl Iterator<Item = (&String, &FactorSpec)> {
        self.service_factors
            .iter()
            .filter(move |(_, f)| f.source == source)
    }
}
