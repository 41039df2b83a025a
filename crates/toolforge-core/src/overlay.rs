// ABOUTME: The internal-args overlay, the sibling document to the tool catalog (spec §3.4)
// ABOUTME: Holds properties that have been moved off a tool's visible input_schema

use crate::tool::PropertySchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single property moved to internal: its original (visible) schema node,
/// whether it was required before the move, and the resolved handler
/// parameter/default it now carries invisibly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayEntry {
    /// The exact schema node the property had while still visible, kept so
    /// restoring it is a deep-equality round trip (spec §8 property 6).
    pub original_schema: PropertySchema,
    /// Whether the property was in the tool's `required` set before the
    /// move.
    pub was_required: bool,
    /// The handler parameter this property now targets, if it differs from
    /// the property name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_param: Option<String>,
    /// The value the dispatcher now injects in place of caller input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Mirrors `original_schema.schema_type`, kept alongside for quick
    /// lookup without re-parsing the nested schema.
    #[serde(rename = "type")]
    pub value_type: String,
}

/// Per-tool overlay: property name → [`OverlayEntry`].
pub type ToolOverlay = BTreeMap<String, OverlayEntry>;

/// The full internal-args overlay document, persisted alongside the tool
/// catalog (spec §3.4, §3.6) and reloaded intact.
///
/// Invariant (spec §3.4): for any tool name `t` and property name `p`,
/// exactly one of `tool.input_schema.properties[p]` or
/// `overlay.entries[t][p]` is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalArgsOverlay {
    /// Tool name → its overlay.
    #[serde(default, flatten)]
    pub entries: BTreeMap<String, ToolOverlay>,
}

impl InternalArgsOverlay {
    /// An empty overlay.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The overlay entries for one tool, if any have been recorded.
    #[must_use]
    pub fn for_tool(&self, tool_name: &str) -> Option<&ToolOverlay> {
        self.entries.get(tool_name)
    }

    /// Record a property moved to internal for a tool.
    pub fn insert(&mut self, tool_name: &str, property_name: &str, entry: OverlayEntry) {
        self.entries
            .entry(tool_name.to_owned())
            .or_default()
            .insert(property_name.to_owned(), entry);
    }

    /// Remove and return a property's overlay entry (used when restoring it
    /// to the visible schema).
    pub fn take(&mut self, tool_name: &str, property_name: &str) -> Option<OverlayEntry> {
        let tool_overlay = self.entries.get_mut(tool_name)?;
        let entry = tool_overlay.remove(property_name);
        if tool_overlay.is_empty() {
            self.entries.remove(tool_name);
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::PropertySchema;

    #[test]
    fn insert_then_take_round_trips() {
        let mut overlay = InternalArgsOverlay::empty();
        overlay.insert(
            "mail_fetch_filter",
            "verbose",
            OverlayEntry {
                original_schema: PropertySchema::scalar("boolean"),
                was_required: false,
                target_param: None,
                default: Some(serde_json::Value::Bool(false)),
                value_type: "boolean".into(),
            },
        );

        assert!(overlay.for_tool("mail_fetch_filter").is_some());
        let taken = overlay.take("mail_fetch_filter", "verbose").expect("present");
        assert_eq!(taken.value_type, "boolean");
        assert!(overlay.for_tool("mail_fetch_filter").is_none());
    }
}
