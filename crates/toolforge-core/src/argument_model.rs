// ABOUTME: The tri-layer argument merge algorithm (C5, spec §4.5)
// ABOUTME: internal < signature_defaults < signature(caller), merged per handler parameter

use crate::tool::{FactorSource, FactorSpec, ToolDefinition};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The three layers a handler parameter's final value can be assembled from,
/// ordered lowest to highest precedence (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    /// Invisible to the calling agent.
    Internal,
    /// Visible, installation-chosen default.
    SignatureDefaults,
    /// The request's actual caller-supplied argument.
    Signature,
}

#[derive(Debug, Clone, Default)]
struct TargetInputs {
    is_object: bool,
    internal: Option<Value>,
    signature_defaults: Option<Value>,
    caller: Option<Value>,
}

fn factor_value(factor: &FactorSpec) -> Option<Value> {
    if let Some(map) = &factor.value {
        Some(Value::Object(map.clone()))
    } else {
        factor.primitive_default.clone()
    }
}

/// Shallow-merge `overlay` onto `base`, recursing one level deeper whenever
/// both sides hold an object for the same key (spec §4.5: "nested objects
/// are replaced wholesale unless both sides are objects").
///
/// Exported so the dispatcher runtime ([`crate`]'s sole consumer outside this
/// module, via `toolforge::dispatcher::merge_onto`) calls this same
/// implementation rather than maintaining a second, divergent merge.
pub fn merge_json_objects(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, overlay_value) in overlay {
        match (base.get_mut(key), overlay_value) {
            (Some(Value::Object(base_obj)), Value::Object(overlay_obj)) => {
                merge_json_objects(base_obj, overlay_obj);
            }
            _ => {
                base.insert(key.clone(), overlay_value.clone());
            }
        }
    }
}

/// Merge an object-typed handler parameter's three layers into one map.
///
/// Starts from `internal`, overlays `signature_defaults`, overlays `caller` —
/// exactly the precedence order named in spec §4.5.
#[must_use]
pub fn merge_object(
    internal: Option<&Map<String, Value>>,
    signature_defaults: Option<&Map<String, Value>>,
    caller: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let mut merged = internal.cloned().unwrap_or_default();
    if let Some(overlay) = signature_defaults {
        merge_json_objects(&mut merged, overlay);
    }
    if let Some(overlay) = caller {
        merge_json_objects(&mut merged, overlay);
    }
    merged
}

/// Resolve a primitive-typed handler parameter: caller value wins if
/// provided, else the signature-defaults primitive, else the internal
/// primitive (spec §4.5).
#[must_use]
pub fn merge_primitive(
    caller: Option<Value>,
    signature_defaults: Option<Value>,
    internal: Option<Value>,
) -> Option<Value> {
    caller.or(signature_defaults).or(internal)
}

/// Compute the full set of handler-parameter-keyed call arguments for one
/// tool invocation, applying the tri-layer merge to every handler parameter
/// that any schema property or factor contributes to (spec §4.5, §4.6).
///
/// `caller_args` must already have had schema defaults applied (spec §4.7
/// step 2) — this function only performs the merge, not default injection.
#[must_use]
pub fn merge_call_args(
    tool: &ToolDefinition,
    caller_args: &Map<String, Value>,
) -> BTreeMap<String, Value> {
    let mut by_target: BTreeMap<String, TargetInputs> = BTreeMap::new();

    for (property_name, property) in &tool.input_schema.properties {
        let target = property.resolved_target(property_name).to_owned();
        let entry = by_target.entry(target).or_default();
        entry.is_object |= property.schema_type == "object";
        if let Some(value) = caller_args.get(property_name) {
            entry.caller = Some(value.clone());
        }
    }

    for factor in tool.service_factors.values() {
        let entry = by_target.entry(factor.target_param.clone()).or_default();
        entry.is_object |= factor.is_object_valued();
        match factor.source {
            FactorSource::Internal => entry.internal = factor_value(factor),
            FactorSource::SignatureDefaults => entry.signature_defaults = factor_value(factor),
        }
    }

    by_target
        .into_iter()
        .filter_map(|(target, inputs)| {
            let value = if inputs.is_object {
                let merged = merge_object(
                    inputs.internal.as_ref().and_then(Value::as_object),
                    inputs.signature_defaults.as_ref().and_then(Value::as_object),
                    inputs.caller.as_ref().and_then(Value::as_object),
                );
                if merged.is_empty() {
                    None
                } else {
                    Some(Value::Object(merged))
                }
            } else {
                merge_primitive(inputs.caller, inputs.signature_defaults, inputs.internal)
            };
            value.map(|v| (target, v))
        })
        .collect()
}

/// Every handler parameter that contributes to this tool's call, whether via
/// a schema property or a factor — used by the generator to check spec §3.8's
/// "every required handler parameter is covered" invariant before emitting
/// an artifact (spec §7 `ServiceBindingError`, §8 property 4).
#[must_use]
pub fn contributed_parameters(tool: &ToolDefinition) -> std::collections::BTreeSet<String> {
    let mut params: std::collections::BTreeSet<String> = tool
        .input_schema
        .properties
        .iter()
        .map(|(name, prop)| prop.resolved_target(name).to_owned())
        .collect();
    params.extend(tool.service_factors.values().map(|f| f.target_param.clone()));
    params
}
