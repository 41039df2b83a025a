// ABOUTME: Type Record to JSON Schema lowering — supports base_model autocomplete in C6/C9
// ABOUTME: Builds a lookup from a scan's named record types to their JsonSchema shape

// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

//! A named record type (spec §3.2) is only useful to the editor and the
//! generator once its fields are expressed as the same [`JsonSchema`]
//! vocabulary a tool's `input_schema` uses. This module performs that
//! lowering: [`TypeRegistry::schema_for`] turns one scanned [`TypeRecord`]
//! into the schema a property's `base_model` extension (spec §3.3) refers to.

use std::collections::BTreeMap;

use toolforge_core::{JsonSchema, Parameter, PropertySchema, TypeRecord};

/// Looks up named record types by name, built fresh from one scan's
/// [`TypeRecord`]s (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, TypeRecord>,
}

impl TypeRegistry {
    /// Build a registry from scanned type records. A duplicate name keeps
    /// the last declaration the scan encountered.
    #[must_use]
    pub fn from_types(types: &[TypeRecord]) -> Self {
        let mut map = BTreeMap::new();
        for record in types {
            map.insert(record.name.clone(), record.clone());
        }
        Self { types: map }
    }

    /// The schema a tool property's `base_model = "<name>"` extension
    /// refers to, or `None` if `name` is not a known record type.
    #[must_use]
    pub fn schema_for(&self, name: &str) -> Option<JsonSchema> {
        let record = self.types.get(name)?;
        let mut schema = JsonSchema::empty();
        for field in &record.fields {
            schema.insert_property(field.name.clone(), property_schema_for(field), field.is_required);
        }
        Some(schema)
    }

    /// Every record type name this registry knows about, for editor
    /// autocomplete listings.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }
}

/// Lower one type-record field into the property schema a generated
/// nested-object shape would carry (spec §3.1, §3.3).
fn property_schema_for(field: &Parameter) -> PropertySchema {
    let te = &field.type_expression;
    let mut prop = if te.is_scalar() {
        PropertySchema::scalar(te.inner_kind())
    } else if te.is_list() {
        let mut p = PropertySchema::scalar("array");
        p.base_model = Some(te.inner_kind().to_owned());
        p
    } else {
        let mut p = PropertySchema::scalar("object");
        p.base_model = Some(te.inner_kind().to_owned());
        p
    };
    prop.default = field.default_value.clone();
    prop.description = field.description.clone();
    prop
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_types() -> Vec<TypeRecord> {
        vec![TypeRecord {
            name: "DatePeriodFilter".into(),
            module_path: "mail.types".into(),
            fields: vec![
                Parameter::required("start", "string"),
                Parameter::with_default("top", "integer", serde_json::json!(50)),
                Parameter::required("tags", "list<string>"),
            ],
        }]
    }

    #[test]
    fn schema_for_known_type_lowers_every_field() {
        let registry = TypeRegistry::from_types(&sample_types());
        let schema = registry.schema_for("DatePeriodFilter").expect("known type");
        assert!(schema.required.contains("start"));
        assert!(!schema.required.contains("top"));
        assert_eq!(schema.properties["start"].schema_type, "string");
        assert_eq!(schema.properties["top"].default, Some(serde_json::json!(50)));
        assert_eq!(schema.properties["tags"].schema_type, "array");
    }

    #[test]
    fn schema_for_unknown_type_is_none() {
        let registry = TypeRegistry::from_types(&sample_types());
        assert!(registry.schema_for("Ghost").is_none());
    }

    #[test]
    fn duplicate_name_keeps_last_declaration() {
        let mut types = sample_types();
        types.push(TypeRecord {
            name: "DatePeriodFilter".into(),
            module_path: "mail.types".into(),
            fields: vec![Parameter::required("end", "string")],
        });
        let registry = TypeRegistry::from_types(&types);
        let schema = registry.schema_for("DatePeriodFilter").expect("known type");
        assert!(schema.properties.contains_key("end"));
        assert!(!schema.properties.contains_key("start"));
    }
}
