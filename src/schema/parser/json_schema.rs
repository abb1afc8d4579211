// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Field extraction from JSON Schema documents.
//!
//! Only `properties` are read. Nested objects become their own datatype
//! named `<parent>.<property>`.

use serde_json::Value;

use crate::core::{PlaybackError, Result};
use crate::schema::ast::{Datatypes, MessageDefinition, MessageDefinitionField};

/// Parse a JSON Schema document into datatypes rooted at `name`.
pub fn parse(name: &str, data: &[u8]) -> Result<Datatypes> {
    let root: Value = serde_json::from_slice(data)
        .map_err(|e| PlaybackError::parse(format!("jsonschema '{name}'"), e.to_string()))?;

    let mut datatypes = Datatypes::new();
    add_object(name, &root, &mut datatypes);
    Ok(datatypes)
}

fn add_object(name: &str, schema: &Value, datatypes: &mut Datatypes) {
    let mut definition = MessageDefinition::new(name);

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (prop, prop_schema) in properties {
            let nested_name = format!("{name}.{prop}");
            let field = match json_type(prop_schema) {
                "array" => {
                    let items = prop_schema.get("items").unwrap_or(&Value::Null);
                    let element = element_type(&nested_name, items, datatypes);
                    MessageDefinitionField::new(prop.as_str(), element).array(None)
                }
                _ => {
                    let element = element_type(&nested_name, prop_schema, datatypes);
                    MessageDefinitionField::new(prop.as_str(), element)
                }
            };
            definition.add_field(field);
        }
    }

    datatypes.insert(name.to_string(), definition);
}

fn element_type(nested_name: &str, schema: &Value, datatypes: &mut Datatypes) -> String {
    match json_type(schema) {
        "object" => {
            add_object(nested_name, schema, datatypes);
            nested_name.to_string()
        }
        "integer" => "int64".to_string(),
        "number" => "float64".to_string(),
        "boolean" => "bool".to_string(),
        _ => "string".to_string(),
    }
}

/// The schema's `type`; for a type union the first non-null entry wins.
fn json_type(schema: &Value) -> &str {
    match schema.get("type") {
        Some(Value::String(s)) => s.as_str(),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .unwrap_or("string"),
        _ if schema.get("properties").is_some() => "object",
        _ => "string",
    }
}
