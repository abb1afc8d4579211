// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Structural datatype definitions.
//!
//! A [`MessageDefinition`] is compared field by field: two sources that
//! describe the same schema with the same fields are equal even if they
//! were parsed from differently formatted text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Mapping of schema/type name to its definition.
pub type Datatypes = BTreeMap<String, MessageDefinition>;

/// Structural definition of one message type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDefinition {
    /// Type name (e.g., "geometry_msgs/Pose")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Ordered field and constant definitions
    pub definitions: Vec<MessageDefinitionField>,
}

impl MessageDefinition {
    /// Create an empty definition with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            definitions: Vec::new(),
        }
    }

    /// Append a field.
    pub fn add_field(&mut self, field: MessageDefinitionField) {
        self.definitions.push(field);
    }

    /// Builder-style [`add_field`](Self::add_field).
    pub fn with_field(mut self, field: MessageDefinitionField) -> Self {
        self.add_field(field);
        self
    }

    /// Get a field (not a constant) by name.
    pub fn field(&self, name: &str) -> Option<&MessageDefinitionField> {
        self.definitions
            .iter()
            .find(|f| !f.is_constant && f.name == name)
    }
}

/// A field or constant in a [`MessageDefinition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDefinitionField {
    /// Field name
    pub name: String,
    /// Element type name (primitive name or fully qualified message type)
    #[serde(rename = "type")]
    pub type_name: String,
    /// Whether this is an array/sequence
    #[serde(default)]
    pub is_array: bool,
    /// Fixed array length, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_length: Option<usize>,
    /// Whether the element type is a nested message
    #[serde(default)]
    pub is_complex: bool,
    /// Whether this entry is a constant rather than a field
    #[serde(default)]
    pub is_constant: bool,
    /// Constant value or field default, as written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl MessageDefinitionField {
    /// Create a scalar field. `is_complex` is derived from the type name.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            name: name.into(),
            is_complex: !is_primitive(&type_name),
            type_name,
            is_array: false,
            array_length: None,
            is_constant: false,
            value: None,
        }
    }

    /// Mark as array (`None` = dynamic length).
    pub fn array(mut self, length: Option<usize>) -> Self {
        self.is_array = true;
        self.array_length = length;
        self
    }

    /// Mark as constant with the given value.
    pub fn constant(mut self, value: impl Into<String>) -> Self {
        self.is_constant = true;
        self.value = Some(value.into());
        self
    }
}

/// ROS primitive type names, including aliases.
const PRIMITIVES: &[&str] = &[
    "bool", "boolean", "byte", "char", "int8", "int16", "int32", "int64", "uint8", "uint16",
    "uint32", "uint64", "float32", "float64", "float", "double", "string", "wstring", "time",
    "duration", "octet",
];

/// Check whether a type name is a primitive.
pub fn is_primitive(type_name: &str) -> bool {
    PRIMITIVES.contains(&type_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality_ignores_identity() {
        let a = MessageDefinition::new("Pose")
            .with_field(MessageDefinitionField::new("x", "float64"))
            .with_field(MessageDefinitionField::new("y", "float64"));
        let b = MessageDefinition::new("Pose")
            .with_field(MessageDefinitionField::new("x", "float64"))
            .with_field(MessageDefinitionField::new("y", "float64"));
        let c = MessageDefinition::new("Pose")
            .with_field(MessageDefinitionField::new("x", "float64"));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_field_flags() {
        let f = MessageDefinitionField::new("header", "std_msgs/Header");
        assert!(f.is_complex);
        let f = MessageDefinitionField::new("data", "uint8").array(Some(4));
        assert!(!f.is_complex);
        assert!(f.is_array);
        assert_eq!(f.array_length, Some(4));
    }

    #[test]
    fn test_field_lookup_skips_constants() {
        let def = MessageDefinition::new("Status")
            .with_field(MessageDefinitionField::new("OK", "uint8").constant("0"))
            .with_field(MessageDefinitionField::new("level", "uint8"));
        assert!(def.field("OK").is_none());
        assert!(def.field("level").is_some());
    }
}
