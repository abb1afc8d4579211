// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Schema parsers, selected by schema encoding.

pub mod json_schema;
pub mod msg_parser;

use crate::core::Result;
use crate::schema::ast::{Datatypes, MessageDefinition};

/// Parse schema bytes into datatypes according to the schema encoding.
///
/// - `ros1msg` / `ros2msg`: ROS .msg text
/// - `jsonschema`: JSON Schema document
/// - anything else (including an empty encoding): a single empty
///   definition registered under `name`
pub fn parse_schema(name: &str, encoding: &str, data: &[u8]) -> Result<Datatypes> {
    match encoding {
        "ros1msg" | "ros2msg" => {
            let text = String::from_utf8_lossy(data);
            msg_parser::parse(name, &text)
        }
        "jsonschema" => json_schema::parse(name, data),
        _ => {
            let mut datatypes = Datatypes::new();
            datatypes.insert(name.to_string(), MessageDefinition::new(name));
            Ok(datatypes)
        }
    }
}
