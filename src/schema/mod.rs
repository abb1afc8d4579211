// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Schema handling: structural datatype definitions and the parsers that
//! produce them from ROS .msg text and JSON Schema documents.

pub mod ast;
pub mod parser;

pub use ast::{is_primitive, Datatypes, MessageDefinition, MessageDefinitionField};
pub use parser::parse_schema;
