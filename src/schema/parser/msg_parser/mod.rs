// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! MSG format parser using Pest.
//!
//! This module handles parsing of ROS .msg format definitions into
//! [`Datatypes`].
//!
//! The format supports:
//! - Simple field lists (root message)
//! - Dependency blocks with "MSG: TypeName" headers separated by `===` lines
//! - Array types: T[] (dynamic), T[n] (fixed), T[<=n] (bounded)
//! - Constants: `uint8 OK=0`
//! - Comments (# style)

use pest::Parser;
use pest_derive::Parser;

use crate::core::{PlaybackError, Result};
use crate::schema::ast::{is_primitive, Datatypes, MessageDefinition, MessageDefinitionField};

/// Pest parser for a single .msg line.
#[derive(Parser)]
#[grammar = "schema/parser/msg_parser/msg.pest"] // Path relative to src/ directory
pub struct MsgParser;

/// Parse a .msg definition named `name` into the root type and its dependencies.
///
/// The root type is registered under `name`; each `MSG:` block is registered
/// under its declared type name.
pub fn parse(name: &str, definition: &str) -> Result<Datatypes> {
    let mut datatypes = Datatypes::new();
    let mut current = MessageDefinition::new(name);
    let mut current_name = name.to_string();

    for (line_no, raw_line) in definition.lines().enumerate() {
        let trimmed = raw_line.trim();

        if trimmed.starts_with("===") {
            datatypes.insert(std::mem::take(&mut current_name), current);
            current = MessageDefinition::default();
            continue;
        }

        if let Some(header) = trimmed.strip_prefix("MSG:") {
            current_name = header.trim().to_string();
            current.name = Some(current_name.clone());
            continue;
        }

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let field = parse_line(trimmed, package_of(&current_name)).map_err(|e| {
            PlaybackError::parse(
                format!("msg schema '{name}' line {}", line_no + 1),
                e.to_string(),
            )
        })?;
        if let Some(field) = field {
            current.add_field(field);
        }
    }

    if !current_name.is_empty() {
        datatypes.insert(current_name, current);
    }

    Ok(datatypes)
}

/// Parse one non-empty line. Returns `None` for comment-only lines.
fn parse_line(line: &str, package: Option<&str>) -> Result<Option<MessageDefinitionField>> {
    let pairs = MsgParser::parse(Rule::line, line)
        .map_err(|e| PlaybackError::parse("msg line", format!("{e}")))?;

    for pair in pairs.flatten() {
        match pair.as_rule() {
            Rule::constant => return Ok(Some(build_field(pair, package, true))),
            Rule::field => return Ok(Some(build_field(pair, package, false))),
            _ => {}
        }
    }
    Ok(None)
}

fn build_field(
    pair: pest::iterators::Pair<Rule>,
    package: Option<&str>,
    is_constant: bool,
) -> MessageDefinitionField {
    let mut type_name = String::new();
    let mut name = String::new();
    let mut is_array = false;
    let mut array_length = None;
    let mut value = None;

    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::field_type => {
                for part in item.into_inner() {
                    match part.as_rule() {
                        Rule::type_ref => type_name = normalize_type(part.as_str(), package),
                        Rule::array => {
                            is_array = true;
                            let bounded = part
                                .clone()
                                .into_inner()
                                .any(|p| p.as_rule() == Rule::bounded);
                            if !bounded {
                                array_length = part
                                    .into_inner()
                                    .find(|p| p.as_rule() == Rule::array_size)
                                    .and_then(|p| p.as_str().parse().ok());
                            }
                        }
                        _ => {}
                    }
                }
            }
            Rule::name => name = item.as_str().to_string(),
            Rule::const_value => {
                let raw = item.as_str();
                // String constants keep '#' verbatim; everything else may carry a comment.
                let raw = if type_name == "string" {
                    raw
                } else {
                    raw.split('#').next().unwrap_or(raw)
                };
                value = Some(raw.trim().to_string());
            }
            Rule::default_value => value = Some(item.as_str().trim().to_string()),
            _ => {}
        }
    }

    MessageDefinitionField {
        is_complex: !is_primitive(&type_name),
        name,
        type_name,
        is_array,
        array_length,
        is_constant,
        value,
    }
}

/// Qualify a bare type reference.
///
/// `Header` always means `std_msgs/Header`; other bare message types live in
/// the same package as the type that references them.
fn normalize_type(type_ref: &str, package: Option<&str>) -> String {
    if is_primitive(type_ref) || type_ref.contains('/') {
        return type_ref.to_string();
    }
    if type_ref == "Header" {
        return "std_msgs/Header".to_string();
    }
    match package {
        Some(pkg) => format!("{pkg}/{type_ref}"),
        None => type_ref.to_string(),
    }
}

fn package_of(type_name: &str) -> Option<&str> {
    type_name.split_once('/').map(|(pkg, _)| pkg)
}
