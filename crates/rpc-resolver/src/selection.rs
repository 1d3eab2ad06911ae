// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The client's field-selection tree.
//!
//! A selection list looks like:
//! ```json
//! ["id", {"user": ["id", "name"]}, {"self": {"args": {"prefix": "X"}, "fields": ["id"]}}]
//! ```
//!
//! Parsing never fails: entries with an unexpected shape are kept as
//! [`FieldSelection::Invalid`] or [`FieldSelection::Malformed`], so that the requested-fields
//! processor reports them at the point its depth-first walk reaches them.

use serde_json::{Map, Value};

const ARGS_KEY: &str = "args";
const FIELDS_KEY: &str = "fields";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldSelection {
    /// `"title"`
    Bare(String),
    /// `{"user": ["id", "name"]}`
    Nested {
        name: String,
        fields: Vec<FieldSelection>,
    },
    /// `{"self": {"args": {...}, "fields": [...]}}`
    ArgsAndFields {
        name: String,
        args: Option<Map<String, Value>>,
        fields: Option<Vec<FieldSelection>>,
    },
    /// A mapping whose value is neither a list nor an args/fields object
    Malformed { name: String, value: Value },
    /// An entry that is neither a string nor a mapping
    Invalid(Value),
}

impl FieldSelection {
    /// Parse a selection list. A value that is not a list is treated as a single invalid entry.
    pub fn parse_list(value: &Value) -> Vec<FieldSelection> {
        match value {
            Value::Array(entries) => entries.iter().flat_map(Self::parse_entry).collect(),
            _ => vec![FieldSelection::Invalid(value.clone())],
        }
    }

    fn parse_entry(entry: &Value) -> Vec<FieldSelection> {
        match entry {
            Value::String(name) => vec![FieldSelection::Bare(name.clone())],
            Value::Object(map) if !map.is_empty() => map
                .iter()
                .map(|(name, value)| Self::parse_mapping(name, value))
                .collect(),
            _ => vec![FieldSelection::Invalid(entry.clone())],
        }
    }

    fn parse_mapping(name: &str, value: &Value) -> FieldSelection {
        let name = name.to_string();

        match value {
            Value::Array(_) => FieldSelection::Nested {
                fields: Self::parse_list(value),
                name,
            },
            Value::Object(map) if is_args_and_fields(map) => FieldSelection::ArgsAndFields {
                args: map.get(ARGS_KEY).and_then(Value::as_object).cloned(),
                fields: map.get(FIELDS_KEY).map(Self::parse_list),
                name,
            },
            _ => FieldSelection::Malformed {
                name,
                value: value.clone(),
            },
        }
    }

    /// The client-facing name this entry selects, if it has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            FieldSelection::Bare(name)
            | FieldSelection::Nested { name, .. }
            | FieldSelection::ArgsAndFields { name, .. }
            | FieldSelection::Malformed { name, .. } => Some(name),
            FieldSelection::Invalid(_) => None,
        }
    }
}

fn is_args_and_fields(map: &Map<String, Value>) -> bool {
    !map.is_empty()
        && map.keys().all(|k| k == ARGS_KEY || k == FIELDS_KEY)
        && map.get(ARGS_KEY).is_none_or(Value::is_object)
        && map.get(FIELDS_KEY).is_none_or(Value::is_array)
}
