// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Shapes a raw action result into the client-facing JSON described by an [`ExtractionTemplate`].
//!
//! The template has already been validated against the schema, so a raw value that does not fit it
//! is an internal error ([`ResultProcessingError`]) rather than a client one.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, instrument};

use rpc_common::{
    formatter::NameFormatter,
    value::{Record, Val},
};
use rpc_model::introspector::SchemaIntrospector;

use crate::{
    fetch_spec::{ExtractionTemplate, TemplateKind, TemplateNode, UnionTemplate},
    normalization::normalize_leaf,
    union_member::detect_member,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResultProcessingError {
    #[error("Field '{field}' is missing from the '{type_name}' record")]
    MissingField { field: String, type_name: String },

    #[error("Expected a record, map or list for '{field}', got {actual}")]
    ShapeMismatch { field: String, actual: &'static str },

    #[error("Could not determine the union member of {value}")]
    UnresolvableUnionMember { value: String },

    #[error("Cannot determine the public fields of struct type '{0}'")]
    UnknownStructType(String),
}

pub struct ResultProcessor<'a> {
    introspector: &'a dyn SchemaIntrospector,
    formatter: &'a NameFormatter,
}

impl<'a> ResultProcessor<'a> {
    pub fn new(introspector: &'a dyn SchemaIntrospector, formatter: &'a NameFormatter) -> Self {
        Self {
            introspector,
            formatter,
        }
    }

    #[instrument(name = "ResultProcessor::process", skip_all)]
    pub fn process(
        &self,
        raw: &Val,
        template: &ExtractionTemplate,
    ) -> Result<Value, ResultProcessingError> {
        let result = self.extract(raw, template, "");
        if let Err(err) = &result {
            error!("Result does not match the extraction template: {}", err);
        }
        result
    }

    fn extract(
        &self,
        raw: &Val,
        template: &ExtractionTemplate,
        field: &str,
    ) -> Result<Value, ResultProcessingError> {
        match template {
            ExtractionTemplate::Scalar => self.normalize(raw),
            ExtractionTemplate::Fields(nodes) => self.extract_fields(raw, nodes, field),
            ExtractionTemplate::Union(union) => self.extract_union(raw, union),
        }
    }

    /// Pull exactly `nodes` out of a record or map (or each element of a list of them).
    fn extract_fields(
        &self,
        raw: &Val,
        nodes: &[TemplateNode],
        field: &str,
    ) -> Result<Value, ResultProcessingError> {
        match raw {
            Val::Null => Ok(Value::Null),
            Val::List(items) => items
                .iter()
                .map(|item| self.extract_fields(item, nodes, field))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Val::Record(record) => nodes
                .iter()
                .map(|node| {
                    let value = record.get(&node.field).ok_or_else(|| {
                        ResultProcessingError::MissingField {
                            field: node.field.clone(),
                            type_name: record.type_name.clone(),
                        }
                    })?;
                    Ok((
                        self.formatter.to_external(&node.field),
                        self.extract_node(value, node)?,
                    ))
                })
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            // Maps omit keys for unset values
            Val::Map(map) => nodes
                .iter()
                .map(|node| {
                    let value = map.get(&node.field).unwrap_or(&Val::Null);
                    Ok((
                        self.formatter.to_external(&node.field),
                        self.extract_node(value, node)?,
                    ))
                })
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            _ => Err(ResultProcessingError::ShapeMismatch {
                field: field.to_string(),
                actual: raw.kind_name(),
            }),
        }
    }

    fn extract_node(&self, raw: &Val, node: &TemplateNode) -> Result<Value, ResultProcessingError> {
        if raw.is_null() {
            return Ok(Value::Null);
        }

        match &node.kind {
            TemplateKind::Attribute | TemplateKind::Aggregate => self.normalize(raw),
            TemplateKind::Relationship(nodes)
            | TemplateKind::Embedded(nodes)
            | TemplateKind::MapWithConstraints(nodes) => {
                self.extract_fields(raw, nodes, &node.field)
            }
            TemplateKind::Calculation { nested, .. } => self.extract(raw, nested, &node.field),
            TemplateKind::Union(union) => self.extract_union(raw, union),
        }
    }

    /// A union value becomes `{member: value}` for its (single) populated member, or `null` if that
    /// member was not requested.
    fn extract_union(
        &self,
        raw: &Val,
        union: &UnionTemplate,
    ) -> Result<Value, ResultProcessingError> {
        if raw.is_null() {
            return Ok(Value::Null);
        }

        let Some((member, value)) = detect_member(raw, &union.union_type) else {
            return match raw {
                // A list of union values
                Val::List(items) => items
                    .iter()
                    .map(|item| self.extract_union(item, union))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                _ => Err(ResultProcessingError::UnresolvableUnionMember {
                    value: raw.to_string(),
                }),
            };
        };

        let Some(requested) = union.member(&member.name) else {
            return Ok(Value::Null);
        };

        let extracted = if value.is_null() {
            Value::Null
        } else {
            self.extract(value, &requested.nested, &member.name)?
        };

        Ok(Value::Object(Map::from_iter([(
            self.formatter.to_external(&member.name),
            extracted,
        )])))
    }

    /// Render a value with no field selection of its own.
    ///
    /// Map keys go through the name formatter. Records are reduced to the public attributes of
    /// their resource (or the declared fields of their typed struct) so that values the schema
    /// does not expose never reach the client.
    pub fn normalize(&self, raw: &Val) -> Result<Value, ResultProcessingError> {
        if let Some(leaf) = normalize_leaf(raw) {
            return Ok(leaf);
        }

        match raw {
            Val::List(items) => items
                .iter()
                .map(|item| self.normalize(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Val::Map(map) => map
                .iter()
                .map(|(key, value)| Ok((self.formatter.to_external(key), self.normalize(value)?)))
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            Val::Record(record) => self.normalize_record(record),
            Val::Union(union) => Ok(Value::Object(Map::from_iter([(
                self.formatter.to_external(&union.member),
                self.normalize(&union.value)?,
            )]))),
            _ => Ok(Value::Null),
        }
    }

    /// Resource records keep their public attributes; typed structs keep their declared fields.
    fn normalize_record(&self, record: &Record) -> Result<Value, ResultProcessingError> {
        let names: Vec<&str> = if let Some(attributes) =
            self.introspector.public_attributes(&record.type_name)
        {
            attributes.into_iter().map(|a| a.name.as_str()).collect()
        } else if let Some(typed) = self.introspector.typed_struct(&record.type_name) {
            typed.fields.iter().map(|f| f.name.as_str()).collect()
        } else {
            return Err(ResultProcessingError::UnknownStructType(record.type_name.clone()));
        };

        names
            .into_iter()
            .filter_map(|name| record.get(name).map(|value| (name, value)))
            .map(|(name, value)| Ok((self.formatter.to_external(name), self.normalize(value)?)))
            .collect::<Result<Map<_, _>, _>>()
            .map(Value::Object)
    }
}
