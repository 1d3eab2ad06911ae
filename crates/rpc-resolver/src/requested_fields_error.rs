// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt::{Display, Formatter};

use serde_json::Value;
use thiserror::Error;

/// Location of a field within a (nested) field selection, as internal names from the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The field itself (the last segment).
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Segments leading to the field, excluding the field itself.
    pub fn parents(&self) -> &[String] {
        match self.0.split_last() {
            Some((_, parents)) => parents,
            None => &[],
        }
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl<const N: usize> From<[&str; N]> for FieldPath {
    fn from(segments: [&str; N]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestedFieldsError {
    #[error("No such action '{0}'")]
    ActionNotFound(String),

    #[error("Field '{path}' is not valid for type '{type_name}'")]
    UnknownField { path: FieldPath, type_name: String },

    #[error("'{path}' is not a member of the union")]
    UnknownUnionField { path: FieldPath },

    #[error("Field '{path}' is not valid for map type '{type_name}'")]
    UnknownMapField { path: FieldPath, type_name: String },

    #[error("Field '{path}' does not support nested field selection")]
    FieldDoesNotSupportNesting { path: FieldPath },

    #[error("Unsupported field combination for '{path}': {reason}")]
    UnsupportedFieldCombination { path: FieldPath, reason: String },

    #[error("Field '{path}' requires a field selection")]
    RequiresFieldSelection { path: FieldPath },

    #[error("Invalid calculation arguments for '{path}': {reason}")]
    InvalidCalculationArgs { path: FieldPath, reason: String },

    #[error("Invalid field selection for '{path}': {reason}")]
    InvalidFieldSelection { path: FieldPath, reason: String },

    #[error("Field selection entries must be names or single-key maps, got {value}")]
    InvalidFieldType { path: FieldPath, value: Value },
}

impl RequestedFieldsError {
    /// The client-facing error type.
    pub fn code(&self) -> &'static str {
        match self {
            RequestedFieldsError::ActionNotFound(_) => "action_not_found",
            RequestedFieldsError::UnknownField { .. } => "unknown_field",
            RequestedFieldsError::UnknownUnionField { .. } => "unknown_union_field",
            RequestedFieldsError::UnknownMapField { .. } => "unknown_map_field",
            RequestedFieldsError::FieldDoesNotSupportNesting { .. } => {
                "field_does_not_support_nesting"
            }
            RequestedFieldsError::UnsupportedFieldCombination { .. } => {
                "unsupported_field_combination"
            }
            RequestedFieldsError::RequiresFieldSelection { .. } => "requires_field_selection",
            RequestedFieldsError::InvalidCalculationArgs { .. } => "invalid_calculation_args",
            RequestedFieldsError::InvalidFieldSelection { .. } => "invalid_field_selection",
            RequestedFieldsError::InvalidFieldType { .. } => "invalid_field_type",
        }
    }

    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            RequestedFieldsError::ActionNotFound(_) => None,
            RequestedFieldsError::UnknownField { path, .. }
            | RequestedFieldsError::UnknownUnionField { path }
            | RequestedFieldsError::UnknownMapField { path, .. }
            | RequestedFieldsError::FieldDoesNotSupportNesting { path }
            | RequestedFieldsError::UnsupportedFieldCombination { path, .. }
            | RequestedFieldsError::RequiresFieldSelection { path }
            | RequestedFieldsError::InvalidCalculationArgs { path, .. }
            | RequestedFieldsError::InvalidFieldSelection { path, .. }
            | RequestedFieldsError::InvalidFieldType { path, .. } => Some(path),
        }
    }
}
