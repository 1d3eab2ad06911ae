// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Maps every failure the pipeline can run into to the client's error shape.

use serde::Serialize;
use serde_json::{Map, Value};

use rpc_common::formatter::NameFormatter;

use crate::{
    executor::EngineError,
    request::RequestError,
    requested_fields_error::{FieldPath, RequestedFieldsError},
    result_processor::ResultProcessingError,
};

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub short_message: String,
    pub vars: Map<String, Value>,
    /// Client-formatted names of the fields that caused the error
    pub fields: Vec<String>,
    /// Client-formatted location within a nested field selection
    pub path: Vec<String>,
    pub details: Map<String, Value>,
}

impl RpcError {
    fn new(error_type: &str, message: impl Into<String>, short_message: &str) -> Self {
        Self {
            error_type: error_type.to_string(),
            message: message.into(),
            short_message: short_message.to_string(),
            vars: Map::new(),
            fields: vec![],
            path: vec![],
            details: Map::new(),
        }
    }

    fn with_var(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.vars.insert(name.to_string(), value.into());
        self
    }

    fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    fn with_path(mut self, path: Vec<String>) -> Self {
        self.path = path;
        self
    }

    fn with_detail(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.details.insert(name.to_string(), value.into());
        self
    }
}

/// Anything that stops a request from producing data.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcFailure {
    Request(RequestError),
    Fields(RequestedFieldsError),
    Engine(EngineError),
    Result(ResultProcessingError),
}

impl From<RequestError> for RpcFailure {
    fn from(err: RequestError) -> Self {
        RpcFailure::Request(err)
    }
}

impl From<RequestedFieldsError> for RpcFailure {
    fn from(err: RequestedFieldsError) -> Self {
        RpcFailure::Fields(err)
    }
}

impl From<EngineError> for RpcFailure {
    fn from(err: EngineError) -> Self {
        RpcFailure::Engine(err)
    }
}

impl From<ResultProcessingError> for RpcFailure {
    fn from(err: ResultProcessingError) -> Self {
        RpcFailure::Result(err)
    }
}

pub struct ErrorBuilder<'a> {
    formatter: &'a NameFormatter,
}

impl<'a> ErrorBuilder<'a> {
    pub fn new(formatter: &'a NameFormatter) -> Self {
        Self { formatter }
    }

    /// All client errors for a failure. Only the engine reports several errors at once.
    pub fn build_all(&self, failure: &RpcFailure) -> Vec<RpcError> {
        match failure {
            RpcFailure::Engine(err) => {
                let mut errors = vec![];
                self.collect_engine_errors(err, &mut errors);
                if errors.is_empty() {
                    errors.push(self.unknown_error(&Value::Array(vec![])));
                }
                errors
            }
            _ => vec![self.build(failure)],
        }
    }

    /// The client error for a failure (the first one, for failures that carry several).
    pub fn build(&self, failure: &RpcFailure) -> RpcError {
        match failure {
            RpcFailure::Request(err) => self.request_error(err),
            RpcFailure::Fields(err) => self.fields_error(err),
            RpcFailure::Engine(err) => {
                let mut errors = vec![];
                self.collect_engine_errors(err, &mut errors);
                errors
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| self.unknown_error(&Value::Array(vec![])))
            }
            RpcFailure::Result(_) => RpcError::new(
                "internal_error",
                "The result could not be processed",
                "Internal error",
            ),
        }
    }

    fn external(&self, name: &str) -> String {
        self.formatter.to_external(name)
    }

    fn external_path(&self, segments: &[String]) -> Vec<String> {
        segments.iter().map(|s| self.external(s)).collect()
    }

    fn fields_error(&self, err: &RequestedFieldsError) -> RpcError {
        let Some(path) = err.path() else {
            let RequestedFieldsError::ActionNotFound(action) = err else {
                return self.unknown_error(&Value::String(err.to_string()));
            };
            return RpcError::new(
                err.code(),
                format!("No such action '{action}'"),
                "Action not found",
            )
            .with_var("action", action.as_str());
        };

        let dotted = self.external_path(path.segments()).join(".");

        let error = match err {
            RequestedFieldsError::UnknownField { type_name, .. } => RpcError::new(
                err.code(),
                format!("Unknown field '{dotted}' for type '{type_name}'"),
                "Unknown field",
            )
            .with_var("type", type_name.as_str()),
            RequestedFieldsError::UnknownUnionField { .. } => RpcError::new(
                err.code(),
                format!("Unknown union member '{dotted}'"),
                "Unknown union member",
            ),
            RequestedFieldsError::UnknownMapField { type_name, .. } => RpcError::new(
                err.code(),
                format!("Unknown field '{dotted}' for map type '{type_name}'"),
                "Unknown map field",
            )
            .with_var("type", type_name.as_str()),
            RequestedFieldsError::FieldDoesNotSupportNesting { .. } => RpcError::new(
                err.code(),
                format!("Field '{dotted}' does not support nested field selection"),
                "Field does not support nesting",
            ),
            RequestedFieldsError::UnsupportedFieldCombination { reason, .. } => RpcError::new(
                err.code(),
                format!("Unsupported field combination for '{dotted}': {reason}"),
                "Unsupported field combination",
            )
            .with_var("reason", reason.as_str()),
            RequestedFieldsError::RequiresFieldSelection { .. } if path.is_root() => {
                RpcError::new(
                    err.code(),
                    "The action result requires a field selection",
                    "Requires field selection",
                )
            }
            RequestedFieldsError::RequiresFieldSelection { .. } => RpcError::new(
                err.code(),
                format!("Field '{dotted}' requires a field selection"),
                "Requires field selection",
            ),
            RequestedFieldsError::InvalidCalculationArgs { reason, .. } => RpcError::new(
                err.code(),
                format!("Invalid arguments for calculation '{dotted}': {reason}"),
                "Invalid calculation arguments",
            )
            .with_var("reason", reason.as_str()),
            RequestedFieldsError::InvalidFieldSelection { reason, .. } if path.is_root() => {
                RpcError::new(
                    err.code(),
                    format!("Invalid field selection: {reason}"),
                    "Invalid field selection",
                )
                .with_var("reason", reason.as_str())
            }
            RequestedFieldsError::InvalidFieldSelection { reason, .. } => RpcError::new(
                err.code(),
                format!("Invalid field selection for '{dotted}': {reason}"),
                "Invalid field selection",
            )
            .with_var("reason", reason.as_str()),
            RequestedFieldsError::InvalidFieldType { value, .. } => {
                // The path locates the list holding the entry, not a field
                return RpcError::new(
                    err.code(),
                    format!("Invalid field selection entry {value}"),
                    "Invalid field type",
                )
                .with_var("value", value.clone())
                .with_path(self.external_path(path.segments()));
            }
            RequestedFieldsError::ActionNotFound(_) => {
                return self.unknown_error(&Value::String(err.to_string()));
            }
        };

        self.locate(error.with_var("field", dotted), path)
    }

    fn locate(&self, error: RpcError, path: &FieldPath) -> RpcError {
        let error = error.with_path(self.external_path(path.parents()));
        match path.leaf() {
            Some(leaf) => error.with_field(self.external(leaf)),
            None => error,
        }
    }

    fn request_error(&self, err: &RequestError) -> RpcError {
        match err {
            RequestError::InvalidRequest(message) => {
                RpcError::new(err.code(), message.as_str(), "Invalid request")
            }
            RequestError::InvalidFieldType { key, expected } => {
                RpcError::new(err.code(), err.to_string(), "Invalid field type")
                    .with_field(key.as_str())
                    .with_var("field", key.as_str())
                    .with_var("expected", *expected)
            }
            RequestError::InvalidPagination(message) => RpcError::new(
                err.code(),
                format!("Invalid pagination: {message}"),
                "Invalid pagination",
            )
            .with_field("page"),
            RequestError::MissingIdentity(action) => {
                RpcError::new(err.code(), err.to_string(), "Missing primary key")
                    .with_field("primaryKey")
                    .with_var("action", action.as_str())
            }
            RequestError::UnknownInputField { field, action } => {
                let field = self.external(field);
                RpcError::new(
                    err.code(),
                    format!("Input field '{field}' is not accepted by action '{action}'"),
                    "Unknown input field",
                )
                .with_field(field.as_str())
                .with_var("field", field)
                .with_var("action", action.as_str())
                .with_detail("reason", "unknown_input_field")
            }
            RequestError::InvalidSortField { field } => {
                let field = self.external(field);
                RpcError::new(
                    err.code(),
                    format!("Cannot sort by '{field}'"),
                    "Invalid sort field",
                )
                .with_field(field.as_str())
                .with_var("field", field)
            }
            RequestError::TenantRequired(action) => {
                RpcError::new(err.code(), err.to_string(), "Tenant required")
                    .with_field("tenant")
                    .with_var("action", action.as_str())
            }
        }
    }

    fn collect_engine_errors(&self, err: &EngineError, errors: &mut Vec<RpcError>) {
        let error = match err {
            EngineError::Multiple(nested) => {
                for err in nested {
                    self.collect_engine_errors(err, errors);
                }
                return;
            }
            EngineError::InvalidAttribute { field, message } => {
                let field = self.external(field);
                RpcError::new("invalid_attribute", message.as_str(), "Invalid attribute")
                    .with_field(field.as_str())
                    .with_var("field", field)
            }
            EngineError::InvalidArgument { field, message } => {
                let field = self.external(field);
                RpcError::new("invalid_argument", message.as_str(), "Invalid argument")
                    .with_field(field.as_str())
                    .with_var("field", field)
            }
            EngineError::NotFound { resource } => {
                RpcError::new("not_found", err.to_string(), "Not found")
                    .with_var("resource", resource.as_str())
            }
            EngineError::Forbidden => RpcError::new("forbidden", "Forbidden", "Forbidden"),
            EngineError::Other { class, message } => {
                RpcError::new("ash_error", message.as_str(), "Error")
                    .with_detail("class", class.as_str())
            }
            EngineError::Unknown(raw) => self.unknown_error(raw),
        };
        errors.push(error);
    }

    fn unknown_error(&self, raw: &Value) -> RpcError {
        RpcError::new("unknown_error", "An unexpected error occurred", "Unknown error")
            .with_detail("error", raw.clone())
    }
}
