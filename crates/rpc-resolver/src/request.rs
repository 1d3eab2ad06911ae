// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The request envelope: which action to run, with what input, and how to sort and page it.

use std::fmt::{Display, Formatter};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use rpc_common::formatter::NameFormatter;
use rpc_model::{
    introspector::{FieldKind, SchemaIntrospector},
    resource::{Action, PaginationSupport, Resource},
};

use crate::selection::FieldSelection;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("'{key}' must be a {expected}")]
    InvalidFieldType { key: String, expected: &'static str },

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("Action '{0}' requires a primary key")]
    MissingIdentity(String),

    #[error("Input field '{field}' is not accepted by action '{action}'")]
    UnknownInputField { field: String, action: String },

    #[error("Cannot sort by '{field}'")]
    InvalidSortField { field: String },

    #[error("A tenant is required to run '{0}'")]
    TenantRequired(String),
}

impl RequestError {
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::InvalidRequest(_) => "invalid_request",
            RequestError::InvalidFieldType { .. } => "invalid_field_type",
            RequestError::InvalidPagination(_) => "invalid_pagination",
            RequestError::MissingIdentity(_) => "missing_identity",
            RequestError::UnknownInputField { .. } => "invalid_argument",
            RequestError::InvalidSortField { .. } => "invalid_sort_field",
            RequestError::TenantRequired(_) => "tenant_required",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    /// The public RPC action name
    pub action: String,
    /// Client-formatted input
    pub input: Map<String, Value>,
    pub fields: Vec<FieldSelection>,
    pub identity: Option<Value>,
    pub filter: Option<Value>,
    pub sort: Option<String>,
    pub page: Option<Map<String, Value>>,
    pub tenant: Option<Value>,
}

impl RpcRequest {
    pub fn parse(request: &Value) -> Result<Self, RequestError> {
        let Value::Object(request) = request else {
            return Err(RequestError::InvalidRequest(
                "the request must be a map".to_string(),
            ));
        };

        let action = match request.get("action") {
            Some(Value::String(action)) => action.clone(),
            None | Some(Value::Null) => {
                return Err(RequestError::InvalidRequest(
                    "'action' is required".to_string(),
                ));
            }
            Some(_) => return Err(invalid_type("action", "string")),
        };

        let input = match present(request, "input") {
            None => Map::new(),
            Some(Value::Object(input)) => input.clone(),
            Some(_) => return Err(invalid_type("input", "map")),
        };

        let fields = match present(request, "fields") {
            None => vec![],
            Some(fields @ Value::Array(_)) => FieldSelection::parse_list(fields),
            Some(_) => return Err(invalid_type("fields", "list")),
        };

        let (identity_key, identity) = match present(request, "primaryKey") {
            Some(identity) => ("primaryKey", Some(identity)),
            None => ("identity", present(request, "identity")),
        };
        let identity = match identity {
            None => None,
            Some(identity @ (Value::String(_) | Value::Number(_) | Value::Object(_))) => {
                Some(identity.clone())
            }
            Some(_) => return Err(invalid_type(identity_key, "string or map")),
        };

        let filter = match present(request, "filter") {
            None => None,
            Some(filter @ Value::Object(_)) => Some(filter.clone()),
            Some(_) => return Err(invalid_type("filter", "map")),
        };

        let sort = match present(request, "sort") {
            None => None,
            Some(Value::String(sort)) => Some(sort.clone()),
            Some(_) => return Err(invalid_type("sort", "string")),
        };

        let page = match present(request, "page") {
            None => None,
            Some(Value::Object(page)) => Some(page.clone()),
            Some(_) => {
                return Err(RequestError::InvalidPagination(
                    "'page' must be a map".to_string(),
                ));
            }
        };

        Ok(Self {
            action,
            input,
            fields,
            identity,
            filter,
            sort,
            page,
            tenant: present(request, "tenant").cloned(),
        })
    }
}

fn present<'a>(request: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    request.get(key).filter(|value| !value.is_null())
}

fn invalid_type(key: &str, expected: &'static str) -> RequestError {
    RequestError::InvalidFieldType {
        key: key.to_string(),
        expected,
    }
}

/// Convert input keys to internal form and check them against what the action accepts.
pub fn format_input(
    input: &Map<String, Value>,
    action: &Action,
    formatter: &NameFormatter,
) -> Result<Map<String, Value>, RequestError> {
    let mut formatted = Map::new();

    for (key, value) in input {
        let name = formatter.to_internal(key);
        let accepted =
            action.accept.iter().any(|a| a == &name) || action.argument(&name).is_some();
        if !accepted {
            return Err(RequestError::UnknownInputField {
                field: name,
                action: action.name.clone(),
            });
        }
        formatted.insert(name, formatter.format_keys_internal(value));
    }

    Ok(formatted)
}

/// Sort modifier, kept as written by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortModifier {
    None,
    /// `+`: ascending
    Plus,
    /// `++`: ascending, nulls first
    PlusPlus,
    /// `-`: descending
    Minus,
    /// `--`: descending, nulls last
    MinusMinus,
}

impl SortModifier {
    pub fn prefix(&self) -> &'static str {
        match self {
            SortModifier::None => "",
            SortModifier::Plus => "+",
            SortModifier::PlusPlus => "++",
            SortModifier::Minus => "-",
            SortModifier::MinusMinus => "--",
        }
    }

    fn split(token: &str) -> (Self, &str) {
        // Longest prefix first
        [
            SortModifier::PlusPlus,
            SortModifier::MinusMinus,
            SortModifier::Plus,
            SortModifier::Minus,
        ]
        .into_iter()
        .find_map(|modifier| {
            token
                .strip_prefix(modifier.prefix())
                .map(|field| (modifier, field))
        })
        .unwrap_or((SortModifier::None, token))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortField {
    /// Internal field name
    pub field: String,
    pub modifier: SortModifier,
}

impl Display for SortField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.modifier.prefix(), self.field)
    }
}

/// Parse a comma-separated sort string, converting each field name to internal form.
pub fn parse_sort(sort: &str, formatter: &NameFormatter) -> Result<Vec<SortField>, RequestError> {
    sort.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            let (modifier, field) = SortModifier::split(token);
            if field.is_empty() {
                return Err(RequestError::InvalidSortField {
                    field: token.to_string(),
                });
            }
            Ok(SortField {
                field: formatter.to_internal(field),
                modifier,
            })
        })
        .collect()
}

/// Render parsed sort fields back into a sort string (internal names, modifiers in place).
pub fn sort_string(fields: &[SortField]) -> String {
    fields
        .iter()
        .map(SortField::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Sorting is possible on public attributes, calculations and aggregates.
pub fn check_sort(
    fields: &[SortField],
    resource: &Resource,
    introspector: &dyn SchemaIntrospector,
) -> Result<(), RequestError> {
    for sort_field in fields {
        let sortable = introspector
            .classify(resource, &sort_field.field)
            .is_some_and(|kind| !matches!(kind, FieldKind::Relationship(_)));
        if !sortable {
            return Err(RequestError::InvalidSortField {
                field: sort_field.field.clone(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PageRequest {
    Offset {
        limit: Option<u64>,
        offset: u64,
        count: bool,
    },
    Keyset {
        limit: Option<u64>,
        after: Option<String>,
        before: Option<String>,
        count: bool,
    },
}

const PAGE_KEYS: [&str; 5] = ["limit", "offset", "after", "before", "count"];

impl PageRequest {
    /// Validate the request's `page` against the action's pagination support.
    ///
    /// Actions that require pagination get a default page when none is given.
    pub fn parse(
        page: Option<&Map<String, Value>>,
        action: &Action,
    ) -> Result<Option<PageRequest>, RequestError> {
        let invalid = RequestError::InvalidPagination;

        let Some(support) = &action.pagination else {
            return match page {
                Some(_) => Err(invalid(format!(
                    "action '{}' does not support pagination",
                    action.name
                ))),
                None => Ok(None),
            };
        };

        let Some(page) = page else {
            return Ok(support.required.then(|| default_page(support)));
        };

        if let Some(key) = page.keys().find(|key| !PAGE_KEYS.contains(&key.as_str())) {
            return Err(invalid(format!("unknown key '{key}'")));
        }

        let limit = match page.get("limit") {
            None | Some(Value::Null) => support.default_limit,
            Some(limit) => match limit.as_u64() {
                Some(limit) if limit > 0 => Some(limit),
                _ => return Err(invalid("'limit' must be a positive integer".to_string())),
            },
        };
        if let (Some(limit), Some(max)) = (limit, support.max_limit)
            && limit > max
        {
            return Err(invalid(format!("'limit' must not exceed {max}")));
        }

        let offset = match page.get("offset") {
            None | Some(Value::Null) => None,
            Some(offset) => match offset.as_u64() {
                Some(offset) => Some(offset),
                None => {
                    return Err(invalid(
                        "'offset' must be a non-negative integer".to_string(),
                    ));
                }
            },
        };

        let cursor = |key: &str| match page.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(cursor)) => Ok(Some(cursor.clone())),
            Some(_) => Err(invalid(format!("'{key}' must be a string"))),
        };
        let after = cursor("after")?;
        let before = cursor("before")?;

        let count = match page.get("count") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(count)) => *count,
            Some(_) => return Err(invalid("'count' must be a boolean".to_string())),
        };
        if count && !support.countable {
            return Err(invalid(format!(
                "action '{}' does not support counting",
                action.name
            )));
        }

        let keyset = after.is_some() || before.is_some();
        if keyset && offset.is_some() {
            return Err(invalid(
                "'offset' cannot be combined with 'after' or 'before'".to_string(),
            ));
        }
        if after.is_some() && before.is_some() {
            return Err(invalid(
                "'after' and 'before' cannot be combined".to_string(),
            ));
        }

        let use_offset = offset.is_some() || (!keyset && support.offset);
        if use_offset {
            if !support.offset {
                return Err(invalid(format!(
                    "action '{}' does not support offset pagination",
                    action.name
                )));
            }
            Ok(Some(PageRequest::Offset {
                limit,
                offset: offset.unwrap_or_default(),
                count,
            }))
        } else {
            if !support.keyset {
                return Err(invalid(format!(
                    "action '{}' does not support keyset pagination",
                    action.name
                )));
            }
            Ok(Some(PageRequest::Keyset {
                limit,
                after,
                before,
                count,
            }))
        }
    }
}

fn default_page(support: &PaginationSupport) -> PageRequest {
    if support.offset {
        PageRequest::Offset {
            limit: support.default_limit,
            offset: 0,
            count: false,
        }
    } else {
        PageRequest::Keyset {
            limit: support.default_limit,
            after: None,
            before: None,
            count: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_model::resource::ActionKind;
    use serde_json::json;

    fn paginated(support: PaginationSupport) -> Action {
        Action::new("read", ActionKind::Read).with_pagination(support)
    }

    fn page(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn parses_the_envelope() {
        let request = RpcRequest::parse(&json!({
            "action": "list_todos",
            "input": {"showCompleted": true},
            "fields": ["id", {"user": ["name"]}],
            "primaryKey": "123",
            "sort": "-dueDate",
            "page": {"limit": 10},
            "tenant": "org_1",
            "filter": null,
        }))
        .unwrap();

        assert_eq!(request.action, "list_todos");
        assert_eq!(request.input.get("showCompleted"), Some(&json!(true)));
        assert_eq!(request.fields.len(), 2);
        assert_eq!(request.identity, Some(json!("123")));
        assert_eq!(request.filter, None);
        assert_eq!(request.sort.as_deref(), Some("-dueDate"));
        assert_eq!(request.tenant, Some(json!("org_1")));
    }

    #[test]
    fn rejects_malformed_envelopes() {
        assert!(matches!(
            RpcRequest::parse(&json!({"fields": []})),
            Err(RequestError::InvalidRequest(_))
        ));
        assert!(matches!(
            RpcRequest::parse(&json!([])),
            Err(RequestError::InvalidRequest(_))
        ));
        assert_eq!(
            RpcRequest::parse(&json!({"action": "x", "fields": "id"})).unwrap_err(),
            RequestError::InvalidFieldType {
                key: "fields".to_string(),
                expected: "list"
            }
        );
        assert_eq!(
            RpcRequest::parse(&json!({"action": "x", "identity": true}))
                .unwrap_err()
                .code(),
            "invalid_field_type"
        );
        assert_eq!(
            RpcRequest::parse(&json!({"action": "x", "page": 3}))
                .unwrap_err()
                .code(),
            "invalid_pagination"
        );
    }

    #[test]
    fn sort_modifiers_stay_in_place() {
        let formatter = NameFormatter::default();
        let fields = parse_sort("--dueDate, +title,++createdAt,-priority,estimatedCost", &formatter)
            .unwrap();

        assert_eq!(
            fields
                .iter()
                .map(|f| (f.modifier, f.field.as_str()))
                .collect::<Vec<_>>(),
            vec![
                (SortModifier::MinusMinus, "due_date"),
                (SortModifier::Plus, "title"),
                (SortModifier::PlusPlus, "created_at"),
                (SortModifier::Minus, "priority"),
                (SortModifier::None, "estimated_cost"),
            ]
        );
        assert_eq!(
            sort_string(&fields),
            "--due_date,+title,++created_at,-priority,estimated_cost"
        );

        assert!(matches!(
            parse_sort("title,--", &formatter),
            Err(RequestError::InvalidSortField { field }) if field == "--"
        ));
    }

    #[test]
    fn pagination_defaults() {
        let support = PaginationSupport {
            offset: true,
            required: true,
            default_limit: Some(25),
            ..Default::default()
        };

        assert_eq!(
            PageRequest::parse(None, &paginated(support.clone())).unwrap(),
            Some(PageRequest::Offset {
                limit: Some(25),
                offset: 0,
                count: false
            })
        );
        assert_eq!(
            PageRequest::parse(
                None,
                &paginated(PaginationSupport {
                    required: false,
                    ..support
                })
            )
            .unwrap(),
            None
        );
    }

    #[test]
    fn pagination_shapes() {
        let action = paginated(PaginationSupport {
            offset: true,
            keyset: true,
            countable: true,
            max_limit: Some(100),
            ..Default::default()
        });

        assert_eq!(
            PageRequest::parse(Some(&page(json!({"after": "abc", "limit": 5}))), &action).unwrap(),
            Some(PageRequest::Keyset {
                limit: Some(5),
                after: Some("abc".to_string()),
                before: None,
                count: false
            })
        );
        assert_eq!(
            PageRequest::parse(Some(&page(json!({"offset": 20, "count": true}))), &action)
                .unwrap(),
            Some(PageRequest::Offset {
                limit: None,
                offset: 20,
                count: true
            })
        );

        for invalid in [
            json!({"limit": 0}),
            json!({"limit": 101}),
            json!({"limit": "10"}),
            json!({"offset": -1}),
            json!({"offset": 1, "after": "abc"}),
            json!({"after": "abc", "before": "def"}),
            json!({"count": "yes"}),
            json!({"size": 10}),
        ] {
            assert!(
                matches!(
                    PageRequest::parse(Some(&page(invalid.clone())), &action),
                    Err(RequestError::InvalidPagination(_))
                ),
                "{invalid} should be rejected"
            );
        }
    }

    #[test]
    fn pagination_support_is_enforced() {
        let unpaginated = Action::new("read", ActionKind::Read);
        assert!(PageRequest::parse(Some(&page(json!({"limit": 1}))), &unpaginated).is_err());
        assert_eq!(PageRequest::parse(None, &unpaginated).unwrap(), None);

        let keyset_only = paginated(PaginationSupport {
            keyset: true,
            ..Default::default()
        });
        assert!(PageRequest::parse(Some(&page(json!({"offset": 1}))), &keyset_only).is_err());
        assert!(PageRequest::parse(Some(&page(json!({"count": true}))), &keyset_only).is_err());
        assert!(matches!(
            PageRequest::parse(Some(&page(json!({"limit": 3}))), &keyset_only),
            Ok(Some(PageRequest::Keyset { .. }))
        ));
    }
}
