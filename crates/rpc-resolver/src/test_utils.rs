// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A todo-app schema exercising every field kind, plus an executor that replays canned results.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use rpc_common::value::{Record, UnionVal, Val};
use rpc_model::{
    resource::{
        Action, ActionKind, Aggregate, AggregateKind, Argument, Attribute, Calculation,
        Cardinality, PaginationSupport, Relationship, Resource,
    },
    schema::{RpcActionDefinition, Schema, SchemaDefinition},
    types::{
        FieldType, PrimitiveType, TypedField, TypedFields, UnionMember, UnionStorage, UnionType,
    },
};

use crate::{
    executor::{ActionExecutor, ActionInvocation, EngineError, RawResult},
    request::sort_string,
};

fn primitive(primitive: PrimitiveType) -> FieldType {
    FieldType::primitive(primitive)
}

fn string() -> FieldType {
    primitive(PrimitiveType::String)
}

fn integer() -> FieldType {
    primitive(PrimitiveType::Integer)
}

fn uuid() -> FieldType {
    primitive(PrimitiveType::Uuid)
}

fn typed(fields: &[(&str, FieldType)]) -> TypedFields {
    TypedFields::new(
        fields
            .iter()
            .map(|(name, typ)| TypedField::new(*name, typ.clone()))
            .collect(),
    )
}

fn todo() -> Resource {
    let location = TypedFields {
        instance_of: Some("Location".to_string()),
        ..typed(&[
            ("lat", primitive(PrimitiveType::Float)),
            ("lng", primitive(PrimitiveType::Float)),
            ("label", string()),
        ])
    };

    let content = UnionType {
        storage: UnionStorage::TypeAndValue,
        members: vec![
            UnionMember::new("text", FieldType::Embedded("TextContent".into())),
            UnionMember::new("link", FieldType::Embedded("LinkContent".into())),
            UnionMember::new("note", string()),
            UnionMember::new("priority_value", integer()),
        ],
    };

    let attachment = UnionType {
        storage: UnionStorage::MapWithTag,
        members: vec![
            UnionMember::new(
                "file",
                FieldType::Map(typed(&[
                    ("kind", string()),
                    ("filename", string()),
                    ("size", integer()),
                ])),
            )
            .with_tag("kind", "file"),
            UnionMember::new(
                "url",
                FieldType::Map(typed(&[("kind", string()), ("href", string())])),
            )
            .with_tag("kind", "url"),
        ],
    };

    let status_info = UnionType {
        storage: UnionStorage::Untagged,
        members: vec![
            UnionMember::new("message", string()),
            UnionMember::new("code", integer()),
            UnionMember::new("details", FieldType::Map(TypedFields::default())),
        ],
    };

    let owner_info = TypedFields {
        instance_of: Some("OwnerInfo".to_string()),
        ..typed(&[("name", string()), ("email", string())])
    };

    Resource::new("Todo")
        .with_attribute(Attribute::new("id", uuid()).required())
        .with_attribute(Attribute::new("title", string()).required())
        .with_attribute(Attribute::new("description", string()))
        .with_attribute(Attribute::new(
            "completed",
            primitive(PrimitiveType::Boolean),
        ))
        .with_attribute(Attribute::new(
            "priority",
            FieldType::Enum(vec![
                "low".into(),
                "medium".into(),
                "high".into(),
                "urgent".into(),
            ]),
        ))
        .with_attribute(Attribute::new("due_date", primitive(PrimitiveType::Date)))
        .with_attribute(Attribute::new(
            "created_at",
            primitive(PrimitiveType::DateTime),
        ))
        .with_attribute(Attribute::new(
            "estimated_cost",
            primitive(PrimitiveType::Decimal),
        ))
        .with_attribute(Attribute::new("tags", FieldType::array(string())))
        .with_attribute(Attribute::new("address_line_1", string()))
        .with_attribute(Attribute::new(
            "metadata",
            FieldType::Embedded("TodoMetadata".into()),
        ))
        .with_attribute(Attribute::new(
            "metadata_history",
            FieldType::array(FieldType::Embedded("TodoMetadata".into())),
        ))
        .with_attribute(Attribute::new("location", FieldType::Struct(location)))
        .with_attribute(Attribute::new(
            "settings",
            FieldType::Map(typed(&[
                ("notifications", primitive(PrimitiveType::Boolean)),
                ("theme", string()),
            ])),
        ))
        .with_attribute(Attribute::new("raw_data", primitive(PrimitiveType::Json)))
        .with_attribute(Attribute::new("content", FieldType::Union(content)))
        .with_attribute(Attribute::new("attachment", FieldType::Union(attachment)))
        .with_attribute(Attribute::new("status_info", FieldType::Union(status_info)))
        .with_attribute(Attribute::new("internal_notes", string()).private())
        .with_relationship(Relationship::new("user", "User", Cardinality::One))
        .with_relationship(Relationship::new("comments", "Comment", Cardinality::Many))
        .with_relationship(Relationship::new("audit_log", "AuditLog", Cardinality::One))
        .with_calculation(Calculation::new(
            "is_overdue",
            primitive(PrimitiveType::Boolean),
        ))
        .with_calculation(
            Calculation::new("self", FieldType::Resource("Todo".into()))
                .with_argument(Argument::new("prefix", string())),
        )
        .with_calculation(
            Calculation::new("summary", string())
                .with_argument(Argument::new("max_length", integer()).required()),
        )
        .with_calculation(Calculation::new("owner_info", FieldType::Struct(owner_info)))
        .with_aggregate(Aggregate::new(
            "comment_count",
            AggregateKind::Count,
            integer(),
        ))
        .with_aggregate(Aggregate::new(
            "has_comments",
            AggregateKind::Exists,
            primitive(PrimitiveType::Boolean),
        ))
        .with_aggregate(Aggregate::new(
            "latest_comment_body",
            AggregateKind::First,
            string(),
        ))
        .with_action(
            Action::new("read", ActionKind::Read)
                .with_argument(Argument::new(
                    "show_completed",
                    primitive(PrimitiveType::Boolean),
                ))
                .with_pagination(PaginationSupport {
                    offset: true,
                    keyset: true,
                    countable: true,
                    max_limit: Some(100),
                    ..Default::default()
                }),
        )
        .with_action(Action::new("get_by_id", ActionKind::Read).get())
        .with_action(Action::new("create", ActionKind::Create).accepting(&[
            "title",
            "description",
            "priority",
            "due_date",
            "metadata",
            "content",
        ]))
        .with_action(Action::new("update", ActionKind::Update).accepting(&["title", "completed"]))
        .with_action(Action::new("destroy", ActionKind::Destroy))
        .with_action(
            Action::new("summarize", ActionKind::Action).returning(FieldType::Map(typed(&[
                ("total", integer()),
                ("completed", integer()),
                ("overdue", integer()),
            ]))),
        )
        .with_action(Action::new("count_todos", ActionKind::Action).returning(integer()))
        .with_action(
            Action::new("tag_list", ActionKind::Action).returning(FieldType::array(string())),
        )
        .with_action(
            Action::new("raw_stats", ActionKind::Action)
                .returning(FieldType::Map(TypedFields::default())),
        )
        .with_action(
            Action::new("search", ActionKind::Action)
                .with_argument(Argument::new("query", string()).required())
                .returning(FieldType::array(FieldType::Resource("Todo".into()))),
        )
        .with_action(Action::new("ping", ActionKind::Action))
}

fn resources() -> Vec<Resource> {
    vec![
        todo(),
        Resource::new("User")
            .with_attribute(Attribute::new("id", uuid()).required())
            .with_attribute(Attribute::new("name", string()))
            .with_attribute(Attribute::new("email", string()))
            .with_attribute(Attribute::new("password_hash", string()).private())
            .with_relationship(Relationship::new("todos", "Todo", Cardinality::Many))
            .with_action(Action::new("read", ActionKind::Read)),
        Resource::new("Comment")
            .multitenant()
            .with_attribute(Attribute::new("id", uuid()).required())
            .with_attribute(Attribute::new("body", string()))
            .with_relationship(Relationship::new("todo", "Todo", Cardinality::One))
            .with_action(Action::new("read", ActionKind::Read)),
        Resource::new("TodoMetadata")
            .embedded()
            .with_attribute(Attribute::new("category", string()))
            .with_attribute(Attribute::new("priority_score", integer()))
            .with_calculation(Calculation::new("display_category", string())),
        Resource::new("TextContent")
            .embedded()
            .with_attribute(Attribute::new("id", uuid()))
            .with_attribute(Attribute::new("text", string()))
            .with_attribute(Attribute::new("word_count", integer())),
        Resource::new("LinkContent")
            .embedded()
            .with_attribute(Attribute::new("id", uuid()))
            .with_attribute(Attribute::new("url", string()))
            .with_attribute(Attribute::new("title", string())),
        Resource::new("AuditLog")
            .hidden()
            .with_attribute(Attribute::new("id", uuid())),
    ]
}

pub(crate) fn schema() -> Schema {
    let rpc_actions = [
        ("list_todos", "Todo", "read"),
        ("get_todo", "Todo", "get_by_id"),
        ("create_todo", "Todo", "create"),
        ("update_todo", "Todo", "update"),
        ("destroy_todo", "Todo", "destroy"),
        ("summarize_todos", "Todo", "summarize"),
        ("count_todos", "Todo", "count_todos"),
        ("list_tags", "Todo", "tag_list"),
        ("raw_stats", "Todo", "raw_stats"),
        ("search_todos", "Todo", "search"),
        ("ping", "Todo", "ping"),
        ("list_users", "User", "read"),
        ("list_comments", "Comment", "read"),
    ]
    .into_iter()
    .map(|(name, resource, action)| RpcActionDefinition::new(name, resource, action))
    .collect();

    Schema::new(SchemaDefinition {
        resources: resources(),
        rpc_actions,
    })
    .unwrap()
}

pub(crate) const TODO_ID: &str = "6b5c1a4e-1f0a-4c43-9d55-2f1f8d9a7e01";

/// A todo as the engine hands it over: every attribute loaded, including private ones.
pub(crate) fn todo_record() -> Record {
    Record::new("Todo")
        .with("id", TODO_ID)
        .with("title", "Write tests")
        .with("description", Val::Null)
        .with("completed", false)
        .with("priority", Val::Atom("high".into()))
        .with(
            "due_date",
            Val::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()),
        )
        .with(
            "created_at",
            Val::DateTime(DateTime::parse_from_rfc3339("2024-03-01T10:30:00Z").unwrap()),
        )
        .with("estimated_cost", Val::Decimal("12.50".parse().unwrap()))
        .with("tags", vec!["work", "urgent"])
        .with("address_line_1", "1 Main St")
        .with(
            "metadata",
            Record::new("TodoMetadata")
                .with("category", "work")
                .with("priority_score", 7i64)
                .with("display_category", "Work"),
        )
        .with("metadata_history", Val::List(vec![]))
        .with(
            "location",
            Record::new("Location")
                .with("lat", 52.5)
                .with("lng", 13.4)
                .with("label", "Office"),
        )
        .with(
            "settings",
            Val::from(serde_json::json!({"notifications": true, "theme": "dark"})),
        )
        .with(
            "raw_data",
            Val::from(serde_json::json!({"source_system": "import", "row": 3})),
        )
        .with(
            "content",
            UnionVal::new(
                "text",
                Record::new("TextContent")
                    .with("id", "c-1")
                    .with("text", "Hello")
                    .with("word_count", 1i64),
            ),
        )
        .with(
            "attachment",
            Val::from(serde_json::json!({"kind": "url", "href": "https://example.com"})),
        )
        .with("status_info", 404i64)
        .with("internal_notes", "do not leak")
        .with(
            "user",
            Record::new("User")
                .with("id", "u-1")
                .with("name", "Ada")
                .with("email", "ada@example.com")
                .with("password_hash", "secret"),
        )
        .with("comments", Val::List(vec![]))
        .with("is_overdue", true)
        .with("comment_count", 0i64)
}

/// The parts of an invocation that tests assert on.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedInvocation {
    pub(crate) resource: String,
    pub(crate) action: String,
    pub(crate) select: Vec<String>,
    pub(crate) load: Value,
    pub(crate) input: Value,
    pub(crate) identity: Option<Value>,
    pub(crate) filter: Option<Value>,
    pub(crate) sort: String,
    pub(crate) page: Option<Value>,
    pub(crate) tenant: Option<Value>,
}

/// Replays a canned result and records what it was asked to do.
pub(crate) struct FakeExecutor {
    result: Result<RawResult, EngineError>,
    invocations: Mutex<Vec<RecordedInvocation>>,
}

impl FakeExecutor {
    pub(crate) fn returning(result: RawResult) -> Self {
        Self {
            result: Ok(result),
            invocations: Mutex::new(vec![]),
        }
    }

    pub(crate) fn failing(error: EngineError) -> Self {
        Self {
            result: Err(error),
            invocations: Mutex::new(vec![]),
        }
    }

    pub(crate) fn invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionExecutor for FakeExecutor {
    async fn execute(&self, invocation: ActionInvocation<'_>) -> Result<RawResult, EngineError> {
        self.invocations.lock().unwrap().push(RecordedInvocation {
            resource: invocation.resource.name.clone(),
            action: invocation.action.name.clone(),
            select: invocation.select.iter().cloned().collect(),
            load: serde_json::to_value(invocation.load).unwrap(),
            input: Value::Object(invocation.input.clone()),
            identity: invocation.identity.cloned(),
            filter: invocation.filter.cloned(),
            sort: sort_string(invocation.sort),
            page: invocation.page.map(|page| serde_json::to_value(page).unwrap()),
            tenant: invocation.context.tenant.clone(),
        });
        self.result.clone()
    }
}
