// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use rpc_common::value::Val;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    Integer,
    Float,
    Decimal,
    String,
    Boolean,
    Uuid,
    Date,
    Time,
    DateTime,
    NaiveDateTime,
    Atom,
    /// Free-form map or JSON value without declared fields
    Json,
}

impl PrimitiveType {
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveType::Integer => "Integer",
            PrimitiveType::Float => "Float",
            PrimitiveType::Decimal => "Decimal",
            PrimitiveType::String => "String",
            PrimitiveType::Boolean => "Boolean",
            PrimitiveType::Uuid => "Uuid",
            PrimitiveType::Date => "Date",
            PrimitiveType::Time => "Time",
            PrimitiveType::DateTime => "DateTime",
            PrimitiveType::NaiveDateTime => "NaiveDateTime",
            PrimitiveType::Atom => "Atom",
            PrimitiveType::Json => "Json",
        }
    }

    fn matches_value(&self, value: &Val) -> bool {
        match (self, value) {
            (PrimitiveType::Integer, Val::Number(n)) => n.is_integer(),
            (PrimitiveType::Float, Val::Number(_)) => true,
            (PrimitiveType::Decimal, Val::Decimal(_) | Val::Number(_)) => true,
            (PrimitiveType::String | PrimitiveType::Uuid, Val::String(_)) => true,
            (PrimitiveType::Boolean, Val::Bool(_)) => true,
            (PrimitiveType::Date, Val::Date(_)) => true,
            (PrimitiveType::Time, Val::Time(_)) => true,
            (PrimitiveType::DateTime, Val::DateTime(_)) => true,
            (PrimitiveType::NaiveDateTime, Val::NaiveDateTime(_)) => true,
            (PrimitiveType::Atom, Val::Atom(_)) => true,
            (PrimitiveType::Json, Val::Map(_)) => true,
            _ => false,
        }
    }
}

impl Display for PrimitiveType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The declared type of an attribute, argument, calculation result, or action result, with its
/// constraints folded in (enum values, struct fields, union members).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Primitive(PrimitiveType),
    Enum(Vec<String>),
    Array(Box<FieldType>),
    /// A struct of an RPC resource
    Resource(String),
    /// An embedded resource, stored inline with its parent record
    Embedded(String),
    /// A typed struct with declared fields
    Struct(TypedFields),
    /// A map; with declared fields it behaves like a typed struct, without it is free-form
    Map(TypedFields),
    Union(UnionType),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TypedFields {
    #[serde(default)]
    pub fields: Vec<TypedField>,
    /// Struct module or type name, matched against `Record::type_name`
    #[serde(default)]
    pub instance_of: Option<String>,
}

impl TypedFields {
    pub fn new(fields: Vec<TypedField>) -> Self {
        Self {
            fields,
            instance_of: None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&TypedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TypedField {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: FieldType,
    #[serde(default = "default_allow_nil")]
    pub allow_nil: bool,
}

impl TypedField {
    pub fn new(name: impl Into<String>, typ: FieldType) -> Self {
        Self {
            name: name.into(),
            typ,
            allow_nil: true,
        }
    }
}

pub(crate) fn default_allow_nil() -> bool {
    true
}

/// How a union value is physically stored before extraction.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnionStorage {
    /// An explicit `{type, value}` pair
    #[default]
    TypeAndValue,
    /// A plain map whose discriminator field names the member
    MapWithTag,
    /// A bare value whose member is inferred from its shape
    Untagged,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UnionType {
    #[serde(default)]
    pub storage: UnionStorage,
    pub members: Vec<UnionMember>,
}

impl UnionType {
    pub fn member(&self, name: &str) -> Option<&UnionMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UnionMember {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: FieldType,
    /// Discriminator for `map_with_tag` storage
    #[serde(default)]
    pub tag: Option<UnionTag>,
}

impl UnionMember {
    pub fn new(name: impl Into<String>, typ: FieldType) -> Self {
        Self {
            name: name.into(),
            typ,
            tag: None,
        }
    }

    pub fn with_tag(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.tag = Some(UnionTag {
            field: field.into(),
            value: value.into(),
        });
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UnionTag {
    pub field: String,
    pub value: String,
}

impl FieldType {
    pub fn primitive(primitive: PrimitiveType) -> Self {
        FieldType::Primitive(primitive)
    }

    pub fn array(element: FieldType) -> Self {
        FieldType::Array(Box::new(element))
    }

    /// The type with any array wrapping removed.
    pub fn element_type(&self) -> &FieldType {
        match self {
            FieldType::Array(inner) => inner.element_type(),
            _ => self,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, FieldType::Array(_))
    }

    /// Whether values of this type have fields of their own that a client must select.
    pub fn is_composite(&self) -> bool {
        match self.element_type() {
            FieldType::Resource(_)
            | FieldType::Embedded(_)
            | FieldType::Struct(_)
            | FieldType::Union(_) => true,
            FieldType::Map(typed) => !typed.fields.is_empty(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            FieldType::Primitive(p) => p.name().to_string(),
            FieldType::Enum(_) => "Enum".to_string(),
            FieldType::Array(inner) => format!("[{}]", inner.type_name()),
            FieldType::Resource(name) | FieldType::Embedded(name) => name.clone(),
            FieldType::Struct(typed) => typed
                .instance_of
                .clone()
                .unwrap_or_else(|| "Struct".to_string()),
            FieldType::Map(_) => "Map".to_string(),
            FieldType::Union(_) => "Union".to_string(),
        }
    }

    /// Structural check used to infer the member of an untagged union.
    pub fn matches_value(&self, value: &Val) -> bool {
        match (self, value) {
            (FieldType::Primitive(p), _) => p.matches_value(value),
            (FieldType::Enum(values), Val::Atom(s) | Val::String(s)) => values.contains(s),
            (FieldType::Array(inner), Val::List(elems)) => {
                elems.iter().all(|e| e.is_null() || inner.matches_value(e))
            }
            (FieldType::Resource(name) | FieldType::Embedded(name), Val::Record(r)) => {
                &r.type_name == name
            }
            (FieldType::Struct(typed), Val::Record(r)) => typed
                .instance_of
                .as_ref()
                .is_none_or(|instance_of| instance_of == &r.type_name),
            (FieldType::Struct(_) | FieldType::Map(_), Val::Map(_)) => true,
            (FieldType::Union(union), Val::Union(u)) => union.member(&u.member).is_some(),
            (FieldType::Union(union), _) => {
                union.members.iter().any(|m| m.typ.matches_value(value))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_common::value::Record;

    #[test]
    fn composite_types() {
        assert!(!FieldType::primitive(PrimitiveType::String).is_composite());
        assert!(!FieldType::Map(TypedFields::default()).is_composite());
        assert!(
            FieldType::Map(TypedFields::new(vec![TypedField::new(
                "lat",
                FieldType::primitive(PrimitiveType::Float)
            )]))
            .is_composite()
        );
        assert!(FieldType::array(FieldType::Embedded("Metadata".into())).is_composite());
        assert!(!FieldType::array(FieldType::Enum(vec!["a".into()])).is_composite());
    }

    #[test]
    fn structural_matching() {
        let string = FieldType::primitive(PrimitiveType::String);
        let integer = FieldType::primitive(PrimitiveType::Integer);
        let map = FieldType::Map(TypedFields::default());

        assert!(string.matches_value(&Val::from("x")));
        assert!(!string.matches_value(&Val::from(1i64)));
        assert!(integer.matches_value(&Val::from(1i64)));
        assert!(!integer.matches_value(&Val::from(1.5)));
        assert!(map.matches_value(&Val::from(serde_json::json!({"a": 1}))));
        assert!(
            FieldType::Embedded("Metadata".into())
                .matches_value(&Val::Record(Record::new("Metadata")))
        );
        assert!(
            !FieldType::Embedded("Metadata".into())
                .matches_value(&Val::Record(Record::new("Other")))
        );
        assert!(
            FieldType::array(integer.clone())
                .matches_value(&Val::from(vec![Val::from(1i64), Val::Null]))
        );
        assert!(
            FieldType::primitive(PrimitiveType::Date)
                .matches_value(&Val::Date(chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()))
        );
    }

    #[test]
    fn deserializes_from_json() {
        let typ: FieldType = serde_json::from_value(serde_json::json!({
            "union": {
                "storage": "map_with_tag",
                "members": [
                    {"name": "text", "type": {"primitive": "string"}, "tag": {"field": "kind", "value": "text"}}
                ]
            }
        }))
        .unwrap();

        let FieldType::Union(union) = typ else {
            panic!("expected a union type");
        };
        assert_eq!(union.storage, UnionStorage::MapWithTag);
        assert_eq!(union.members[0].tag.as_ref().unwrap().value, "text");
    }
}
