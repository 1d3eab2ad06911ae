// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt::Display;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;

#[derive(Clone, Debug, PartialEq)]
pub enum ValNumber {
    I64(i64),
    U64(u64),
    F64(f64),
}

impl ValNumber {
    pub fn is_integer(&self) -> bool {
        !matches!(self, ValNumber::F64(_))
    }
}

impl Display for ValNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValNumber::I64(n) => write!(f, "{n}"),
            ValNumber::U64(n) => write!(f, "{n}"),
            ValNumber::F64(n) => write!(f, "{n}"),
        }
    }
}

impl TryFrom<&ValNumber> for serde_json::Number {
    type Error = ();

    fn try_from(value: &ValNumber) -> Result<Self, Self::Error> {
        match value {
            ValNumber::I64(n) => Ok(serde_json::Number::from(*n)),
            ValNumber::U64(n) => Ok(serde_json::Number::from(*n)),
            // NaN and infinities have no JSON representation
            ValNumber::F64(n) => serde_json::Number::from_f64(*n).ok_or(()),
        }
    }
}

impl From<&serde_json::Number> for ValNumber {
    fn from(value: &serde_json::Number) -> Self {
        if let Some(n) = value.as_i64() {
            ValNumber::I64(n)
        } else if let Some(n) = value.as_u64() {
            ValNumber::U64(n)
        } else {
            ValNumber::F64(value.as_f64().unwrap_or(f64::NAN))
        }
    }
}

impl From<i64> for ValNumber {
    fn from(value: i64) -> Self {
        ValNumber::I64(value)
    }
}

impl From<u64> for ValNumber {
    fn from(value: u64) -> Self {
        ValNumber::U64(value)
    }
}

impl From<f64> for ValNumber {
    fn from(value: f64) -> Self {
        ValNumber::F64(value)
    }
}

/// A struct value produced by the execution engine: a resource record, an embedded resource, or
/// a typed struct. `type_name` names the resource or struct type the fields belong to.
///
/// The field map may contain more than the publicly exposed fields (the engine hands over whole
/// records), so consumers must not emit it wholesale.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub type_name: String,
    pub fields: IndexMap<String, Val>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Val>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Val> {
        self.fields.get(name)
    }
}

/// An explicit `{type, value}` pair as stored by unions in the `type_and_value` storage mode.
#[derive(Clone, Debug, PartialEq)]
pub struct UnionVal {
    pub member: String,
    pub value: Box<Val>,
}

impl UnionVal {
    pub fn new(member: impl Into<String>, value: impl Into<Val>) -> Self {
        Self {
            member: member.into(),
            value: Box::new(value.into()),
        }
    }
}

/// Raw values as returned by action execution, before extraction and normalization.
///
/// Unlike `serde_json::Value`, this keeps native temporal, decimal and atom values apart so that
/// the result processor can render each of them in a JSON-safe form.
#[derive(Clone, Debug, PartialEq)]
pub enum Val {
    Null,
    Bool(bool),
    Number(ValNumber),
    Decimal(BigDecimal),
    String(String),
    /// Enum-like symbolic value (rendered as its label)
    Atom(String),
    Date(NaiveDate),
    Time(NaiveTime),
    NaiveDateTime(NaiveDateTime),
    DateTime(DateTime<FixedOffset>),
    List(Vec<Val>),
    Map(IndexMap<String, Val>),
    Record(Record),
    Union(UnionVal),
}

impl Val {
    pub fn is_null(&self) -> bool {
        matches!(self, Val::Null)
    }

    /// Look up a field of a map or record. Anything else has no fields.
    pub fn get(&self, key: &str) -> Option<&Val> {
        match self {
            Val::Map(m) => m.get(key),
            Val::Record(r) => r.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::String(s) | Val::Atom(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Bool(_) => "boolean",
            Val::Number(_) => "number",
            Val::Decimal(_) => "decimal",
            Val::String(_) => "string",
            Val::Atom(_) => "atom",
            Val::Date(_) => "date",
            Val::Time(_) => "time",
            Val::NaiveDateTime(_) => "naive_datetime",
            Val::DateTime(_) => "datetime",
            Val::List(_) => "list",
            Val::Map(_) => "map",
            Val::Record(_) => "record",
            Val::Union(_) => "union",
        }
    }
}

impl Display for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Val::Null => write!(f, "null"),
            Val::Bool(b) => write!(f, "{b}"),
            Val::Number(n) => write!(f, "{n}"),
            Val::Decimal(d) => write!(f, "{d}"),
            Val::String(s) => write!(f, "\"{s}\""),
            Val::Atom(a) => write!(f, ":{a}"),
            Val::Date(d) => write!(f, "{d}"),
            Val::Time(t) => write!(f, "{t}"),
            Val::NaiveDateTime(dt) => write!(f, "{dt}"),
            Val::DateTime(dt) => write!(f, "{dt}"),
            Val::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Val::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Val::Record(r) => {
                write!(f, "%{}{{", r.type_name)?;
                for (i, (k, v)) in r.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Val::Union(u) => write!(f, "{{type: {}, value: {}}}", u.member, u.value),
        }
    }
}

impl From<serde_json::Value> for Val {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Val::Null,
            serde_json::Value::Bool(b) => Val::Bool(b),
            serde_json::Value::Number(n) => Val::Number(ValNumber::from(&n)),
            serde_json::Value::String(s) => Val::String(s),
            serde_json::Value::Array(a) => Val::List(a.into_iter().map(Val::from).collect()),
            serde_json::Value::Object(o) => {
                Val::Map(o.into_iter().map(|(k, v)| (k, Val::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Val {
    fn from(value: bool) -> Self {
        Val::Bool(value)
    }
}

impl From<i64> for Val {
    fn from(value: i64) -> Self {
        Val::Number(value.into())
    }
}

impl From<f64> for Val {
    fn from(value: f64) -> Self {
        Val::Number(value.into())
    }
}

impl From<&str> for Val {
    fn from(value: &str) -> Self {
        Val::String(value.to_string())
    }
}

impl From<String> for Val {
    fn from(value: String) -> Self {
        Val::String(value)
    }
}

impl From<Record> for Val {
    fn from(value: Record) -> Self {
        Val::Record(value)
    }
}

impl From<UnionVal> for Val {
    fn from(value: UnionVal) -> Self {
        Val::Union(value)
    }
}

impl<T: Into<Val>> From<Vec<T>> for Val {
    fn from(value: Vec<T>) -> Self {
        Val::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Val>> From<Option<T>> for Val {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Val::Null)
    }
}
