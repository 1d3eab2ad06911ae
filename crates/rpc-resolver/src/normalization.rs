// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use chrono::SecondsFormat;
use serde_json::Value;

use rpc_common::value::Val;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const NAIVE_DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// JSON-safe form of a scalar value.
///
/// Returns `None` for lists, maps, records and unions, whose rendering depends on the schema and
/// the active name formatter.
pub fn normalize_leaf(value: &Val) -> Option<Value> {
    let normalized = match value {
        Val::Null => Value::Null,
        Val::Bool(b) => Value::Bool(*b),
        // NaN and infinities have no JSON form
        Val::Number(n) => serde_json::Number::try_from(n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Val::Decimal(d) => Value::String(d.to_plain_string()),
        Val::String(s) | Val::Atom(s) => Value::String(s.clone()),
        Val::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
        Val::Time(t) => Value::String(t.format(TIME_FORMAT).to_string()),
        Val::NaiveDateTime(dt) => Value::String(dt.format(NAIVE_DATE_TIME_FORMAT).to_string()),
        Val::DateTime(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        Val::List(_) | Val::Map(_) | Val::Record(_) | Val::Union(_) => return None,
    };

    Some(normalized)
}
