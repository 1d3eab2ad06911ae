// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use rpc_common::value::Val;
use rpc_model::types::{UnionMember, UnionStorage, UnionType};

const TYPE_KEY: &str = "type";
const VALUE_KEY: &str = "value";

/// Determine which member of `union` a raw value holds, along with the member's own value.
///
/// An explicit [`Val::Union`] names its member in every storage mode. Otherwise:
/// - `type_and_value`: a `{type, value}` map names the member
/// - `map_with_tag`: the first member whose tag field carries its tag value
/// - `untagged`: the first member (in declaration order) whose type structurally matches the value
///
/// Returns `None` when no member can be determined.
pub fn detect_member<'u, 'v>(
    raw: &'v Val,
    union: &'u UnionType,
) -> Option<(&'u UnionMember, &'v Val)> {
    if let Val::Union(explicit) = raw {
        return union
            .member(&explicit.member)
            .map(|member| (member, explicit.value.as_ref()));
    }

    match union.storage {
        UnionStorage::TypeAndValue => {
            let member = raw.get(TYPE_KEY).and_then(Val::as_str)?;
            let value = raw.get(VALUE_KEY).unwrap_or(&Val::Null);
            union.member(member).map(|member| (member, value))
        }
        UnionStorage::MapWithTag => union
            .members
            .iter()
            .find(|member| {
                member.tag.as_ref().is_some_and(|tag| {
                    raw.get(&tag.field).and_then(Val::as_str) == Some(tag.value.as_str())
                })
            })
            .map(|member| (member, raw)),
        UnionStorage::Untagged => union
            .members
            .iter()
            .find(|member| member.typ.matches_value(raw))
            .map(|member| (member, raw)),
    }
}
