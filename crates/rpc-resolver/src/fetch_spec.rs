// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! What to fetch and how to extract it, as computed from a validated field selection.
//!
//! All names in this module are internal names.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::{Map, Value};

use rpc_model::types::UnionType;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchSpec {
    /// Attributes fetched directly from the primary record
    pub select: IndexSet<String>,
    /// Relationships, calculations and aggregates the engine must additionally compute or join
    pub load: IndexMap<String, LoadEntry>,
    pub template: ExtractionTemplate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "IndexSet::is_empty")]
    pub select: IndexSet<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub load: IndexMap<String, LoadEntry>,
}

impl LoadEntry {
    pub fn with_args(args: Map<String, Value>) -> Self {
        Self {
            args: Some(args),
            ..Default::default()
        }
    }

    pub fn nested(select: IndexSet<String>, load: IndexMap<String, LoadEntry>) -> Self {
        Self {
            args: None,
            select,
            load,
        }
    }
}

/// How to shape a value (or each element of a list of values).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "nodes")]
pub enum ExtractionTemplate {
    /// No field selection; the value is normalized as a whole
    #[default]
    Scalar,
    Fields(Vec<TemplateNode>),
    Union(UnionTemplate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateNode {
    pub field: String,
    pub kind: TemplateKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Attribute,
    Aggregate,
    Relationship(Vec<TemplateNode>),
    /// An embedded resource or typed struct, already present in its parent value
    Embedded(Vec<TemplateNode>),
    MapWithConstraints(Vec<TemplateNode>),
    Calculation {
        args: Map<String, Value>,
        nested: ExtractionTemplate,
    },
    Union(UnionTemplate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnionTemplate {
    #[serde(skip)]
    pub union_type: UnionType,
    pub members: Vec<MemberTemplate>,
}

impl UnionTemplate {
    pub fn member(&self, name: &str) -> Option<&MemberTemplate> {
        self.members.iter().find(|m| m.member == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberTemplate {
    pub member: String,
    pub nested: ExtractionTemplate,
}

/// Two requests for the same field that cannot be satisfied by a single fetch.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MergeConflict {
    pub(crate) field: String,
    pub(crate) reason: &'static str,
}

impl TemplateNode {
    pub fn new(field: impl Into<String>, kind: TemplateKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

/// Add `node` to `nodes`, folding it into an existing node for the same field.
pub(crate) fn merge_node(
    nodes: &mut Vec<TemplateNode>,
    node: TemplateNode,
) -> Result<(), MergeConflict> {
    let Some(existing) = nodes.iter_mut().find(|n| n.field == node.field) else {
        nodes.push(node);
        return Ok(());
    };

    let field = node.field;
    match (&mut existing.kind, node.kind) {
        (TemplateKind::Attribute, TemplateKind::Attribute)
        | (TemplateKind::Aggregate, TemplateKind::Aggregate) => Ok(()),
        (TemplateKind::Relationship(existing), TemplateKind::Relationship(new))
        | (TemplateKind::Embedded(existing), TemplateKind::Embedded(new))
        | (TemplateKind::MapWithConstraints(existing), TemplateKind::MapWithConstraints(new)) => {
            merge_nodes(existing, new)
        }
        (
            TemplateKind::Calculation {
                args: existing_args,
                nested: existing_nested,
            },
            TemplateKind::Calculation { args, nested },
        ) => {
            if *existing_args != args {
                return Err(MergeConflict {
                    field,
                    reason: "the same calculation was requested with different arguments",
                });
            }
            merge_template(existing_nested, nested)
        }
        (TemplateKind::Union(existing), TemplateKind::Union(new)) => merge_union(existing, new),
        _ => Err(MergeConflict {
            field,
            reason: "the field was requested in incompatible shapes",
        }),
    }
}

fn merge_nodes(nodes: &mut Vec<TemplateNode>, new: Vec<TemplateNode>) -> Result<(), MergeConflict> {
    new.into_iter().try_for_each(|node| merge_node(nodes, node))
}

pub(crate) fn merge_template(
    existing: &mut ExtractionTemplate,
    new: ExtractionTemplate,
) -> Result<(), MergeConflict> {
    match (existing, new) {
        (ExtractionTemplate::Scalar, ExtractionTemplate::Scalar) => Ok(()),
        (ExtractionTemplate::Fields(existing), ExtractionTemplate::Fields(new)) => {
            merge_nodes(existing, new)
        }
        (ExtractionTemplate::Union(existing), ExtractionTemplate::Union(new)) => {
            merge_union(existing, new)
        }
        _ => Err(MergeConflict {
            field: String::new(),
            reason: "the field was requested in incompatible shapes",
        }),
    }
}

pub(crate) fn merge_union(
    existing: &mut UnionTemplate,
    new: UnionTemplate,
) -> Result<(), MergeConflict> {
    for member in new.members {
        match existing.members.iter_mut().find(|m| m.member == member.member) {
            Some(found) => {
                merge_template(&mut found.nested, member.nested).map_err(|conflict| {
                    MergeConflict {
                        field: member.member.clone(),
                        reason: conflict.reason,
                    }
                })?
            }
            None => existing.members.push(member),
        }
    }
    Ok(())
}

/// Fold `entry` into `load` under `name`.
pub(crate) fn merge_load(
    load: &mut IndexMap<String, LoadEntry>,
    name: &str,
    entry: LoadEntry,
) -> Result<(), MergeConflict> {
    let Some(existing) = load.get_mut(name) else {
        load.insert(name.to_string(), entry);
        return Ok(());
    };

    if existing.args != entry.args {
        return Err(MergeConflict {
            field: name.to_string(),
            reason: "the same calculation was requested with different arguments",
        });
    }
    existing.select.extend(entry.select);
    for (nested_name, nested) in entry.load {
        merge_load(&mut existing.load, &nested_name, nested)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn relationship(name: &str, fields: &[&str]) -> TemplateNode {
        TemplateNode::new(
            name,
            TemplateKind::Relationship(
                fields
                    .iter()
                    .map(|f| TemplateNode::new(*f, TemplateKind::Attribute))
                    .collect(),
            ),
        )
    }

    #[test]
    fn duplicate_nodes_merge() {
        let mut nodes = vec![TemplateNode::new("id", TemplateKind::Attribute)];
        merge_node(&mut nodes, TemplateNode::new("id", TemplateKind::Attribute)).unwrap();
        merge_node(&mut nodes, relationship("user", &["id"])).unwrap();
        merge_node(&mut nodes, relationship("user", &["id", "name"])).unwrap();

        assert_eq!(nodes, vec![
            TemplateNode::new("id", TemplateKind::Attribute),
            relationship("user", &["id", "name"]),
        ]);
    }

    #[test]
    fn conflicting_calculation_args() {
        let calculation = |prefix: &str| {
            TemplateNode::new(
                "self",
                TemplateKind::Calculation {
                    args: json!({ "prefix": prefix }).as_object().cloned().unwrap(),
                    nested: ExtractionTemplate::Scalar,
                },
            )
        };

        let mut nodes = vec![calculation("a")];
        assert!(merge_node(&mut nodes, calculation("a")).is_ok());
        assert_eq!(
            merge_node(&mut nodes, calculation("b")).unwrap_err().field,
            "self"
        );

        let mut load = IndexMap::new();
        merge_load(&mut load, "self", LoadEntry::with_args(Map::new())).unwrap();
        assert!(
            merge_load(
                &mut load,
                "self",
                LoadEntry::with_args(json!({"prefix": "b"}).as_object().cloned().unwrap())
            )
            .is_err()
        );
    }

    #[test]
    fn load_entries_merge_recursively() {
        let mut load = IndexMap::new();
        merge_load(
            &mut load,
            "user",
            LoadEntry::nested(IndexSet::from(["id".to_string()]), IndexMap::new()),
        )
        .unwrap();
        merge_load(
            &mut load,
            "user",
            LoadEntry::nested(
                IndexSet::from(["name".to_string()]),
                IndexMap::from([("todo_count".to_string(), LoadEntry::default())]),
            ),
        )
        .unwrap();

        assert_eq!(
            serde_json::to_value(&load).unwrap(),
            json!({"user": {"select": ["id", "name"], "load": {"todo_count": {}}}})
        );
    }
}
