// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    mapped_arena::{MappedArena, SerializableSlabIndex},
    resource::{Action, Resource},
    types::{FieldType, TypedFields},
};

/// The serializable form of a schema, as produced by the resource engine's introspection.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SchemaDefinition {
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub rpc_actions: Vec<RpcActionDefinition>,
}

/// Exposes `action` of `resource` to clients under the RPC name `name`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcActionDefinition {
    pub name: String,
    pub resource: String,
    pub action: String,
}

impl RpcActionDefinition {
    pub fn new(
        name: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            action: action.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RpcActionRef {
    pub(crate) resource_id: SerializableSlabIndex<Resource>,
    pub(crate) action: String,
}

/// A validated, immutable schema.
#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) resources: MappedArena<Resource>,
    pub(crate) rpc_actions: HashMap<String, RpcActionRef>,
    /// Typed structs declared with `instance_of`, by that name
    pub(crate) typed_structs: HashMap<String, TypedFields>,
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Resource '{0}' is defined more than once")]
    DuplicateResource(String),

    #[error("RPC action '{0}' is defined more than once")]
    DuplicateRpcAction(String),

    #[error("RPC action '{rpc_name}' refers to unknown action '{resource}.{action}'")]
    UnknownAction {
        rpc_name: String,
        resource: String,
        action: String,
    },

    #[error("'{resource}.{field}' refers to unknown resource '{target}'")]
    UnknownResourceReference {
        resource: String,
        field: String,
        target: String,
    },

    #[error("'{resource}.{field}' refers to '{target}', which is not an embedded resource")]
    NotEmbedded {
        resource: String,
        field: String,
        target: String,
    },

    #[error("Invalid schema definition: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl Schema {
    pub fn new(definition: SchemaDefinition) -> Result<Self, SchemaError> {
        let mut resources = MappedArena::default();
        for resource in definition.resources {
            let name = resource.name.clone();
            resources
                .insert(&name, resource)
                .map_err(|_| SchemaError::DuplicateResource(name))?;
        }

        let mut typed_structs = HashMap::new();
        for resource in resources.iter() {
            check_references(resource, &resources)?;
            for (_, typ) in typed_fields(resource) {
                collect_typed_structs(typ, &mut typed_structs);
            }
        }

        let mut rpc_actions = HashMap::new();
        for rpc_action in definition.rpc_actions {
            let resource_id = resources
                .get_id(&rpc_action.resource)
                .filter(|id| resources[*id].action(&rpc_action.action).is_some())
                .ok_or_else(|| SchemaError::UnknownAction {
                    rpc_name: rpc_action.name.clone(),
                    resource: rpc_action.resource.clone(),
                    action: rpc_action.action.clone(),
                })?;

            if rpc_actions.contains_key(&rpc_action.name) {
                return Err(SchemaError::DuplicateRpcAction(rpc_action.name));
            }
            rpc_actions.insert(
                rpc_action.name,
                RpcActionRef {
                    resource_id,
                    action: rpc_action.action,
                },
            );
        }

        Ok(Self {
            resources,
            rpc_actions,
            typed_structs,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        Self::new(serde_json::from_str(json)?)
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(|r| r.name.as_str())
    }

    pub fn rpc_action_names(&self) -> impl Iterator<Item = &str> {
        self.rpc_actions.keys().map(String::as_str)
    }

    pub(crate) fn lookup_rpc_action(&self, rpc_name: &str) -> Option<(&Resource, &Action)> {
        let action_ref = self.rpc_actions.get(rpc_name)?;
        let resource = &self.resources[action_ref.resource_id];
        resource
            .action(&action_ref.action)
            .map(|action| (resource, action))
    }
}

fn check_references(
    resource: &Resource,
    resources: &MappedArena<Resource>,
) -> Result<(), SchemaError> {
    let unknown = |field: &str, target: &str| SchemaError::UnknownResourceReference {
        resource: resource.name.clone(),
        field: field.to_string(),
        target: target.to_string(),
    };

    for relationship in &resource.relationships {
        if !resources.contains_key(&relationship.destination) {
            return Err(unknown(&relationship.name, &relationship.destination));
        }
    }

    for (field, typ) in typed_fields(resource) {
        check_type(typ, &mut |target, embedded| {
            match resources.get_by_key(target) {
                None => Err(unknown(field, target)),
                Some(target_resource) if embedded && !target_resource.embedded => {
                    Err(SchemaError::NotEmbedded {
                        resource: resource.name.clone(),
                        field: field.to_string(),
                        target: target.to_string(),
                    })
                }
                Some(_) => Ok(()),
            }
        })?;
    }

    Ok(())
}

/// Every typed field of a resource (attributes, calculations and action results), by name.
fn typed_fields(resource: &Resource) -> impl Iterator<Item = (&str, &FieldType)> {
    resource
        .attributes
        .iter()
        .map(|a| (a.name.as_str(), &a.typ))
        .chain(
            resource
                .calculations
                .iter()
                .map(|c| (c.name.as_str(), &c.return_type)),
        )
        .chain(
            resource
                .actions
                .iter()
                .filter_map(|a| a.returns.as_ref().map(|r| (a.name.as_str(), r))),
        )
}

fn collect_typed_structs(typ: &FieldType, structs: &mut HashMap<String, TypedFields>) {
    match typ {
        FieldType::Primitive(_)
        | FieldType::Enum(_)
        | FieldType::Resource(_)
        | FieldType::Embedded(_) => {}
        FieldType::Array(inner) => collect_typed_structs(inner, structs),
        FieldType::Struct(typed) | FieldType::Map(typed) => {
            if let Some(name) = &typed.instance_of {
                structs
                    .entry(name.clone())
                    .or_insert_with(|| typed.clone());
            }
            for field in &typed.fields {
                collect_typed_structs(&field.typ, structs);
            }
        }
        FieldType::Union(union) => {
            for member in &union.members {
                collect_typed_structs(&member.typ, structs);
            }
        }
    }
}

/// Visit every resource reference inside a type (`embedded` tells whether it is an embedded use).
fn check_type(
    typ: &FieldType,
    check: &mut dyn FnMut(&str, bool) -> Result<(), SchemaError>,
) -> Result<(), SchemaError> {
    match typ {
        FieldType::Primitive(_) | FieldType::Enum(_) => Ok(()),
        FieldType::Array(inner) => check_type(inner, check),
        FieldType::Resource(name) => check(name, false),
        FieldType::Embedded(name) => check(name, true),
        FieldType::Struct(typed) | FieldType::Map(typed) => typed
            .fields
            .iter()
            .try_for_each(|field| check_type(&field.typ, check)),
        FieldType::Union(union) => union
            .members
            .iter()
            .try_for_each(|member| check_type(&member.typ, check)),
    }
}
