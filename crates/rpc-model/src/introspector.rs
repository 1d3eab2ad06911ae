// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Read-only queries against the schema.
//!
//! Lookups never fail: an unknown resource, action or field yields `None`, and the caller decides
//! which error to report (and with which path).

use crate::{
    resource::{Action, Aggregate, Attribute, Calculation, Relationship, Resource},
    schema::Schema,
    types::{FieldType, TypedFields, UnionType},
};

/// What a field name resolves to within a resource.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind<'a> {
    Attribute(&'a Attribute),
    Relationship(&'a Relationship),
    Calculation(&'a Calculation),
    Aggregate(&'a Aggregate),
}

/// The field metadata of a composite type, i.e. the context in which a nested selection is
/// interpreted.
#[derive(Debug, Clone, Copy)]
pub enum TypeFields<'a> {
    /// A resource struct or an embedded resource
    Resource(&'a Resource),
    /// A typed struct or a map with declared fields
    Fields {
        type_name: &'a str,
        fields: &'a TypedFields,
    },
    Union(&'a UnionType),
}

pub trait SchemaIntrospector: Send + Sync {
    fn resource(&self, name: &str) -> Option<&Resource>;

    /// Resolve a client-facing RPC action name to its resource and action.
    fn rpc_action(&self, rpc_name: &str) -> Option<(&Resource, &Action)>;

    /// The declared fields of a typed struct, by its `instance_of` name.
    fn typed_struct(&self, name: &str) -> Option<&TypedFields>;

    /// A resource that clients may see. Hidden resources do not exist from their perspective.
    fn exposed_resource(&self, name: &str) -> Option<&Resource> {
        self.resource(name)
            .filter(|resource| resource.rpc_exposed || resource.embedded)
    }

    fn public_attributes(&self, resource: &str) -> Option<Vec<&Attribute>> {
        self.resource(resource)
            .map(|r| r.attributes.iter().filter(|a| a.public).collect())
    }

    fn relationships(&self, resource: &str) -> Option<Vec<&Relationship>> {
        self.resource(resource)
            .map(|r| r.relationships.iter().filter(|rel| rel.public).collect())
    }

    fn calculations(&self, resource: &str) -> Option<Vec<&Calculation>> {
        self.resource(resource)
            .map(|r| r.calculations.iter().filter(|c| c.public).collect())
    }

    fn aggregates(&self, resource: &str) -> Option<Vec<&Aggregate>> {
        self.resource(resource)
            .map(|r| r.aggregates.iter().filter(|a| a.public).collect())
    }

    fn action(&self, resource: &str, name: &str) -> Option<&Action> {
        self.resource(resource).and_then(|r| r.action(name))
    }

    /// Classify a (internal) field name against the public fields of a resource.
    ///
    /// When a name appears in several categories, attributes win over relationships, which win
    /// over calculations, which win over aggregates.
    fn classify<'a>(&'a self, resource: &'a Resource, name: &str) -> Option<FieldKind<'a>> {
        if let Some(attribute) = resource.attribute(name).filter(|a| a.public) {
            return Some(FieldKind::Attribute(attribute));
        }
        if let Some(relationship) = resource.relationship(name).filter(|r| r.public) {
            return Some(FieldKind::Relationship(relationship));
        }
        if let Some(calculation) = resource.calculation(name).filter(|c| c.public) {
            return Some(FieldKind::Calculation(calculation));
        }
        resource
            .aggregate(name)
            .filter(|a| a.public)
            .map(FieldKind::Aggregate)
    }

    /// Field metadata of a composite type (looking through arrays). `None` for types without
    /// fields of their own, and for references to resources clients cannot see.
    fn resolve_type_fields<'a>(&'a self, typ: &'a FieldType) -> Option<TypeFields<'a>> {
        match typ {
            FieldType::Array(inner) => self.resolve_type_fields(inner),
            FieldType::Resource(name) | FieldType::Embedded(name) => {
                self.exposed_resource(name).map(TypeFields::Resource)
            }
            FieldType::Struct(typed) => Some(TypeFields::Fields {
                type_name: typed.instance_of.as_deref().unwrap_or("Struct"),
                fields: typed,
            }),
            FieldType::Map(typed) if !typed.fields.is_empty() => Some(TypeFields::Fields {
                type_name: typed.instance_of.as_deref().unwrap_or("Map"),
                fields: typed,
            }),
            FieldType::Union(union) => Some(TypeFields::Union(union)),
            FieldType::Map(_) | FieldType::Primitive(_) | FieldType::Enum(_) => None,
        }
    }
}

impl SchemaIntrospector for Schema {
    fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get_by_key(name)
    }

    fn rpc_action(&self, rpc_name: &str) -> Option<(&Resource, &Action)> {
        self.lookup_rpc_action(rpc_name)
    }

    fn typed_struct(&self, name: &str) -> Option<&TypedFields> {
        self.typed_structs.get(name)
    }
}
