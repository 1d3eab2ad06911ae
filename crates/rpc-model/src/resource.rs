// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde::{Deserialize, Serialize};

use crate::types::{FieldType, default_allow_nil};

fn default_true() -> bool {
    true
}

fn default_primary_key() -> Vec<String> {
    vec!["id".to_string()]
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Resource {
    pub name: String,
    /// Embedded resources are stored inline in their parent's attribute
    #[serde(default)]
    pub embedded: bool,
    /// Resources that are not exposed do not exist as far as clients are concerned
    #[serde(default = "default_true")]
    pub rpc_exposed: bool,
    #[serde(default)]
    pub multitenant: bool,
    #[serde(default = "default_primary_key")]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub calculations: Vec<Calculation>,
    #[serde(default)]
    pub aggregates: Vec<Aggregate>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            embedded: false,
            rpc_exposed: true,
            multitenant: false,
            primary_key: default_primary_key(),
            attributes: vec![],
            relationships: vec![],
            calculations: vec![],
            aggregates: vec![],
            actions: vec![],
        }
    }

    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.rpc_exposed = false;
        self
    }

    pub fn multitenant(mut self) -> Self {
        self.multitenant = true;
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn with_calculation(mut self, calculation: Calculation) -> Self {
        self.calculations.push(calculation);
        self
    }

    pub fn with_aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn calculation(&self, name: &str) -> Option<&Calculation> {
        self.calculations.iter().find(|c| c.name == name)
    }

    pub fn aggregate(&self, name: &str) -> Option<&Aggregate> {
        self.aggregates.iter().find(|a| a.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: FieldType,
    #[serde(default = "default_true")]
    pub public: bool,
    #[serde(default = "default_allow_nil")]
    pub allow_nil: bool,
}

impl Attribute {
    pub fn new(name: impl Into<String>, typ: FieldType) -> Self {
        Self {
            name: name.into(),
            typ,
            public: true,
            allow_nil: true,
        }
    }

    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn required(mut self) -> Self {
        self.allow_nil = false;
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Relationship {
    pub name: String,
    pub destination: String,
    pub cardinality: Cardinality,
    #[serde(default = "default_true")]
    pub public: bool,
}

impl Relationship {
    pub fn new(
        name: impl Into<String>,
        destination: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            destination: destination.into(),
            cardinality,
            public: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Argument {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: FieldType,
    #[serde(default = "default_allow_nil")]
    pub allow_nil: bool,
    #[serde(default)]
    pub has_default: bool,
}

impl Argument {
    pub fn new(name: impl Into<String>, typ: FieldType) -> Self {
        Self {
            name: name.into(),
            typ,
            allow_nil: true,
            has_default: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.allow_nil = false;
        self
    }

    /// Whether a caller has to supply a value for this argument.
    pub fn is_required(&self) -> bool {
        !self.allow_nil && !self.has_default
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Calculation {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<Argument>,
    pub return_type: FieldType,
    #[serde(default = "default_true")]
    pub public: bool,
}

impl Calculation {
    pub fn new(name: impl Into<String>, return_type: FieldType) -> Self {
        Self {
            name: name.into(),
            arguments: vec![],
            return_type,
            public: true,
        }
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn takes_arguments(&self) -> bool {
        !self.arguments.is_empty()
    }

    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name == name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Max,
    Min,
    Exists,
    First,
    List,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Aggregate {
    pub name: String,
    pub kind: AggregateKind,
    pub result_type: FieldType,
    #[serde(default = "default_true")]
    pub public: bool,
}

impl Aggregate {
    pub fn new(name: impl Into<String>, kind: AggregateKind, result_type: FieldType) -> Self {
        Self {
            name: name.into(),
            kind,
            result_type,
            public: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Read,
    Create,
    Update,
    Destroy,
    /// A generic action with an arbitrary (or no) return type
    Action,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PaginationSupport {
    #[serde(default)]
    pub offset: bool,
    #[serde(default)]
    pub keyset: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub countable: bool,
    #[serde(default)]
    pub default_limit: Option<u64>,
    #[serde(default)]
    pub max_limit: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Action {
    pub name: String,
    pub kind: ActionKind,
    /// Reads that return a single record looked up by identity
    #[serde(default)]
    pub get: bool,
    #[serde(default)]
    pub arguments: Vec<Argument>,
    /// Attributes the action accepts as input
    #[serde(default)]
    pub accept: Vec<String>,
    #[serde(default)]
    pub pagination: Option<PaginationSupport>,
    /// Return type of a generic action
    #[serde(default)]
    pub returns: Option<FieldType>,
}

impl Action {
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            get: false,
            arguments: vec![],
            accept: vec![],
            pagination: None,
            returns: None,
        }
    }

    pub fn get(mut self) -> Self {
        self.get = true;
        self
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn accepting(mut self, attributes: &[&str]) -> Self {
        self.accept.extend(attributes.iter().map(|a| a.to_string()));
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationSupport) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn returning(mut self, returns: FieldType) -> Self {
        self.returns = Some(returns);
        self
    }

    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name == name)
    }

    /// Whether the action addresses an existing record and therefore needs an identity.
    pub fn requires_identity(&self) -> bool {
        match self.kind {
            ActionKind::Read => self.get,
            ActionKind::Update | ActionKind::Destroy => true,
            ActionKind::Create | ActionKind::Action => false,
        }
    }
}
