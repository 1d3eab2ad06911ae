// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The seam to the resource engine that actually runs actions.

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use thiserror::Error;

use rpc_common::value::Val;
use rpc_model::resource::{Action, Resource};

use crate::{
    fetch_spec::LoadEntry,
    request::{PageRequest, SortField},
};

/// Caller identity and scoping, passed through to the engine untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    pub actor: Option<Value>,
    pub tenant: Option<Value>,
    pub context: Map<String, Value>,
}

impl ExecutionContext {
    pub fn with_actor(mut self, actor: Value) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_tenant(mut self, tenant: Value) -> Self {
        self.tenant = Some(tenant);
        self
    }
}

/// Everything the engine needs to run one action. All names are internal.
#[derive(Debug)]
pub struct ActionInvocation<'a> {
    pub resource: &'a Resource,
    pub action: &'a Action,
    pub select: &'a IndexSet<String>,
    pub load: &'a IndexMap<String, LoadEntry>,
    pub input: &'a Map<String, Value>,
    pub identity: Option<&'a Value>,
    pub filter: Option<&'a Value>,
    pub sort: &'a [SortField],
    pub page: Option<&'a PageRequest>,
    pub context: &'a ExecutionContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    Value(Val),
    Page(Page),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub results: Vec<Val>,
    pub info: PageInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageInfo {
    Offset {
        limit: Option<u64>,
        offset: u64,
        more: bool,
        count: Option<u64>,
    },
    Keyset {
        limit: Option<u64>,
        more: bool,
        after: Option<String>,
        before: Option<String>,
        previous_page: Option<String>,
        next_page: Option<String>,
        count: Option<u64>,
    },
}

/// Errors reported by the engine. Field names are internal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid value for attribute '{field}': {message}")]
    InvalidAttribute { field: String, message: String },

    #[error("Invalid value for argument '{field}': {message}")]
    InvalidArgument { field: String, message: String },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("Forbidden")]
    Forbidden,

    #[error("{} errors", .0.len())]
    Multiple(Vec<EngineError>),

    /// An engine error class with no dedicated mapping
    #[error("{class}: {message}")]
    Other { class: String, message: String },

    /// Anything the engine could not classify at all
    #[error("Unexpected engine error: {0}")]
    Unknown(Value),
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, invocation: ActionInvocation<'_>) -> Result<RawResult, EngineError>;
}
