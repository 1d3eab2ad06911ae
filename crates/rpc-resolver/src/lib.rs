// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

pub mod error_builder;
pub mod executor;
pub mod fetch_spec;
pub mod normalization;
pub mod pipeline;
pub mod request;
pub mod requested_fields;
pub mod requested_fields_error;
pub mod result_processor;
pub mod selection;
pub mod union_member;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error_builder::{ErrorBuilder, RpcError, RpcFailure};
pub use executor::{ActionExecutor, ActionInvocation, EngineError, ExecutionContext, RawResult};
pub use fetch_spec::FetchSpec;
pub use pipeline::RpcPipeline;
pub use requested_fields::RequestedFieldsProcessor;
pub use result_processor::ResultProcessor;
pub use selection::FieldSelection;
