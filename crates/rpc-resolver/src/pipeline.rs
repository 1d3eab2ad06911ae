// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};

use rpc_common::value::Val;
use rpc_config::{ConfigHandle, RpcConfig};
use rpc_model::{
    introspector::SchemaIntrospector,
    resource::{Action, Resource},
};

use crate::{
    error_builder::{ErrorBuilder, RpcFailure},
    executor::{ActionExecutor, ActionInvocation, ExecutionContext, Page, PageInfo, RawResult},
    fetch_spec::FetchSpec,
    request::{
        PageRequest, RequestError, RpcRequest, SortField, check_sort, format_input, parse_sort,
    },
    requested_fields::RequestedFieldsProcessor,
    requested_fields_error::RequestedFieldsError,
    result_processor::ResultProcessor,
};

/// Runs RPC requests end to end: parse, validate, execute, extract.
pub struct RpcPipeline {
    schema: Arc<dyn SchemaIntrospector>,
    executor: Arc<dyn ActionExecutor>,
    config: Arc<RpcConfig>,
}

/// A request that passed every check and is ready to execute. Names are internal.
struct PreparedRequest<'a> {
    resource: &'a Resource,
    action: &'a Action,
    fetch: FetchSpec,
    input: Map<String, Value>,
    identity: Option<Value>,
    filter: Option<Value>,
    sort: Vec<SortField>,
    page: Option<PageRequest>,
    tenant: Option<Value>,
}

impl RpcPipeline {
    pub fn new(
        schema: Arc<dyn SchemaIntrospector>,
        executor: Arc<dyn ActionExecutor>,
        config: Arc<RpcConfig>,
    ) -> Self {
        Self {
            schema,
            executor,
            config,
        }
    }

    /// A pipeline using the current process-wide configuration.
    pub fn from_global_config(
        schema: Arc<dyn SchemaIntrospector>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self::new(schema, executor, ConfigHandle::global().snapshot())
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Run a request, returning `{success: true, data}` or `{success: false, errors}`.
    #[instrument(name = "RpcPipeline::run", skip_all)]
    pub async fn run(&self, request: &Value, context: ExecutionContext) -> Value {
        match self.execute(request, context).await {
            Ok(data) => json!({ "success": true, "data": data }),
            Err(failure) => self.failure_response(&failure),
        }
    }

    /// Check a request without executing it, returning `{success: true}` or the errors.
    #[instrument(name = "RpcPipeline::validate", skip_all)]
    pub fn validate(&self, request: &Value, context: &ExecutionContext) -> Value {
        match self.prepare(request, context) {
            Ok(_) => json!({ "success": true }),
            Err(failure) => self.failure_response(&failure),
        }
    }

    async fn execute(
        &self,
        request: &Value,
        mut context: ExecutionContext,
    ) -> Result<Value, RpcFailure> {
        let prepared = self.prepare(request, &context)?;
        context.tenant = prepared.tenant.clone();

        let invocation = ActionInvocation {
            resource: prepared.resource,
            action: prepared.action,
            select: &prepared.fetch.select,
            load: &prepared.fetch.load,
            input: &prepared.input,
            identity: prepared.identity.as_ref(),
            filter: prepared.filter.as_ref(),
            sort: &prepared.sort,
            page: prepared.page.as_ref(),
            context: &context,
        };

        let raw = self.executor.execute(invocation).await.map_err(|err| {
            warn!(
                resource = %prepared.resource.name,
                action = %prepared.action.name,
                "Action failed: {}",
                err
            );
            err
        })?;

        let processor = ResultProcessor::new(self.schema.as_ref(), &self.config.formatter);
        match raw {
            RawResult::Value(value) => Ok(processor.process(&value, &prepared.fetch.template)?),
            RawResult::Page(page) => {
                let Page { results, info } = page;
                let results = processor.process(&Val::List(results), &prepared.fetch.template)?;
                Ok(self.page_response(results, &info))
            }
        }
    }

    fn prepare(
        &self,
        request: &Value,
        context: &ExecutionContext,
    ) -> Result<PreparedRequest<'_>, RpcFailure> {
        let result = self.prepare_request(request, context);
        if let Err(failure) = &result {
            debug!("Request rejected: {:?}", failure);
        }
        result
    }

    fn prepare_request(
        &self,
        request: &Value,
        context: &ExecutionContext,
    ) -> Result<PreparedRequest<'_>, RpcFailure> {
        let formatter = &self.config.formatter;
        let request = RpcRequest::parse(request)?;

        let (resource, action) = self
            .schema
            .rpc_action(&request.action)
            .ok_or_else(|| RequestedFieldsError::ActionNotFound(request.action.clone()))?;

        let fetch = RequestedFieldsProcessor::new(self.schema.as_ref(), formatter).process(
            &resource.name,
            &action.name,
            &request.fields,
        )?;

        let input = format_input(&request.input, action, formatter)?;

        if action.requires_identity() && request.identity.is_none() {
            return Err(RequestError::MissingIdentity(request.action).into());
        }
        let identity = request
            .identity
            .as_ref()
            .map(|identity| formatter.format_keys_internal(identity));
        let filter = request
            .filter
            .as_ref()
            .map(|filter| formatter.format_keys_internal(filter));

        let sort = match &request.sort {
            Some(sort) => {
                let sort = parse_sort(sort, formatter)?;
                check_sort(&sort, resource, self.schema.as_ref())?;
                sort
            }
            None => vec![],
        };

        let page = PageRequest::parse(request.page.as_ref(), action)?;

        let tenant = request.tenant.clone().or_else(|| context.tenant.clone());
        if self.config.require_tenant_parameters && resource.multitenant && tenant.is_none() {
            return Err(RequestError::TenantRequired(request.action).into());
        }

        Ok(PreparedRequest {
            resource,
            action,
            fetch,
            input,
            identity,
            filter,
            sort,
            page,
            tenant,
        })
    }

    fn page_response(&self, results: Value, info: &PageInfo) -> Value {
        let formatter = &self.config.formatter;
        let mut page = Map::new();
        let mut insert = |key: &str, value: Value| {
            page.insert(formatter.to_external(key), value);
        };

        match info {
            PageInfo::Offset {
                limit,
                offset,
                more,
                count,
            } => {
                insert("type", json!("offset"));
                insert("results", results);
                insert("limit", json!(limit));
                insert("offset", json!(offset));
                insert("has_more", json!(more));
                if let Some(count) = count {
                    insert("count", json!(count));
                }
            }
            PageInfo::Keyset {
                limit,
                more,
                after,
                before,
                previous_page,
                next_page,
                count,
            } => {
                insert("type", json!("keyset"));
                insert("results", results);
                insert("limit", json!(limit));
                insert("has_more", json!(more));
                insert("after", json!(after));
                insert("before", json!(before));
                insert("previous_page", json!(previous_page));
                insert("next_page", json!(next_page));
                if let Some(count) = count {
                    insert("count", json!(count));
                }
            }
        }

        Value::Object(page)
    }

    fn failure_response(&self, failure: &RpcFailure) -> Value {
        let errors = ErrorBuilder::new(&self.config.formatter).build_all(failure);
        json!({ "success": false, "errors": errors })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_log::test;

    use rpc_common::{
        formatter::{FieldFormatter, NameFormatter},
        value::Record,
    };

    use super::*;
    use crate::{
        executor::EngineError,
        test_utils::{FakeExecutor, TODO_ID, schema, todo_record},
    };

    fn pipeline_with(executor: &Arc<FakeExecutor>, config: RpcConfig) -> RpcPipeline {
        RpcPipeline::new(Arc::new(schema()), executor.clone(), Arc::new(config))
    }

    fn pipeline(executor: &Arc<FakeExecutor>) -> RpcPipeline {
        pipeline_with(executor, RpcConfig::default())
    }

    fn returning(raw: impl Into<Val>) -> Arc<FakeExecutor> {
        Arc::new(FakeExecutor::returning(RawResult::Value(raw.into())))
    }

    fn error_types(response: &Value) -> Vec<&str> {
        response["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|error| error["type"].as_str().unwrap())
            .collect()
    }

    #[test(tokio::test)]
    async fn runs_a_read() {
        let executor = returning(Val::List(vec![todo_record().into()]));

        let response = pipeline(&executor)
            .run(
                &json!({
                    "action": "list_todos",
                    "fields": ["id", "title", {"user": ["name"]}],
                }),
                ExecutionContext::default(),
            )
            .await;

        assert_eq!(
            response,
            json!({
                "success": true,
                "data": [{"id": TODO_ID, "title": "Write tests", "user": {"name": "Ada"}}],
            })
        );

        let invocations = executor.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].resource, "Todo");
        assert_eq!(invocations[0].action, "read");
        assert_eq!(invocations[0].select, vec!["id", "title"]);
        assert_eq!(invocations[0].load, json!({"user": {"select": ["name"]}}));
        assert_eq!(invocations[0].page, None);
    }

    #[test(tokio::test)]
    async fn client_names_become_internal() {
        let executor = returning(Val::List(vec![]));

        let response = pipeline(&executor)
            .run(
                &json!({
                    "action": "list_todos",
                    "input": {"showCompleted": true},
                    "fields": ["id"],
                    "filter": {"dueDate": {"lessThan": "2024-01-01"}},
                    "sort": "-dueDate, ++commentCount",
                }),
                ExecutionContext::default(),
            )
            .await;
        assert_eq!(response, json!({"success": true, "data": []}));

        let invocation = &executor.invocations()[0];
        assert_eq!(invocation.input, json!({"show_completed": true}));
        assert_eq!(
            invocation.filter,
            Some(json!({"due_date": {"less_than": "2024-01-01"}}))
        );
        assert_eq!(invocation.sort, "-due_date,++comment_count");
    }

    #[test(tokio::test)]
    async fn updates_by_primary_key() {
        let executor = returning(todo_record().with("title", "Renamed"));

        let response = pipeline(&executor)
            .run(
                &json!({
                    "action": "update_todo",
                    "primaryKey": TODO_ID,
                    "input": {"title": "Renamed"},
                    "fields": ["id", "title"],
                }),
                ExecutionContext::default(),
            )
            .await;

        assert_eq!(
            response,
            json!({"success": true, "data": {"id": TODO_ID, "title": "Renamed"}})
        );
        assert_eq!(executor.invocations()[0].identity, Some(json!(TODO_ID)));
    }

    #[test(tokio::test)]
    async fn offset_pages() {
        let executor = Arc::new(FakeExecutor::returning(RawResult::Page(Page {
            results: vec![todo_record().into()],
            info: PageInfo::Offset {
                limit: Some(10),
                offset: 0,
                more: true,
                count: Some(42),
            },
        })));

        let response = pipeline(&executor)
            .run(
                &json!({
                    "action": "list_todos",
                    "fields": ["id"],
                    "page": {"limit": 10, "count": true},
                }),
                ExecutionContext::default(),
            )
            .await;

        assert_eq!(
            response,
            json!({
                "success": true,
                "data": {
                    "type": "offset",
                    "results": [{"id": TODO_ID}],
                    "limit": 10,
                    "offset": 0,
                    "hasMore": true,
                    "count": 42,
                },
            })
        );
        assert_eq!(
            executor.invocations()[0].page,
            Some(json!({"type": "offset", "limit": 10, "offset": 0, "count": true}))
        );
    }

    #[test(tokio::test)]
    async fn keyset_pages() {
        let executor = Arc::new(FakeExecutor::returning(RawResult::Page(Page {
            results: vec![],
            info: PageInfo::Keyset {
                limit: Some(5),
                more: false,
                after: Some("abc".to_string()),
                before: None,
                previous_page: Some("xyz".to_string()),
                next_page: None,
                count: None,
            },
        })));

        let response = pipeline(&executor)
            .run(
                &json!({
                    "action": "list_todos",
                    "fields": ["id"],
                    "page": {"limit": 5, "after": "abc"},
                }),
                ExecutionContext::default(),
            )
            .await;

        assert_eq!(
            response["data"],
            json!({
                "type": "keyset",
                "results": [],
                "limit": 5,
                "hasMore": false,
                "after": "abc",
                "before": null,
                "previousPage": "xyz",
                "nextPage": null,
            })
        );
    }

    #[test(tokio::test)]
    async fn scalar_results() {
        let executor = returning(3i64);
        let response = pipeline(&executor)
            .run(&json!({"action": "count_todos"}), ExecutionContext::default())
            .await;
        assert_eq!(response, json!({"success": true, "data": 3}));

        let executor = returning(Val::Null);
        let response = pipeline(&executor)
            .run(&json!({"action": "ping"}), ExecutionContext::default())
            .await;
        assert_eq!(response, json!({"success": true, "data": null}));
    }

    #[test(tokio::test)]
    async fn field_errors_are_reported_before_execution() {
        let executor = returning(Val::Null);

        let response = pipeline(&executor)
            .run(
                &json!({"action": "list_todos", "fields": [{"title": ["nested"]}]}),
                ExecutionContext::default(),
            )
            .await;

        assert_eq!(
            response,
            json!({
                "success": false,
                "errors": [{
                    "type": "field_does_not_support_nesting",
                    "message": "Field 'title' does not support nested field selection",
                    "shortMessage": "Field does not support nesting",
                    "vars": {"field": "title"},
                    "fields": ["title"],
                    "path": [],
                    "details": {},
                }],
            })
        );
        assert!(executor.invocations().is_empty());
    }

    #[test(tokio::test)]
    async fn request_errors() {
        let executor = returning(Val::Null);
        let pipeline = pipeline(&executor);
        let run = |request: Value| {
            let pipeline = &pipeline;
            async move { pipeline.run(&request, ExecutionContext::default()).await }
        };

        let response = run(json!({"action": "get_todo", "fields": ["id"]})).await;
        assert_eq!(error_types(&response), vec!["missing_identity"]);

        let response = run(json!({
            "action": "create_todo",
            "input": {"title": "x", "isSecret": true},
            "fields": ["id"],
        }))
        .await;
        assert_eq!(error_types(&response), vec!["invalid_argument"]);
        assert_eq!(response["errors"][0]["fields"], json!(["isSecret"]));

        let response = run(json!({"action": "list_todos", "fields": ["id"], "sort": "user"})).await;
        assert_eq!(error_types(&response), vec!["invalid_sort_field"]);

        let response = run(json!({
            "action": "list_todos",
            "fields": ["id"],
            "page": {"limit": 1000},
        }))
        .await;
        assert_eq!(error_types(&response), vec!["invalid_pagination"]);

        let response = run(json!({"action": "archive_todos", "fields": ["id"]})).await;
        assert_eq!(error_types(&response), vec!["action_not_found"]);

        let response = run(json!(["list_todos"])).await;
        assert_eq!(error_types(&response), vec!["invalid_request"]);

        assert!(executor.invocations().is_empty());
    }

    #[test(tokio::test)]
    async fn every_engine_error_is_reported() {
        let executor = Arc::new(FakeExecutor::failing(EngineError::Multiple(vec![
            EngineError::InvalidAttribute {
                field: "title".to_string(),
                message: "is required".to_string(),
            },
            EngineError::InvalidAttribute {
                field: "due_date".to_string(),
                message: "must be in the future".to_string(),
            },
        ])));

        let response = pipeline(&executor)
            .run(
                &json!({"action": "create_todo", "input": {"title": ""}, "fields": ["id"]}),
                ExecutionContext::default(),
            )
            .await;

        assert_eq!(response["success"], json!(false));
        assert_eq!(
            error_types(&response),
            vec!["invalid_attribute", "invalid_attribute"]
        );
        assert_eq!(response["errors"][1]["fields"], json!(["dueDate"]));
    }

    #[test(tokio::test)]
    async fn unprocessable_results_are_internal_errors() {
        let executor = returning(Record::new("Todo").with("id", TODO_ID));

        let response = pipeline(&executor)
            .run(
                &json!({"action": "get_todo", "primaryKey": TODO_ID, "fields": ["id", "title"]}),
                ExecutionContext::default(),
            )
            .await;

        assert_eq!(error_types(&response), vec!["internal_error"]);
    }

    #[test(tokio::test)]
    async fn tenants() {
        let executor = returning(Val::List(vec![]));
        let pipeline = pipeline_with(
            &executor,
            RpcConfig {
                require_tenant_parameters: true,
                ..Default::default()
            },
        );
        let request = json!({"action": "list_comments", "fields": ["id"]});

        let response = pipeline.run(&request, ExecutionContext::default()).await;
        assert_eq!(error_types(&response), vec!["tenant_required"]);

        let context = ExecutionContext::default().with_tenant(json!("org_1"));
        let response = pipeline.run(&request, context.clone()).await;
        assert_eq!(response["success"], json!(true));

        let request = json!({"action": "list_comments", "fields": ["id"], "tenant": "org_2"});
        pipeline.run(&request, context).await;

        let tenants: Vec<_> = executor
            .invocations()
            .into_iter()
            .map(|invocation| invocation.tenant)
            .collect();
        assert_eq!(tenants, vec![Some(json!("org_1")), Some(json!("org_2"))]);

        // Resources that are not multitenant run without one
        let response = pipeline
            .run(
                &json!({"action": "list_users", "fields": ["id"]}),
                ExecutionContext::default(),
            )
            .await;
        assert_eq!(response["success"], json!(true));
    }

    #[test]
    fn validates_without_executing() {
        let executor = returning(Val::Null);
        let pipeline = pipeline(&executor);
        let context = ExecutionContext::default();

        assert_eq!(
            pipeline.validate(
                &json!({"action": "list_todos", "fields": ["id", {"user": ["name"]}]}),
                &context
            ),
            json!({"success": true})
        );

        let response = pipeline.validate(
            &json!({"action": "list_todos", "fields": [{"user": ["nickname"]}]}),
            &context,
        );
        assert_eq!(error_types(&response), vec!["unknown_field"]);
        assert_eq!(response["errors"][0]["path"], json!(["user"]));
        assert_eq!(response["errors"][0]["fields"], json!(["nickname"]));

        assert!(executor.invocations().is_empty());
    }

    #[test(tokio::test)]
    async fn output_follows_the_configured_formatter() {
        let executor = returning(todo_record());
        let config = RpcConfig::default().with_formatter(NameFormatter::new(
            FieldFormatter::CamelCase,
            FieldFormatter::SnakeCase,
        ));

        let response = pipeline_with(&executor, config)
            .run(
                &json!({
                    "action": "get_todo",
                    "primaryKey": TODO_ID,
                    "fields": ["addressLine1", "commentCount"],
                }),
                ExecutionContext::default(),
            )
            .await;

        assert_eq!(
            response["data"],
            json!({"address_line_1": "1 Main St", "comment_count": 0})
        );
    }
}
