//! Interpretation of the plan tree against the shared results.

use std::sync::Arc;

use futures::future;
use futures::future::join_all;
use tracing::Instrument;
use tracing::Span;

use super::log;
use super::trace;
use super::FlattenNode;
use super::PlanNode;
use super::QueryPlan;
use super::EXECUTION_SPAN_NAME;
use super::FETCH_SPAN_NAME;
use super::FLATTEN_SPAN_NAME;
use super::FORMAT_RESPONSE_SPAN_NAME;
use super::PARALLEL_SPAN_NAME;
use super::SEQUENCE_SPAN_NAME;
use crate::context::Context;
use crate::error::FetchError;
use crate::graphql;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::introspection::IntrospectionHandler;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::proto::reports::trace::query_plan_node as proto;
use crate::proto::reports::trace::QueryPlanNode as ProtoQueryPlanNode;
use crate::services::SubgraphServiceFactory;
use crate::spec::Query;
use crate::spec::Schema;

/// Options for one plan execution.
#[derive(Clone, Debug, Default)]
pub struct ExecutionOptions {
    /// Capture an FTv1 trace tree for this request. The tree is stored on
    /// the request [`Context`] once execution completes.
    pub capture_traces: bool,
}

// holds the query plan execution arguments that do not change between calls
pub(crate) struct ExecutionParameters<'a, SF> {
    pub(crate) context: &'a Context,
    pub(crate) service_factory: &'a Arc<SF>,
    pub(crate) schema: &'a Schema,
    pub(crate) supergraph_request: &'a Arc<http::Request<Request>>,
    pub(crate) options: &'a ExecutionOptions,
}

impl QueryPlan {
    /// Execute the plan and return the final [`Response`] envelope.
    ///
    /// Fetch-level failures surface as error entries while execution
    /// continues; a structurally unsupported plan aborts with a single
    /// error and no data.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute<'a, SF>(
        &self,
        context: &'a Context,
        service_factory: &'a Arc<SF>,
        supergraph_request: &'a Arc<http::Request<Request>>,
        schema: &'a Schema,
        query: &'a Query,
        introspection: &'a dyn IntrospectionHandler,
        options: &'a ExecutionOptions,
    ) -> Response
    where
        SF: SubgraphServiceFactory,
    {
        let span = tracing::info_span!(
            EXECUTION_SPAN_NAME,
            "otel.kind" = "INTERNAL",
            "otel.status_code" = tracing::field::Empty,
        );

        async {
            let root = Path::empty();
            log::trace_query_plan(&self.root);

            let mut value = Value::default();
            let mut errors = Vec::new();

            if let Some(node) = &self.root {
                match node
                    .execute_recursively(
                        &ExecutionParameters {
                            context,
                            service_factory,
                            schema,
                            supergraph_request,
                            options,
                        },
                        &root,
                        &Value::default(),
                    )
                    .await
                {
                    Ok((v, errs, trace_node)) => {
                        value = v;
                        errors = errs;
                        if options.capture_traces {
                            context.store_query_plan_trace(trace_node);
                        }
                    }
                    Err(fatal) => {
                        // the plan cannot be interpreted at all: no
                        // partial data leaves the executor
                        Span::current().record("otel.status_code", "ERROR");
                        return Response::builder()
                            .errors(vec![fatal.to_graphql_error(None)])
                            .build();
                    }
                }
            }

            let has_fetch_errors = !errors.is_empty();

            let (data, postprocessing_errors) = async {
                match query.format_response(&value, schema, introspection) {
                    Ok((data, errs)) => (Some(data), errs),
                    Err(error) => (None, vec![error.into_graphql_error()]),
                }
            }
            .instrument(tracing::info_span!(FORMAT_RESPONSE_SPAN_NAME))
            .await;

            // when a fetch failed, shaping errors are almost always its
            // downstream shadow: only the fetch errors are reported
            if !has_fetch_errors {
                errors.extend(postprocessing_errors);
            }

            if !errors.is_empty() {
                Span::current().record("otel.status_code", "ERROR");
            }

            Response::builder().and_data(data).errors(errors).build()
        }
        .instrument(span)
        .await
    }
}

impl PlanNode {
    fn execute_recursively<'a, SF>(
        &'a self,
        parameters: &'a ExecutionParameters<'a, SF>,
        current_dir: &'a Path,
        parent_value: &'a Value,
    ) -> future::BoxFuture<'a, Result<(Value, Vec<graphql::Error>, ProtoQueryPlanNode), FetchError>>
    where
        SF: SubgraphServiceFactory,
    {
        Box::pin(async move {
            tracing::trace!("executing plan:\n{:#?}", self);

            if parameters.context.is_cancelled() {
                // no further plan nodes start once the request is
                // cancelled; what was merged already is kept
                return Ok((
                    Value::default(),
                    Vec::new(),
                    ProtoQueryPlanNode { node: None },
                ));
            }

            let value;
            let errors;
            let trace_node;

            match self {
                PlanNode::Sequence { nodes } => {
                    let mut merged = parent_value.clone();
                    let mut collected = Vec::new();
                    let mut trace_nodes = Vec::with_capacity(nodes.len());
                    let span = tracing::info_span!(SEQUENCE_SPAN_NAME);
                    for node in nodes {
                        let (v, err, child_trace) = node
                            .execute_recursively(parameters, current_dir, &merged)
                            .instrument(span.clone())
                            .await?;
                        merged.deep_merge(v);
                        collected.extend(err.into_iter());
                        trace_nodes.push(child_trace);
                    }
                    value = merged;
                    errors = collected;
                    trace_node = ProtoQueryPlanNode {
                        node: Some(proto::Node::Sequence(proto::SequenceNode {
                            nodes: trace_nodes,
                        })),
                    };
                }
                PlanNode::Parallel { nodes } => {
                    let mut merged = Value::default();
                    let mut collected = Vec::new();
                    let mut trace_nodes = Vec::with_capacity(nodes.len());
                    let span = tracing::info_span!(PARALLEL_SPAN_NAME);
                    let results = join_all(nodes.iter().map(|node| {
                        node.execute_recursively(parameters, current_dir, parent_value)
                            .instrument(span.clone())
                    }))
                    .await;
                    for result in results {
                        let (v, err, child_trace) = result?;
                        merged.deep_merge(v);
                        collected.extend(err.into_iter());
                        trace_nodes.push(child_trace);
                    }
                    value = merged;
                    errors = collected;
                    trace_node = ProtoQueryPlanNode {
                        node: Some(proto::Node::Parallel(proto::ParallelNode {
                            nodes: trace_nodes,
                        })),
                    };
                }
                PlanNode::Flatten(FlattenNode { path, node }) => {
                    let current_dir = current_dir.join(path);

                    // move the cursor: when the new path selects nothing
                    // but nulls, the child never runs
                    let mut has_data = false;
                    parent_value.select_values_and_paths(
                        parameters.schema,
                        &current_dir,
                        |_path, value| {
                            if !value.is_null() {
                                has_data = true;
                            }
                        },
                    );

                    let child_trace = if has_data {
                        // Note that the span must be `info` as we need to pick this up in apollo tracing
                        let (v, err, child_trace) = node
                            .execute_recursively(parameters, &current_dir, parent_value)
                            .instrument(tracing::info_span!(
                                FLATTEN_SPAN_NAME,
                                apollo_private.path = %current_dir,
                            ))
                            .await?;
                        value = v;
                        errors = err;
                        Some(Box::new(child_trace))
                    } else {
                        value = Value::default();
                        errors = Vec::new();
                        None
                    };
                    trace_node = ProtoQueryPlanNode {
                        node: Some(proto::Node::Flatten(Box::new(proto::FlattenNode {
                            response_path: trace::response_path(path),
                            node: child_trace,
                        }))),
                    };
                }
                PlanNode::Fetch(fetch_node) => {
                    let fetch_time_offset =
                        parameters.context.created_at.elapsed().as_nanos() as i64;
                    match fetch_node
                        .fetch_node(parameters, parent_value, current_dir)
                        .instrument(tracing::info_span!(
                            FETCH_SPAN_NAME,
                            "otel.kind" = "INTERNAL",
                            "apollo.subgraph.name" = &*fetch_node.service_name,
                            "apollo_private.sent_time_offset" = fetch_time_offset,
                        ))
                        .await
                    {
                        Ok((v, err, fetch_trace)) => {
                            value = v;
                            errors = err;
                            trace_node = ProtoQueryPlanNode {
                                node: Some(proto::Node::Fetch(fetch_trace)),
                            };
                        }
                        Err(error) if error.is_fatal() => return Err(error),
                        Err(error) => {
                            tracing::error!("fetch error: {}", error);
                            value = Value::default();
                            errors = vec![error.to_graphql_error(
                                (!current_dir.is_empty())
                                    .then(|| current_dir.concrete_ancestor()),
                            )];
                            trace_node = ProtoQueryPlanNode {
                                node: Some(proto::Node::Fetch(proto::FetchNode {
                                    service_name: fetch_node.service_name.to_string(),
                                    ..Default::default()
                                })),
                            };
                        }
                    }
                }
                PlanNode::Defer { .. } | PlanNode::Condition { .. } => {
                    // the planner was configured for capabilities this
                    // executor does not have; the whole request fails
                    return Err(FetchError::UnsupportedPlanNode {
                        kind: self.kind().to_string(),
                    });
                }
            }

            Ok((value, errors, trace_node))
        })
    }
}
