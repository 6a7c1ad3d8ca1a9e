//! Trace-level logging of plan execution, for debugging a gateway against
//! live subgraphs.

use super::PlanNode;
use crate::graphql;
use crate::json_ext::Object;

pub(crate) fn trace_query_plan(plan: &Option<PlanNode>) {
    tracing::trace!("query plan\n{:#?}", plan);
}

pub(crate) fn trace_subfetch(
    service_name: &str,
    operation: &str,
    variables: &Object,
    response: &graphql::Response,
) {
    tracing::trace!(
        "subgraph fetch to {}: operation = '{}', variables = {:?}, response:\n{}",
        service_name,
        operation,
        variables,
        serde_json::to_string_pretty(response).unwrap_or_default(),
    );
}
