//! Execution of the query plan produced for a client operation.

mod execution;
pub(crate) mod fetch;
mod log;
pub(crate) mod rewrites;
pub(crate) mod selection;
mod trace;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::Value;

pub use execution::ExecutionOptions;
pub use fetch::FetchNode;
pub use fetch::OperationKind;
pub use fetch::SubgraphOperation;
pub use rewrites::DataKeyRenamer;
pub use rewrites::DataRewrite;
pub use rewrites::DataValueSetter;
pub use selection::Field;
pub use selection::InlineFragment;
pub use selection::Selection;

use crate::json_ext::Path;

pub(crate) const SEQUENCE_SPAN_NAME: &str = "sequence";
pub(crate) const PARALLEL_SPAN_NAME: &str = "parallel";
pub(crate) const FLATTEN_SPAN_NAME: &str = "flatten";
pub(crate) const FETCH_SPAN_NAME: &str = "fetch";
pub(crate) const EXECUTION_SPAN_NAME: &str = "execution";
pub(crate) const FORMAT_RESPONSE_SPAN_NAME: &str = "format_response";

/// The root query plan container.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryPlan {
    /// The hierarchical nodes that make up the query plan.
    #[serde(rename = "node")]
    pub root: Option<PlanNode>,
}

impl QueryPlan {
    pub fn new(root: Option<PlanNode>) -> Self {
        Self { root }
    }
}

/// Query plans are composed of a set of nodes.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", tag = "kind")]
pub enum PlanNode {
    /// These nodes must be executed in order.
    Sequence {
        /// The plan nodes that make up the sequence execution.
        nodes: Vec<PlanNode>,
    },

    /// These nodes may be executed in parallel.
    Parallel {
        /// The plan nodes that make up the parallel execution.
        nodes: Vec<PlanNode>,
    },

    /// Fetch some data from a subgraph.
    Fetch(FetchNode),

    /// Merge the current resultset with the response.
    Flatten(FlattenNode),

    /// Deferred delivery. Recognized so that such a plan still
    /// deserializes, but executing it is an error: this executor does not
    /// deliver incremental responses.
    Defer {
        #[serde(default)]
        primary: Value,
        #[serde(default)]
        deferred: Value,
    },

    /// Conditional execution on a variable. Recognized but not executable,
    /// as above.
    #[serde(rename_all = "camelCase")]
    Condition {
        condition: String,
        #[serde(default)]
        if_clause: Value,
        #[serde(default)]
        else_clause: Value,
    },
}

impl PlanNode {
    /// The plan node kind, as spelled in the serialized plan.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            PlanNode::Sequence { .. } => "Sequence",
            PlanNode::Parallel { .. } => "Parallel",
            PlanNode::Fetch(..) => "Fetch",
            PlanNode::Flatten(..) => "Flatten",
            PlanNode::Defer { .. } => "Defer",
            PlanNode::Condition { .. } => "Condition",
        }
    }
}

/// A flatten node.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenNode {
    /// The path where the result should be merged. May contain `@`.
    pub path: Path,

    /// The child execution plan.
    pub node: Box<PlanNode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_plan_deserialization() {
        let plan: QueryPlan = serde_json::from_str(
            r#"{
                "node": {
                    "kind": "Sequence",
                    "nodes": [
                        {
                            "kind": "Fetch",
                            "serviceName": "accounts",
                            "variableUsages": [],
                            "operation": "{ users { id } }",
                            "operationKind": "query"
                        },
                        {
                            "kind": "Flatten",
                            "path": ["users", "@"],
                            "node": {
                                "kind": "Fetch",
                                "serviceName": "reviews",
                                "requires": [
                                    {
                                        "kind": "InlineFragment",
                                        "typeCondition": "User",
                                        "selections": [
                                            { "kind": "Field", "name": "__typename" },
                                            { "kind": "Field", "name": "id" }
                                        ]
                                    }
                                ],
                                "variableUsages": [],
                                "operation": "query($representations: [_Any!]!) { _entities(representations: $representations) { ... on User { reviews { body } } } }",
                                "operationKind": "query"
                            }
                        }
                    ]
                }
            }"#,
        )
        .unwrap();

        let root = plan.root.expect("plan has a root");
        match &root {
            PlanNode::Sequence { nodes } => {
                assert_eq!(nodes.len(), 2);
                assert!(matches!(nodes[0], PlanNode::Fetch(_)));
                match &nodes[1] {
                    PlanNode::Flatten(flatten) => {
                        assert_eq!(flatten.path, Path::from("users/@"));
                        assert!(matches!(*flatten.node, PlanNode::Fetch(_)));
                    }
                    other => panic!("expected a flatten node, got {}", other.kind()),
                }
            }
            other => panic!("expected a sequence node, got {}", other.kind()),
        }
    }

    #[test]
    fn test_defer_nodes_still_deserialize() {
        let plan: QueryPlan = serde_json::from_str(
            r#"{"node": {"kind": "Defer", "primary": {}, "deferred": []}}"#,
        )
        .unwrap();
        assert_eq!(plan.root.map(|node| node.kind()), Some("Defer"));
    }
}
