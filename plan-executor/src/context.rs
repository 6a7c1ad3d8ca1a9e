//! Per-request state threaded through plan execution.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::json_ext::Path;
use crate::proto::reports::trace::QueryPlanNode;

/// Holds the context of an executing query plan.
///
/// The context is created when a request enters the executor and dropped
/// when the final envelope is returned. Cloning is cheap and all clones
/// share the same cancellation token and metrics sink.
#[derive(Clone)]
pub struct Context {
    /// When the request started. Fetch timing offsets are measured
    /// against this instant.
    pub(crate) created_at: Instant,

    cancellation: CancellationToken,

    metrics: Arc<SubgraphMetrics>,

    query_plan_trace: Arc<Mutex<Option<QueryPlanNode>>>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            created_at: Instant::now(),
            cancellation: CancellationToken::new(),
            metrics: Default::default(),
            query_plan_trace: Default::default(),
        }
    }

    /// Cancel the request: in-flight subgraph calls return and no further
    /// plan nodes start. Data merged so far is retained.
    pub fn cancel(&self) {
        self.cancellation.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub(crate) async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn metrics(&self) -> &SubgraphMetrics {
        &self.metrics
    }

    pub(crate) fn store_query_plan_trace(&self, trace: QueryPlanNode) {
        *self.query_plan_trace.lock() = Some(trace);
    }

    /// The proto tree mirroring the executed plan, available once the
    /// request completes when trace capture was requested.
    pub fn query_plan_trace(&self) -> Option<QueryPlanNode> {
        self.query_plan_trace.lock().clone()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Request-scoped sink for subgraph error observations.
///
/// When a subgraph response carries errors but no FTv1 trace, the error
/// paths cannot be attributed through the trace tree, so they are recorded
/// here instead for the metrics pipeline to pick up.
#[derive(Default)]
pub struct SubgraphMetrics {
    error_paths: Mutex<Vec<SubgraphErrorPath>>,
}

/// One subgraph error observation: which service produced it and where in
/// the client response it landed.
#[derive(Clone, Debug, PartialEq)]
pub struct SubgraphErrorPath {
    pub service: String,
    pub path: Option<Path>,
}

impl SubgraphMetrics {
    pub(crate) fn record_error_path(&self, service: &str, path: Option<&Path>) {
        tracing::trace!(
            monotonic_counter.plan_executor.subgraph.errors = 1u64,
            subgraph = %service,
        );
        self.error_paths.lock().push(SubgraphErrorPath {
            service: service.to_string(),
            path: path.cloned(),
        });
    }

    /// Drain the recorded error paths.
    pub fn drain_error_paths(&self) -> Vec<SubgraphErrorPath> {
        std::mem::take(&mut *self.error_paths.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_shared_between_clones() {
        let context = Context::new();
        let clone = context.clone();
        assert!(!clone.is_cancelled());
        context.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_metrics_record_and_drain() {
        let context = Context::new();
        context
            .metrics()
            .record_error_path("accounts", Some(&Path::from("users/0")));
        let drained = context.metrics().drain_error_paths();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].service, "accounts");
        assert!(context.metrics().drain_error_paths().is_empty());
    }
}
