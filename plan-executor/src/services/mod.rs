//! Service abstraction for subgraph data sources.
//!
//! The executor never talks to the network itself: it asks a
//! [`SubgraphServiceFactory`] for a [`tower::Service`] by subgraph name and
//! sends [`SubgraphRequest`]s through it. Transport, pooling, timeouts and
//! rate limiting all live behind that service boundary.

mod mock;

use std::collections::HashMap;
use std::sync::Arc;

use apollo_compiler::ast;
use tower::util::BoxService;
use tower::BoxError;
use tower::Service;
use tower::ServiceExt;

use crate::context::Context;
use crate::graphql;
use crate::query_planner::OperationKind;

pub use mock::MockResponses;
pub use mock::MockSubgraph;
pub use mock::MockSubgraphBuilder;

/// The header a subgraph fetch sets to request an FTv1 trace payload.
pub const FEDERATION_INCLUDE_TRACE_HEADER: &str = "apollo-federation-include-trace";

/// The header value requesting the FTv1 trace format.
pub const FTV1_TRACE_FORMAT: &str = "ftv1";

/// One operation on its way to a subgraph.
pub struct SubgraphRequest {
    /// The request to send, with the GraphQL operation as its body.
    pub subgraph_request: http::Request<graphql::Request>,

    /// The name of the subgraph this request targets.
    pub subgraph_name: String,

    /// The kind of operation this fetch executes.
    pub operation_kind: OperationKind,

    /// The parsed operation document, for data sources that work on the
    /// AST rather than the operation string.
    pub document: Option<Arc<ast::Document>>,

    /// The request context this fetch belongs to.
    pub context: Context,
}

#[buildstructor::buildstructor]
impl SubgraphRequest {
    /// Returns a new builder for [`SubgraphRequest`].
    #[builder(visibility = "pub")]
    fn new(
        subgraph_request: http::Request<graphql::Request>,
        subgraph_name: String,
        operation_kind: Option<OperationKind>,
        document: Option<Arc<ast::Document>>,
        context: Context,
    ) -> Self {
        Self {
            subgraph_request,
            subgraph_name,
            operation_kind: operation_kind.unwrap_or_default(),
            document,
            context,
        }
    }
}

/// A subgraph's answer to a [`SubgraphRequest`].
pub struct SubgraphResponse {
    /// The response, with the GraphQL response as its body.
    pub response: http::Response<graphql::Response>,

    /// The request context this response belongs to.
    pub context: Context,
}

#[buildstructor::buildstructor]
impl SubgraphResponse {
    /// Returns a new builder for [`SubgraphResponse`].
    #[builder(visibility = "pub")]
    fn new(response: graphql::Response, context: Context) -> Self {
        Self {
            response: http::Response::new(response),
            context,
        }
    }
}

/// Creates fresh subgraph service instances.
///
/// Services are built per fetch so that a single registry can be shared
/// across concurrently executing plan nodes without synchronization.
pub trait MakeSubgraphService: Send + Sync + 'static {
    fn make(&self) -> BoxService<SubgraphRequest, SubgraphResponse, BoxError>;
}

impl<S> MakeSubgraphService for S
where
    S: Service<SubgraphRequest, Response = SubgraphResponse, Error = BoxError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    fn make(&self) -> BoxService<SubgraphRequest, SubgraphResponse, BoxError> {
        self.clone().boxed()
    }
}

/// Resolves subgraph names to services for the duration of a request.
pub trait SubgraphServiceFactory: Send + Sync + 'static {
    type SubgraphService: Service<
            SubgraphRequest,
            Response = SubgraphResponse,
            Error = BoxError,
            Future = Self::Future,
        > + Send
        + 'static;
    type Future: Send + 'static;

    /// Create a service for the named subgraph, or `None` when the name
    /// is not federated into this supergraph.
    fn create(&self, name: &str) -> Option<Self::SubgraphService>;
}

/// The plain map-backed [`SubgraphServiceFactory`].
#[derive(Clone, Default)]
pub struct SubgraphServiceRegistry {
    services: Arc<HashMap<String, Arc<dyn MakeSubgraphService>>>,
}

impl SubgraphServiceRegistry {
    pub fn new(services: HashMap<String, Arc<dyn MakeSubgraphService>>) -> Self {
        Self {
            services: Arc::new(services),
        }
    }
}

#[buildstructor::buildstructor]
impl SubgraphServiceRegistry {
    /// Returns a new builder for [`SubgraphServiceRegistry`], accepting
    /// `(name, service)` pairs through `.service(name, svc)`.
    #[builder(entry = "builder", exit = "build", visibility = "pub")]
    fn registry_new(services: HashMap<String, Arc<dyn MakeSubgraphService>>) -> Self {
        Self::new(services)
    }
}

impl SubgraphServiceFactory for SubgraphServiceRegistry {
    type SubgraphService = BoxService<SubgraphRequest, SubgraphResponse, BoxError>;
    type Future = <BoxService<SubgraphRequest, SubgraphResponse, BoxError> as Service<
        SubgraphRequest,
    >>::Future;

    fn create(&self, name: &str) -> Option<Self::SubgraphService> {
        self.services.get(name).map(|make| make.make())
    }
}
