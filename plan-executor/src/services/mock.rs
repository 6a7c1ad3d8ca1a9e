//! A programmable subgraph used by tests.

use std::sync::Arc;
use std::task::Poll;

use futures::future::ready;
use futures::future::Ready;
use tower::BoxError;
use tower::Service;

use crate::graphql;
use crate::services::SubgraphRequest;
use crate::services::SubgraphResponse;

pub type MockResponses = Vec<(graphql::Request, graphql::Response)>;

/// A subgraph service answering from a fixed request → response table.
///
/// Unknown requests produce an error response rather than a panic, so a
/// mismatched mock surfaces in the test's envelope.
#[derive(Clone, Default)]
pub struct MockSubgraph {
    // shared so that cloning the service for each fetch stays cheap
    mocks: Arc<MockResponses>,
}

impl MockSubgraph {
    pub fn new(mocks: MockResponses) -> Self {
        Self {
            mocks: Arc::new(mocks),
        }
    }

    pub fn builder() -> MockSubgraphBuilder {
        MockSubgraphBuilder::default()
    }
}

/// Builder for [`MockSubgraph`]
#[derive(Default, Clone)]
pub struct MockSubgraphBuilder {
    mocks: MockResponses,
}

impl MockSubgraphBuilder {
    /// Adds a mocked response for a request made of JSON values.
    ///
    /// The requests are compared in their entirety: query, operation
    /// name and variables must all match.
    pub fn with_json(mut self, request: serde_json::Value, response: serde_json::Value) -> Self {
        self.mocks.push((
            serde_json::from_value(request).expect("mock request should deserialize"),
            serde_json::from_value(response).expect("mock response should deserialize"),
        ));
        self
    }

    pub fn build(self) -> MockSubgraph {
        MockSubgraph::new(self.mocks)
    }
}

impl Service<SubgraphRequest> for MockSubgraph {
    type Response = SubgraphResponse;
    type Error = BoxError;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: SubgraphRequest) -> Self::Future {
        let body = req.subgraph_request.body();
        let response = self
            .mocks
            .iter()
            .find_map(|(mock_request, mock_response)| {
                (mock_request == body).then(|| mock_response.clone())
            })
            .unwrap_or_else(|| {
                graphql::Response::builder()
                    .errors(vec![graphql::Error::builder()
                        .message(format!("couldn't find mock for query {body:?}"))
                        .extension_code("FETCH_ERROR")
                        .build()])
                    .build()
            });
        ready(Ok(SubgraphResponse::builder()
            .response(response)
            .context(req.context)
            .build()))
    }
}
