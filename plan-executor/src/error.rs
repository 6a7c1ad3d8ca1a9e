//! Errors produced while executing a query plan.

use serde_json_bytes::Value;

use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Path;

/// Error types for plan execution.
///
/// Most of these surface as GraphQL errors in the final envelope rather
/// than aborting the request; only [`FetchError::UnsupportedPlanNode`] is
/// fatal to the whole plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("service '{service}' was not found in the service registry")]
    UnknownService {
        /// The service that was not found.
        service: String,
    },

    #[error(
        "variables must not contain a key named 'representations', it is reserved for entity fetches"
    )]
    ForbiddenRepresentationsVariable,

    #[error("service '{service}' returned a response without a 'data._entities' array")]
    ExpectedEntitiesArray {
        /// The service that returned the malformed response.
        service: String,
    },

    #[error("service '{service}' returned {received} entities, expected {expected}")]
    EntityCountMismatch {
        /// The service that returned the malformed response.
        service: String,
        /// How many representations were sent.
        expected: usize,
        /// How many entities came back.
        received: usize,
    },

    #[error("HTTP fetch failed from '{service}': {reason}")]
    SubrequestHttpError {
        /// The service that failed.
        service: String,
        /// The reason the fetch failed.
        reason: String,
    },

    #[error("query plan contained an unsupported '{kind}' node")]
    UnsupportedPlanNode {
        /// The node kind that cannot be executed.
        kind: String,
    },

    #[error("plan execution failed: {reason}")]
    ExecutorError {
        /// The failure, which was not expected to happen.
        reason: String,
    },
}

impl FetchError {
    /// Convert the fetch error to a GraphQL error.
    pub fn to_graphql_error(&self, path: Option<Path>) -> graphql::Error {
        let mut extensions = Object::default();
        extensions.insert("code", Value::from(self.extension_code()));
        if let Some(service) = self.service() {
            extensions.insert("serviceName", Value::from(service));
        }
        graphql::Error::builder()
            .message(self.to_string())
            .and_path(path)
            .extensions(extensions)
            .build()
    }

    pub(crate) const fn extension_code(&self) -> &'static str {
        match self {
            FetchError::UnknownService { .. } => "MISSING_SERVICE",
            FetchError::ForbiddenRepresentationsVariable => {
                "FORBIDDEN_REPRESENTATIONS_VARIABLE"
            }
            FetchError::ExpectedEntitiesArray { .. } => "EXPECTED_ENTITIES_ARRAY",
            FetchError::EntityCountMismatch { .. } => "ENTITY_COUNT_MISMATCH",
            FetchError::SubrequestHttpError { .. } => "DOWNSTREAM_SERVICE_ERROR",
            FetchError::UnsupportedPlanNode { .. } => "UNSUPPORTED_PLAN_NODE",
            FetchError::ExecutorError { .. } => "UNEXPECTED_EXECUTOR_ERROR",
        }
    }

    fn service(&self) -> Option<&str> {
        match self {
            FetchError::UnknownService { service }
            | FetchError::ExpectedEntitiesArray { service }
            | FetchError::EntityCountMismatch { service, .. }
            | FetchError::SubrequestHttpError { service, .. } => Some(service),
            _ => None,
        }
    }

    /// Whether this error aborts the whole plan rather than one fetch.
    pub(crate) const fn is_fatal(&self) -> bool {
        matches!(self, FetchError::UnsupportedPlanNode { .. })
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn test_fetch_error_to_graphql_error() {
        let error = FetchError::EntityCountMismatch {
            service: "accounts".to_string(),
            expected: 2,
            received: 1,
        }
        .to_graphql_error(Some(Path::from("users/0")));
        assert_eq!(
            error.message,
            "service 'accounts' returned 1 entities, expected 2"
        );
        assert_eq!(error.extensions.get("code"), Some(&json!("ENTITY_COUNT_MISMATCH")));
        assert_eq!(error.extensions.get("serviceName"), Some(&json!("accounts")));
        assert_eq!(error.path, Some(Path::from("users/0")));
    }

    #[test]
    fn test_unsupported_plan_node_is_fatal() {
        assert!(FetchError::UnsupportedPlanNode {
            kind: "Defer".to_string()
        }
        .is_fatal());
        assert!(!FetchError::UnknownService {
            service: "books".to_string()
        }
        .is_fatal());
    }
}
