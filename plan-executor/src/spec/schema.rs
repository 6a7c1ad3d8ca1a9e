//! The composed schemas a request executes against.

use std::sync::Arc;

use apollo_compiler::validation::Valid;

/// The schema pair the executor works with: the supergraph schema drives
/// entity representation extraction, the API schema drives response
/// shaping.
#[derive(Debug)]
pub struct Schema {
    supergraph: Arc<Valid<apollo_compiler::Schema>>,
    api: Arc<Valid<apollo_compiler::Schema>>,
}

/// Schema parse failure.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("could not parse schema: {0}")]
    Parse(String),
}

impl Schema {
    /// Parse the supergraph and API schema documents.
    pub fn parse(supergraph_sdl: &str, api_sdl: &str) -> Result<Self, SchemaError> {
        let supergraph = apollo_compiler::Schema::parse_and_validate(supergraph_sdl, "supergraph.graphql")
            .map_err(|e| SchemaError::Parse(e.errors.to_string()))?;
        let api = apollo_compiler::Schema::parse_and_validate(api_sdl, "api.graphql")
            .map_err(|e| SchemaError::Parse(e.errors.to_string()))?;
        Ok(Self {
            supergraph: Arc::new(supergraph),
            api: Arc::new(api),
        })
    }

    pub(crate) fn supergraph_schema(&self) -> &Valid<apollo_compiler::Schema> {
        &self.supergraph
    }

    pub(crate) fn api_schema(&self) -> &Valid<apollo_compiler::Schema> {
        &self.api
    }

    /// Whether `maybe_subtype` is a member or implementer of the abstract
    /// type `abstract_type` in the supergraph schema.
    pub(crate) fn is_subtype(&self, abstract_type: &str, maybe_subtype: &str) -> bool {
        self.supergraph_schema()
            .is_subtype(abstract_type, maybe_subtype)
    }

    /// Whether a runtime `typename` satisfies the type `condition`.
    ///
    /// Concrete conditions match by exact name only; abstract conditions
    /// match any subtype.
    pub(crate) fn condition_matches(&self, condition: &str, typename: &str) -> bool {
        condition == typename || self.is_subtype(condition, typename)
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        let sdl = r#"
            type Query {
                me: User
                users: [User]
                search: [SearchResult]
            }

            interface Node {
                id: ID!
            }

            type User implements Node {
                id: ID!
                name: String
                username: String
                email: String
                reviews: [Review]
            }

            type Review {
                body: String
                author: User
            }

            union SearchResult = User | Review
        "#;
        Self::parse(sdl, sdl).expect("test schema is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtype_checks() {
        let schema = Schema::for_tests();
        assert!(schema.is_subtype("Node", "User"));
        assert!(schema.is_subtype("SearchResult", "Review"));
        assert!(!schema.is_subtype("Node", "Review"));
        // non-abstract conditions never match through subtyping
        assert!(!schema.is_subtype("User", "User"));
        assert!(schema.condition_matches("User", "User"));
        assert!(!schema.condition_matches("User", "Review"));
        assert!(schema.condition_matches("Node", "User"));
    }

    #[test]
    fn test_invalid_schema_is_rejected() {
        assert!(Schema::parse("type Query { me: Missing }", "type Query { id: ID }").is_err());
    }
}
