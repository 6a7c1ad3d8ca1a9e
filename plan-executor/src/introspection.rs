//! Delegated introspection resolution.
//!
//! The executor never resolves `__schema` or `__type` itself: the
//! surrounding server injects a handler and post-processing calls it for
//! each root introspection selection it encounters.

use apollo_compiler::executable::Field;
use apollo_compiler::validation::Valid;

use crate::graphql;
use crate::json_ext::Value;

/// Resolves one root introspection field against the API schema.
pub trait IntrospectionHandler: Send + Sync {
    fn resolve(
        &self,
        api_schema: &Valid<apollo_compiler::Schema>,
        field: &Field,
    ) -> Result<Value, graphql::Error>;
}

impl<F> IntrospectionHandler for F
where
    F: Fn(&Valid<apollo_compiler::Schema>, &Field) -> Result<Value, graphql::Error> + Send + Sync,
{
    fn resolve(
        &self,
        api_schema: &Valid<apollo_compiler::Schema>,
        field: &Field,
    ) -> Result<Value, graphql::Error> {
        self(api_schema, field)
    }
}

/// The handler used when the server does not inject one: every
/// introspection selection resolves to an error entry.
pub struct DisabledIntrospection;

impl IntrospectionHandler for DisabledIntrospection {
    fn resolve(
        &self,
        _api_schema: &Valid<apollo_compiler::Schema>,
        field: &Field,
    ) -> Result<Value, graphql::Error> {
        Err(graphql::Error::builder()
            .message(format!(
                "introspection is not enabled on this endpoint (field '{}')",
                field.name
            ))
            .extension_code("INTROSPECTION_DISABLED")
            .build())
    }
}
