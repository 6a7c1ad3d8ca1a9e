//! Shaping of the merged results against the client operation.
//!
//! Fetches pull in more than the client asked for: `__typename` for
//! fragment dispatch, key fields for entity joins, requires-selections
//! for computed fields. The unfiltered tree is therefore never shown to
//! the client directly; it is walked against the client operation and
//! only the selected parts are kept.

use std::sync::Arc;

use apollo_compiler::executable;
use apollo_compiler::validation::Valid;
use apollo_compiler::ExecutableDocument;

use crate::graphql;
use crate::introspection::IntrospectionHandler;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::TYPENAME;
use crate::spec::Schema;

/// The client operation a plan was produced for.
pub struct Query {
    document: Arc<Valid<ExecutableDocument>>,
    operation_name: Option<String>,
}

impl Query {
    pub fn new(
        document: impl Into<Arc<Valid<ExecutableDocument>>>,
        operation_name: Option<String>,
    ) -> Self {
        Self {
            document: document.into(),
            operation_name,
        }
    }

    /// Parse and validate a client operation against the API schema.
    pub fn parse(
        query: &str,
        operation_name: Option<&str>,
        schema: &Schema,
    ) -> Result<Self, graphql::Error> {
        let document =
            ExecutableDocument::parse_and_validate(schema.api_schema(), query, "query.graphql")
                .map_err(|e| {
                    graphql::Error::builder()
                        .message(e.errors.to_string())
                        .extension_code("GRAPHQL_VALIDATION_FAILED")
                        .build()
                })?;
        Ok(Self::new(document, operation_name.map(str::to_owned)))
    }

    /// Shape the unfiltered result tree into the client-visible data.
    ///
    /// Produces its own error list; the caller decides whether those
    /// errors reach the envelope.
    pub(crate) fn format_response(
        &self,
        data: &Value,
        schema: &Schema,
        introspection: &dyn IntrospectionHandler,
    ) -> Result<(Value, Vec<graphql::Error>), PostProcessingError> {
        let operation = self
            .document
            .operations
            .get(self.operation_name.as_deref())
            .map_err(|_| {
                PostProcessingError::GraphQL(
                    graphql::Error::builder()
                        .message(match &self.operation_name {
                            Some(name) => format!("unknown operation named \"{name}\""),
                            None => "an operation name is required when the document contains \
                                     several operations"
                                .to_string(),
                        })
                        .extension_code("GRAPHQL_VALIDATION_FAILED")
                        .build(),
                )
            })?;

        let input = match data {
            Value::Null => Object::default(),
            Value::Object(object) => object.clone(),
            _ => {
                return Err(PostProcessingError::Internal(
                    "the response root is not an object".to_string(),
                ));
            }
        };

        let mut shaper = Shaper {
            schema,
            document: &self.document,
            introspection,
            errors: Vec::new(),
        };
        let mut output = Object::default();
        shaper.format_selection_set(
            &operation.selection_set,
            &input,
            &mut output,
            &mut Path::empty(),
            true,
        );
        Ok((Value::Object(output), shaper.errors))
    }
}

/// A failure that escaped response shaping entirely.
#[derive(Debug)]
pub(crate) enum PostProcessingError {
    /// A structured GraphQL failure: its message is safe to surface.
    GraphQL(graphql::Error),
    /// Anything else: surfaced with a generic message only.
    Internal(String),
}

impl PostProcessingError {
    pub(crate) fn into_graphql_error(self) -> graphql::Error {
        match self {
            PostProcessingError::GraphQL(error) => error,
            PostProcessingError::Internal(reason) => {
                tracing::error!("response post-processing failed: {reason}");
                graphql::Error::builder()
                    .message("internal error during response post-processing")
                    .extension_code("UNEXPECTED_EXECUTOR_ERROR")
                    .build()
            }
        }
    }
}

struct Shaper<'a> {
    schema: &'a Schema,
    document: &'a Valid<ExecutableDocument>,
    introspection: &'a dyn IntrospectionHandler,
    errors: Vec<graphql::Error>,
}

impl Shaper<'_> {
    fn format_selection_set(
        &mut self,
        selection_set: &executable::SelectionSet,
        input: &Object,
        output: &mut Object,
        path: &mut Path,
        is_root: bool,
    ) {
        for selection in &selection_set.selections {
            match selection {
                executable::Selection::Field(field) => {
                    self.format_field(field, selection_set.ty.as_str(), input, output, path, is_root);
                }
                executable::Selection::InlineFragment(fragment) => {
                    let applies = match &fragment.type_condition {
                        None => true,
                        Some(condition) => self.fragment_matches(
                            condition.as_str(),
                            input,
                            selection_set.ty.as_str(),
                        ),
                    };
                    if applies {
                        self.format_selection_set(
                            &fragment.selection_set,
                            input,
                            output,
                            path,
                            is_root,
                        );
                    }
                }
                executable::Selection::FragmentSpread(spread) => {
                    if let Some(fragment) = self.document.fragments.get(&spread.fragment_name) {
                        if self.fragment_matches(
                            fragment.type_condition().as_str(),
                            input,
                            selection_set.ty.as_str(),
                        ) {
                            self.format_selection_set(
                                &fragment.selection_set,
                                input,
                                output,
                                path,
                                is_root,
                            );
                        }
                    }
                }
            }
        }
    }

    fn format_field(
        &mut self,
        field: &executable::Field,
        parent_type: &str,
        input: &Object,
        output: &mut Object,
        path: &mut Path,
        is_root: bool,
    ) {
        let response_key = field.response_key().as_str();

        if field.name.as_str() == TYPENAME {
            let typename = input
                .get(TYPENAME)
                .filter(|value| value.is_string())
                .cloned()
                .unwrap_or_else(|| Value::from(parent_type));
            output.insert(response_key, typename);
            return;
        }

        if is_root && matches!(field.name.as_str(), "__schema" | "__type") {
            match self
                .introspection
                .resolve(self.schema.api_schema(), field)
            {
                Ok(value) => {
                    output.insert(response_key, value);
                }
                Err(mut error) => {
                    error.path = Some(Path(vec![PathElement::Key(response_key.to_string())]));
                    self.errors.push(error);
                    output.insert(response_key, Value::Null);
                }
            }
            return;
        }

        path.push(PathElement::Key(response_key.to_string()));
        let formatted = match input.get(response_key) {
            None | Some(Value::Null) => Value::Null,
            Some(value) => self.format_value(value, &field.selection_set, path),
        };
        path.0.pop();
        output.insert(response_key, formatted);
    }

    fn format_value(
        &mut self,
        value: &Value,
        selection_set: &executable::SelectionSet,
        path: &mut Path,
    ) -> Value {
        if selection_set.selections.is_empty() {
            return value.clone();
        }
        match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        path.push(PathElement::Index(index));
                        let formatted = self.format_value(item, selection_set, path);
                        path.0.pop();
                        formatted
                    })
                    .collect(),
            ),
            Value::Object(object) => {
                let mut output = Object::default();
                self.format_selection_set(selection_set, object, &mut output, path, false);
                Value::Object(output)
            }
            Value::Null => Value::Null,
            _ => {
                self.errors.push(
                    graphql::Error::builder()
                        .message(format!(
                            "expected an object for the selections on type '{}'",
                            selection_set.ty
                        ))
                        .path(path.clone())
                        .extension_code("RESPONSE_FORMATTING_FAILED")
                        .build(),
                );
                Value::Null
            }
        }
    }

    /// Whether a fragment applies to this node. The runtime `__typename`
    /// decides when it was fetched; otherwise the statically known type
    /// has to carry the decision.
    fn fragment_matches(&self, condition: &str, input: &Object, parent_type: &str) -> bool {
        match input.get(TYPENAME).and_then(|value| value.as_str()) {
            Some(typename) => {
                condition == typename
                    || self
                        .schema
                        .api_schema()
                        .is_subtype(condition, typename)
            }
            None => condition == parent_type,
        }
    }
}
