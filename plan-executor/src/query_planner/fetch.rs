//! Fetching data from subgraphs and merging it back into the results.

use std::fmt::Display;
use std::sync::Arc;
use std::time::SystemTime;

use apollo_compiler::ast;
use indexmap::IndexSet;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde::Serialize;
use tower::ServiceExt;
use tracing::instrument;
use tracing::Instrument;

use super::execution::ExecutionParameters;
use super::log;
use super::rewrites;
use super::selection::execute_selection_set;
use super::selection::Selection;
use super::trace;
use crate::context::Context;
use crate::error::FetchError;
use crate::graphql;
use crate::graphql::Request;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::json_ext::TYPENAME;
use crate::proto::reports::trace::query_plan_node as proto;
use crate::services::SubgraphRequest;
use crate::services::SubgraphServiceFactory;
use crate::services::FEDERATION_INCLUDE_TRACE_HEADER;
use crate::services::FTV1_TRACE_FORMAT;
use crate::spec::Schema;

/// The name of the variable representations are sent under, reserved by
/// the entity fetch protocol.
pub(crate) const REPRESENTATIONS: &str = "representations";

const ENTITIES: &str = "_entities";

/// GraphQL operation type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.default_type_name())
    }
}

impl OperationKind {
    /// The canonical name of the root operation type.
    pub(crate) const fn default_type_name(&self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }
}

/// A fetch node.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchNode {
    /// The name of the service or subgraph that the fetch is querying.
    pub service_name: Arc<str>,

    /// The data that is required for the subgraph fetch.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub requires: Vec<Selection>,

    /// The variables that are used for the subgraph fetch.
    pub variable_usages: Vec<Arc<str>>,

    /// The GraphQL subquery that is used for the fetch.
    pub operation: SubgraphOperation,

    /// The GraphQL subquery operation name.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub operation_name: Option<Arc<str>>,

    /// The GraphQL operation kind that is used for the fetch.
    pub operation_kind: OperationKind,

    /// Rewrites to apply to the data that is sent as input of this fetch.
    #[serde(default)]
    pub input_rewrites: Option<Vec<rewrites::DataRewrite>>,

    /// Rewrites to apply to the data received from this fetch, before it
    /// is merged into the in-memory results.
    #[serde(default)]
    pub output_rewrites: Option<Vec<rewrites::DataRewrite>>,
}

/// The operation sent by a fetch, kept in both its serialized and parsed
/// representations. At least one of the two is initialized at
/// construction; the other is derived on demand.
#[derive(Clone)]
pub struct SubgraphOperation {
    serialized: OnceCell<String>,
    parsed: OnceCell<Arc<ast::Document>>,
}

impl SubgraphOperation {
    pub fn from_string(serialized: impl Into<String>) -> Self {
        Self {
            serialized: OnceCell::from(serialized.into()),
            parsed: OnceCell::new(),
        }
    }

    pub fn from_parsed(parsed: impl Into<Arc<ast::Document>>) -> Self {
        Self {
            serialized: OnceCell::new(),
            parsed: OnceCell::from(parsed.into()),
        }
    }

    pub fn as_serialized(&self) -> &str {
        self.serialized.get_or_init(|| {
            self.parsed
                .get()
                .expect("SubgraphOperation has neither representation initialized")
                .to_string()
        })
    }

    pub fn as_parsed(&self) -> &Arc<ast::Document> {
        self.parsed.get_or_init(|| {
            let serialized = self
                .serialized
                .get()
                .expect("SubgraphOperation has neither representation initialized");
            // the planner emits valid operations; a parse error still
            // yields a partial document to hand to the data source
            Arc::new(
                ast::Document::parse(serialized.clone(), "operation.graphql")
                    .unwrap_or_else(|invalid| invalid.partial),
            )
        })
    }
}

impl Serialize for SubgraphOperation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.as_serialized().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SubgraphOperation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self::from_string(String::deserialize(deserializer)?))
    }
}

impl PartialEq for SubgraphOperation {
    fn eq(&self, other: &Self) -> bool {
        self.as_serialized() == other.as_serialized()
    }
}

impl std::fmt::Debug for SubgraphOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self.as_serialized(), f)
    }
}

impl Display for SubgraphOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.as_serialized(), f)
    }
}

/// The outgoing variables of one fetch, along with the bookkeeping needed
/// to merge returned entities and hydrate their error paths.
pub(crate) struct Variables {
    pub(crate) variables: Object,

    /// For representation `i`, the concrete paths of the entities it was
    /// extracted from. Identical representations are sent once and merged
    /// back everywhere they came from.
    pub(crate) inverted_paths: Vec<Vec<Path>>,

    /// For representation `i`, the `__typename` it was sent with. Output
    /// rewrites are filtered against it when the returned entity comes
    /// back without a `__typename` of its own.
    pub(crate) representation_typenames: Vec<Option<String>>,
}

impl Variables {
    #[instrument(skip_all, level = "debug", name = "make_variables")]
    pub(super) fn new(
        requires: &[Selection],
        variable_usages: &[Arc<str>],
        data: &Value,
        current_dir: &Path,
        request: &Arc<http::Request<Request>>,
        schema: &Schema,
        input_rewrites: &Option<Vec<rewrites::DataRewrite>>,
    ) -> Result<Option<Variables>, FetchError> {
        let body = request.body();
        let mut variables = Object::with_capacity(1 + variable_usages.len());
        variables.extend(variable_usages.iter().filter_map(|key| {
            body.variables
                .get_key_value(key.as_ref())
                .map(|(variable_key, value)| (variable_key.clone(), value.clone()))
        }));

        if !requires.is_empty() {
            if variables.contains_key(REPRESENTATIONS) {
                return Err(FetchError::ForbiddenRepresentationsVariable);
            }

            let pending_rewrites = rewrites::pending_input_rewrites(input_rewrites);
            let mut inverted_paths: Vec<Vec<Path>> = Vec::new();
            let mut representation_typenames: Vec<Option<String>> = Vec::new();
            let mut values: IndexSet<Value> = IndexSet::new();

            data.select_values_and_paths(schema, current_dir, |path, value| {
                if value.is_null() {
                    return;
                }
                let representation =
                    execute_selection_set(value, requires, schema, &pending_rewrites);
                // an entity is only sent when its representation carries a
                // __typename; anything else was nullified by an earlier
                // fetch and is dropped without a duplicate error
                let typename = representation
                    .as_object()
                    .and_then(|object| object.get(TYPENAME))
                    .and_then(|typename| typename.as_str())
                    .map(str::to_owned);
                if typename.is_none() {
                    return;
                }
                match values.get_index_of(&representation) {
                    Some(index) => {
                        inverted_paths[index].push(path.clone());
                    }
                    None => {
                        inverted_paths.push(vec![path.clone()]);
                        representation_typenames.push(typename);
                        values.insert(representation);
                        debug_assert!(inverted_paths.len() == values.len());
                    }
                }
            });

            if values.is_empty() {
                return Ok(None);
            }

            variables.insert(REPRESENTATIONS, Value::Array(Vec::from_iter(values)));
            Ok(Some(Variables {
                variables,
                inverted_paths,
                representation_typenames,
            }))
        } else {
            // a fetch below the root whose cursor resolved to nothing but
            // nulls means an earlier fetch nullified this subtree; there
            // is nothing to attach a response to
            if !current_dir.is_empty() {
                let mut has_data = false;
                data.select_values_and_paths(schema, current_dir, |_path, value| {
                    if !value.is_null() {
                        has_data = true;
                    }
                });
                if !has_data {
                    return Ok(None);
                }
            }
            Ok(Some(Variables {
                variables,
                inverted_paths: Vec::new(),
                representation_typenames: Vec::new(),
            }))
        }
    }
}

impl FetchNode {
    pub(crate) async fn fetch_node<'a, SF>(
        &'a self,
        parameters: &'a ExecutionParameters<'a, SF>,
        data: &'a Value,
        current_dir: &'a Path,
    ) -> Result<(Value, Vec<graphql::Error>, proto::FetchNode), FetchError>
    where
        SF: SubgraphServiceFactory,
    {
        let FetchNode {
            operation,
            operation_kind,
            operation_name,
            service_name,
            ..
        } = self;

        let mut trace_node = proto::FetchNode {
            service_name: service_name.to_string(),
            ..Default::default()
        };

        let Variables {
            variables,
            inverted_paths,
            representation_typenames,
        } = match Variables::new(
            &self.requires,
            &self.variable_usages,
            data,
            current_dir,
            parameters.supergraph_request,
            parameters.schema,
            &self.input_rewrites,
        )? {
            Some(variables) => variables,
            None => {
                return Ok((Value::Object(Object::default()), Vec::new(), trace_node));
            }
        };

        let service = parameters
            .service_factory
            .create(service_name.as_ref())
            .ok_or_else(|| FetchError::UnknownService {
                service: service_name.to_string(),
            })?;

        let mut request_builder = http::Request::builder().method(http::Method::POST);
        if parameters.options.capture_traces {
            request_builder =
                request_builder.header(FEDERATION_INCLUDE_TRACE_HEADER, FTV1_TRACE_FORMAT);
        }
        let subgraph_request = SubgraphRequest::builder()
            .subgraph_request(
                request_builder
                    .body(
                        Request::builder()
                            .query(operation.as_serialized().to_string())
                            .and_operation_name(
                                operation_name.as_ref().map(|name| name.to_string()),
                            )
                            .variables(variables.clone())
                            .build(),
                    )
                    .expect("building a request with a static header cannot fail; qed"),
            )
            .subgraph_name(service_name.to_string())
            .operation_kind(*operation_kind)
            .document(operation.as_parsed().clone())
            .context(parameters.context.clone())
            .build();

        if parameters.options.capture_traces {
            trace_node.sent_time_offset =
                parameters.context.created_at.elapsed().as_nanos() as u64;
            trace_node.sent_time = Some(SystemTime::now().into());
        }

        let response = tokio::select! {
            _ = parameters.context.cancelled() => {
                // a cancelled fetch surfaces nothing of its own; data
                // merged by earlier nodes is retained
                return Ok((Value::default(), Vec::new(), trace_node));
            }
            response = service
                .oneshot(subgraph_request)
                .instrument(tracing::trace_span!("subfetch_stream")) => response,
        };

        if parameters.options.capture_traces {
            trace_node.received_time = Some(SystemTime::now().into());
        }

        let response = match response {
            Err(error) => {
                let error = FetchError::SubrequestHttpError {
                    service: service_name.to_string(),
                    reason: error.to_string(),
                };
                return Ok((
                    Value::default(),
                    vec![error.to_graphql_error(
                        (!current_dir.is_empty()).then(|| current_dir.concrete_ancestor()),
                    )],
                    trace_node,
                ));
            }
            Ok(response) => response.response.into_body(),
        };

        log::trace_subfetch(service_name, operation.as_serialized(), &variables, &response);

        let has_ftv1_trace = response.extensions.get("ftv1").is_some();
        if parameters.options.capture_traces {
            let (decoded, failed) =
                trace::decode_ftv1(response.extensions.get("ftv1"), *operation_kind);
            trace_node.trace = decoded;
            trace_node.trace_parsing_failed = failed;
        }

        let (value, errors) = match self.response_at_path(
            parameters.schema,
            parameters.context,
            data,
            current_dir,
            inverted_paths,
            representation_typenames,
            response,
            has_ftv1_trace,
        ) {
            Ok(merged) => merged,
            Err(error) => (
                Value::default(),
                vec![error.to_graphql_error(
                    (!current_dir.is_empty()).then(|| current_dir.concrete_ancestor()),
                )],
            ),
        };
        Ok((value, errors, trace_node))
    }

    /// Place a subgraph response at the position the cursor designates,
    /// hydrating error paths along the way.
    #[instrument(skip_all, level = "debug", name = "response_insert")]
    #[allow(clippy::too_many_arguments)]
    fn response_at_path(
        &self,
        schema: &Schema,
        context: &Context,
        data: &Value,
        current_dir: &Path,
        inverted_paths: Vec<Vec<Path>>,
        representation_typenames: Vec<Option<String>>,
        response: graphql::Response,
        has_ftv1_trace: bool,
    ) -> Result<(Value, Vec<graphql::Error>), FetchError> {
        if !self.requires.is_empty() {
            let errors =
                self.hydrate_entity_errors(context, current_dir, &inverted_paths, response.errors, has_ftv1_trace);

            let entities = match response
                .data
                .and_then(|data| match data {
                    Value::Object(mut object) => object.remove(ENTITIES),
                    _ => None,
                }) {
                Some(Value::Array(entities)) => entities,
                _ => {
                    // a subgraph that failed outright reports its own
                    // errors instead of an entities array
                    if !errors.is_empty() {
                        return Ok((Value::Null, errors));
                    }
                    return Err(FetchError::ExpectedEntitiesArray {
                        service: self.service_name.to_string(),
                    });
                }
            };

            if entities.len() != inverted_paths.len() {
                return Err(FetchError::EntityCountMismatch {
                    service: self.service_name.to_string(),
                    expected: inverted_paths.len(),
                    received: entities.len(),
                });
            }

            let mut value = Value::default();
            for (index, mut entity) in entities.into_iter().enumerate() {
                let entity_rewrites = rewrites::rewrites_for_entity(
                    schema,
                    representation_typenames
                        .get(index)
                        .and_then(|typename| typename.as_deref()),
                    &self.output_rewrites,
                );
                rewrites::apply_rewrites(schema, &mut entity, &entity_rewrites);

                if let Some(paths) = inverted_paths.get(index) {
                    if paths.len() > 1 {
                        for path in &paths[1..] {
                            let _ = value.insert(path, entity.clone());
                        }
                    }
                    if let Some(path) = paths.first() {
                        let _ = value.insert(path, entity);
                    }
                }
            }
            Ok((value, errors))
        } else {
            // errors of a root fetch are reported against the cursor
            // position, kept concrete
            let base = current_dir.concrete_ancestor();

            let errors: Vec<graphql::Error> = response
                .errors
                .into_iter()
                .map(|mut error| {
                    // the locations refer to the subgraph operation and
                    // mean nothing against the client document
                    error.locations = Vec::new();
                    let path = error.path.as_ref().map(|path| {
                        Path(base.0.iter().chain(path.0.iter()).cloned().collect())
                    });
                    let error = self.brand_subgraph_error(error, path);
                    if !has_ftv1_trace {
                        context
                            .metrics()
                            .record_error_path(&self.service_name, error.path.as_ref());
                    }
                    error
                })
                .collect();

            let mut response_data = response.data.unwrap_or_default();
            rewrites::apply_rewrites(schema, &mut response_data, &self.output_rewrites);

            if current_dir.is_empty() {
                return Ok((response_data, errors));
            }
            let mut paths = Vec::new();
            data.select_values_and_paths(schema, current_dir, |path, value| {
                if !value.is_null() {
                    paths.push(path.clone());
                }
            });
            let mut value = Value::default();
            for path in paths {
                let _ = value.insert(&path, response_data.clone());
            }
            Ok((value, errors))
        }
    }

    /// Translate the error paths of an entity fetch back into paths into
    /// the client response.
    ///
    /// A subgraph reports entity errors under `[_entities, i, ...rest]`
    /// where `i` indexes the representations that were sent; the hydrated
    /// path is the source entity's concrete path followed by `rest`.
    fn hydrate_entity_errors(
        &self,
        context: &Context,
        current_dir: &Path,
        inverted_paths: &[Vec<Path>],
        response_errors: Vec<graphql::Error>,
        has_ftv1_trace: bool,
    ) -> Vec<graphql::Error> {
        let mut errors = Vec::new();
        let mut push = |error: graphql::Error| {
            if !has_ftv1_trace {
                context
                    .metrics()
                    .record_error_path(&self.service_name, error.path.as_ref());
            }
            errors.push(error);
        };

        for mut error in response_errors {
            // the locations refer to the subgraph operation and mean
            // nothing against the client document
            error.locations = Vec::new();

            match error.path.take() {
                None => push(self.brand_subgraph_error(error, None)),
                Some(path) if path.is_empty() => push(self.brand_subgraph_error(error, None)),
                Some(path)
                    if matches!(path.0.first(), Some(PathElement::Key(key)) if key == ENTITIES) =>
                {
                    match path.0.get(1) {
                        Some(PathElement::Index(index)) => {
                            for entity_path in
                                inverted_paths.get(*index).iter().flat_map(|paths| paths.iter())
                            {
                                let hydrated = Path(
                                    entity_path.0.iter().chain(&path.0[2..]).cloned().collect(),
                                );
                                push(self.brand_subgraph_error(error.clone(), Some(hydrated)));
                            }
                        }
                        _ => push(self.brand_subgraph_error(
                            error,
                            Some(current_dir.concrete_ancestor()),
                        )),
                    }
                }
                Some(_) => push(
                    self.brand_subgraph_error(error, Some(current_dir.concrete_ancestor())),
                ),
            }
        }
        errors
    }

    /// Mark an error as coming from this fetch's subgraph: stamp the
    /// service name, and default the code when the subgraph did not set
    /// one.
    fn brand_subgraph_error(
        &self,
        mut error: graphql::Error,
        path: Option<Path>,
    ) -> graphql::Error {
        error.path = path;
        error
            .extensions
            .entry("code")
            .or_insert_with(|| Value::from("DOWNSTREAM_SERVICE_ERROR"));
        error
            .extensions
            .insert("serviceName", Value::from(self.service_name.as_ref()));
        error
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::query_planner::selection::Field;
    use crate::query_planner::selection::InlineFragment;

    fn requires() -> Vec<Selection> {
        vec![Selection::InlineFragment(InlineFragment {
            type_condition: Some("User".to_string()),
            selections: vec![
                Selection::Field(Field {
                    alias: None,
                    name: "__typename".to_string(),
                    selections: None,
                }),
                Selection::Field(Field {
                    alias: None,
                    name: "id".to_string(),
                    selections: None,
                }),
            ],
        })]
    }

    fn request(variables: Object) -> Arc<http::Request<Request>> {
        Arc::new(http::Request::new(
            Request::builder().variables(variables).build(),
        ))
    }

    #[test]
    fn test_identical_representations_are_sent_once() {
        let data = json!({"users": [
            {"__typename": "User", "id": "1"},
            {"__typename": "User", "id": "1"},
            {"__typename": "User", "id": "2"},
        ]});
        let variables = Variables::new(
            &requires(),
            &[],
            &data,
            &Path::from("users/@"),
            &request(Object::default()),
            &Schema::for_tests(),
            &None,
        )
        .unwrap()
        .expect("some representations were produced");

        assert_eq!(
            variables.variables.get(REPRESENTATIONS),
            Some(&json!([
                {"__typename": "User", "id": "1"},
                {"__typename": "User", "id": "2"},
            ]))
        );
        assert_eq!(
            variables.inverted_paths,
            vec![
                vec![Path::from("users/0"), Path::from("users/1")],
                vec![Path::from("users/2")],
            ]
        );
        assert_eq!(
            variables.representation_typenames,
            vec![Some("User".to_string()), Some("User".to_string())]
        );
    }

    #[test]
    fn test_entities_without_requirements_are_dropped() {
        let data = json!({"users": [
            {"__typename": "User", "id": "1"},
            {"__typename": "User"},
            null,
        ]});
        let variables = Variables::new(
            &requires(),
            &[],
            &data,
            &Path::from("users/@"),
            &request(Object::default()),
            &Schema::for_tests(),
            &None,
        )
        .unwrap()
        .expect("one representation was produced");

        assert_eq!(
            variables.variables.get(REPRESENTATIONS),
            Some(&json!([{"__typename": "User", "id": "1"}]))
        );
        assert_eq!(variables.inverted_paths, vec![vec![Path::from("users/0")]]);
    }

    #[test]
    fn test_no_viable_entity_aborts_the_fetch() {
        let data = json!({"users": [null, null]});
        let variables = Variables::new(
            &requires(),
            &[],
            &data,
            &Path::from("users/@"),
            &request(Object::default()),
            &Schema::for_tests(),
            &None,
        )
        .unwrap();
        assert!(variables.is_none());
    }

    #[test]
    fn test_forbidden_representations_variable() {
        let mut request_variables = Object::default();
        request_variables.insert(REPRESENTATIONS, json!([]));
        let result = Variables::new(
            &requires(),
            &[Arc::from(REPRESENTATIONS)],
            &json!({"users": [{"__typename": "User", "id": "1"}]}),
            &Path::from("users/@"),
            &request(request_variables),
            &Schema::for_tests(),
            &None,
        );
        assert!(matches!(
            result,
            Err(FetchError::ForbiddenRepresentationsVariable)
        ));
    }

    #[test]
    fn test_nullified_subtree_aborts_a_root_fetch() {
        let variables = Variables::new(
            &[],
            &[],
            &json!({"me": null}),
            &Path::from("me"),
            &request(Object::default()),
            &Schema::for_tests(),
            &None,
        )
        .unwrap();
        assert!(variables.is_none());
    }
}
