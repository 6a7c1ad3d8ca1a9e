use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::Value;

use crate::graphql::Error;
use crate::json_ext::Object;

/// A GraphQL `Response` as returned by a subgraph, and as assembled for
/// the client once the plan completes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// The response data. Absent and `null` are distinct: an absent key
    /// means execution did not produce a tree at all.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The errors raised on this response.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,

    /// The extensions of this response.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Response {
    /// Returns a new builder for [`Response`].
    #[builder(visibility = "pub")]
    fn new(
        data: Option<Value>,
        errors: Vec<Error>,
        extensions: Option<Object>,
    ) -> Self {
        Self {
            data,
            errors,
            extensions: extensions.unwrap_or_default(),
        }
    }
}
