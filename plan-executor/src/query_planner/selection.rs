//! Extraction of entity representations from the in-memory results.

use serde::Deserialize;
use serde::Serialize;

use super::rewrites::update_rewrites_for_field;
use super::rewrites::update_rewrites_for_fragment;
use super::rewrites::PendingRewrite;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::json_ext::TYPENAME;
use crate::spec::Schema;

/// A selection that is part of a fetch.
/// Selections are used to propagate data to subgraph fetches.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", tag = "kind")]
pub enum Selection {
    /// A field selection.
    Field(Field),

    /// An inline fragment selection.
    InlineFragment(InlineFragment),
}

/// The field that is used
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// An optional alias for the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// The name of the field.
    pub name: String,

    /// The selections for the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selections: Option<Vec<Selection>>,
}

impl Field {
    pub fn response_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// An inline fragment.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFragment {
    /// The required fragment type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_condition: Option<String>,

    /// The selections from the fragment.
    pub selections: Vec<Selection>,
}

/// Build the representation object for one entity out of `content`.
///
/// Returns `Value::Null` when the entity cannot be sent: a selected field
/// that is absent from `content` means an earlier fetch nullified this
/// entity, and it must be dropped from the request without raising a
/// duplicate error.
pub(crate) fn execute_selection_set(
    content: &Value,
    selections: &[Selection],
    schema: &Schema,
    pending_rewrites: &[PendingRewrite<'_>],
) -> Value {
    let src = match content.as_object() {
        Some(src) => src,
        None => return Value::Null,
    };

    let mut result = Object::default();
    for selection in selections {
        match selection {
            Selection::Field(field) => {
                let response_name = field.response_name();
                let (scoped_rewrites, completed) =
                    update_rewrites_for_field(pending_rewrites, response_name);

                let value = match src.get(response_name) {
                    None => return Value::Null,
                    Some(value) => value,
                };

                if let Some(substitute) = completed {
                    result.insert(response_name, substitute.clone());
                    continue;
                }

                match &field.selections {
                    Some(selections) => {
                        result.insert(
                            response_name,
                            select_content(value, selections, schema, &scoped_rewrites),
                        );
                    }
                    None => {
                        result.insert(response_name, value.clone());
                    }
                }
            }
            Selection::InlineFragment(fragment) => {
                let condition = match &fragment.type_condition {
                    Some(condition) => condition,
                    None => continue,
                };
                let typename = match src.get(TYPENAME).and_then(|t| t.as_str()) {
                    Some(typename) => typename,
                    None => continue,
                };
                if schema.condition_matches(condition, typename) {
                    let scoped_rewrites =
                        update_rewrites_for_fragment(pending_rewrites, condition);
                    match execute_selection_set(
                        content,
                        &fragment.selections,
                        schema,
                        &scoped_rewrites,
                    ) {
                        // the fragment's required inputs are missing: the
                        // whole entity is unusable
                        Value::Null => return Value::Null,
                        value => {
                            let mut merged = Value::Object(std::mem::take(&mut result));
                            merged.deep_merge(value);
                            if let Value::Object(object) = merged {
                                result = object;
                            }
                        }
                    }
                }
            }
        }
    }
    Value::Object(result)
}

/// Recurse into a field value, mapping element-wise over arrays. Null
/// elements stay null; they are the subgraph's own holes, not ours.
fn select_content(
    value: &Value,
    selections: &[Selection],
    schema: &Schema,
    pending_rewrites: &[PendingRewrite<'_>],
) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| {
                    if item.is_null() {
                        Value::Null
                    } else {
                        execute_selection_set(item, selections, schema, pending_rewrites)
                    }
                })
                .collect(),
        ),
        Value::Null => Value::Null,
        value => execute_selection_set(value, selections, schema, pending_rewrites),
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::json_ext::Path;
    use crate::query_planner::rewrites::pending_input_rewrites;
    use crate::query_planner::rewrites::DataRewrite;
    use crate::query_planner::rewrites::DataValueSetter;

    fn schema() -> Schema {
        Schema::for_tests()
    }

    fn field(name: &str) -> Selection {
        Selection::Field(Field {
            alias: None,
            name: name.to_string(),
            selections: None,
        })
    }

    fn typed_requires(type_condition: &str, fields: &[&str]) -> Vec<Selection> {
        vec![Selection::InlineFragment(InlineFragment {
            type_condition: Some(type_condition.to_string()),
            selections: fields.iter().map(|name| field(name)).collect(),
        })]
    }

    #[test]
    fn test_extracts_representation() {
        let content = json!({"__typename": "User", "id": "1", "name": "Ada"});
        let requires = typed_requires("User", &["__typename", "id"]);
        assert_eq!(
            execute_selection_set(&content, &requires, &schema(), &[]),
            json!({"__typename": "User", "id": "1"}),
        );
    }

    #[test]
    fn test_missing_field_drops_entity() {
        let content = json!({"__typename": "User"});
        let requires = typed_requires("User", &["__typename", "id"]);
        assert_eq!(
            execute_selection_set(&content, &requires, &schema(), &[]),
            Value::Null,
        );
    }

    #[test]
    fn test_null_content_drops_entity() {
        let requires = typed_requires("User", &["__typename", "id"]);
        assert_eq!(
            execute_selection_set(&Value::Null, &requires, &schema(), &[]),
            Value::Null,
        );
    }

    #[test]
    fn test_unmatched_condition_yields_empty_object() {
        let content = json!({"__typename": "Review", "id": "1"});
        let requires = typed_requires("User", &["__typename", "id"]);
        // no selection applied; the caller drops it for lacking __typename
        assert_eq!(
            execute_selection_set(&content, &requires, &schema(), &[]),
            json!({}),
        );
    }

    #[test]
    fn test_abstract_condition_matches_subtype() {
        let content = json!({"__typename": "User", "id": "1"});
        let requires = typed_requires("Node", &["__typename", "id"]);
        assert_eq!(
            execute_selection_set(&content, &requires, &schema(), &[]),
            json!({"__typename": "User", "id": "1"}),
        );
    }

    #[test]
    fn test_aliased_field_uses_response_name() {
        let content = json!({"userId": "1", "__typename": "User"});
        let requires = vec![
            field("__typename"),
            Selection::Field(Field {
                alias: Some("userId".to_string()),
                name: "id".to_string(),
                selections: None,
            }),
        ];
        assert_eq!(
            execute_selection_set(&content, &requires, &schema(), &[]),
            json!({"__typename": "User", "userId": "1"}),
        );
    }

    #[test]
    fn test_arrays_map_element_wise() {
        let content = json!({
            "__typename": "User",
            "reviews": [{"body": "good"}, null, {"body": "bad"}],
        });
        let requires = vec![
            field("__typename"),
            Selection::Field(Field {
                alias: None,
                name: "reviews".to_string(),
                selections: Some(vec![field("body")]),
            }),
        ];
        assert_eq!(
            execute_selection_set(&content, &requires, &schema(), &[]),
            json!({
                "__typename": "User",
                "reviews": [{"body": "good"}, null, {"body": "bad"}],
            }),
        );
    }

    #[test]
    fn test_complete_input_rewrite_substitutes_value() {
        // the interface-object case: the representation must claim the
        // interface type, not the concrete runtime type
        let content = json!({"__typename": "User", "id": "1"});
        let requires = typed_requires("Node", &["__typename", "id"]);
        let input_rewrites = Some(vec![DataRewrite::ValueSetter(DataValueSetter {
            path: Path::from("... on Node/__typename"),
            set_value_to: json!("Node"),
        })]);
        let pending = pending_input_rewrites(&input_rewrites);
        assert_eq!(
            execute_selection_set(&content, &requires, &schema(), &pending),
            json!({"__typename": "Node", "id": "1"}),
        );
    }
}
