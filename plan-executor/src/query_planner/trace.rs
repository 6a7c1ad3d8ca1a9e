//! FTv1 trace capture.
//!
//! Subgraphs that honor the `apollo-federation-include-trace: ftv1`
//! header return a base64-encoded protobuf trace under
//! `extensions.ftv1`. The decoded payloads are grafted onto the proto
//! tree that mirrors the executed plan.

use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use prost::Message;

use super::fetch::OperationKind;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::proto::reports::trace::query_plan_node::response_path_element;
use crate::proto::reports::trace::query_plan_node::ResponsePathElement;
use crate::proto::reports::Trace;

/// Decode the `extensions.ftv1` payload of a subgraph response, if any.
///
/// Returns the decoded trace and whether decoding was attempted but
/// failed. A failure is not a hard error: the fetch result stands, only
/// `trace_parsing_failed` is reported.
pub(crate) fn decode_ftv1(
    extension: Option<&Value>,
    operation_kind: OperationKind,
) -> (Option<Trace>, bool) {
    let encoded = match extension.and_then(|value| value.as_str()) {
        Some(encoded) => encoded,
        None => return (None, false),
    };
    let decoded = BASE64_STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| Trace::decode(bytes.as_slice()).ok());
    match decoded {
        Some(mut trace) => {
            // subgraphs report their own root type names; the merged trace
            // must speak in terms of the supergraph's root operation type
            if let Some(root) = trace.root.as_mut() {
                for child in root.child.iter_mut() {
                    child.parent_type = operation_kind.default_type_name().to_string();
                }
            }
            (Some(trace), false)
        }
        None => (None, true),
    }
}

/// Convert a plan path to the proto representation used on flatten trace
/// nodes. The `@` element has no proto counterpart and is carried as a
/// literal field name.
pub(crate) fn response_path(path: &Path) -> Vec<ResponsePathElement> {
    path.iter()
        .map(|element| ResponsePathElement {
            id: Some(match element {
                PathElement::Index(index) => {
                    response_path_element::Id::Index(*index as u32)
                }
                PathElement::Key(key) => response_path_element::Id::FieldName(key.clone()),
                PathElement::Flatten => response_path_element::Id::FieldName("@".to_string()),
                PathElement::Fragment(name) => {
                    response_path_element::Id::FieldName(format!("... on {name}"))
                }
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::proto::reports::trace;

    fn encoded_subgraph_trace() -> String {
        let trace = Trace {
            duration_ns: 1234,
            root: Some(Box::new(trace::Node {
                child: vec![trace::Node {
                    parent_type: "SubgraphQuery".to_string(),
                    r#type: "User".to_string(),
                    id: Some(trace::node::Id::ResponseName("me".to_string())),
                    ..Default::default()
                }],
                ..Default::default()
            })),
            ..Default::default()
        };
        BASE64_STANDARD.encode(trace.encode_to_vec())
    }

    #[test]
    fn test_decode_overrides_root_child_parent_type() {
        let payload = json!(encoded_subgraph_trace());
        let (decoded, failed) = decode_ftv1(Some(&payload), OperationKind::Query);
        assert!(!failed);
        let decoded = decoded.expect("trace decodes");
        assert_eq!(decoded.duration_ns, 1234);
        assert_eq!(decoded.root.unwrap().child[0].parent_type, "Query");
    }

    #[test]
    fn test_decode_failure_is_flagged() {
        let payload = json!("not base64!!");
        let (decoded, failed) = decode_ftv1(Some(&payload), OperationKind::Query);
        assert!(decoded.is_none());
        assert!(failed);
    }

    #[test]
    fn test_missing_payload_is_not_a_failure() {
        let (decoded, failed) = decode_ftv1(None, OperationKind::Query);
        assert!(decoded.is_none());
        assert!(!failed);
    }

    #[test]
    fn test_response_path_conversion() {
        let elements = response_path(&Path::from("users/@/3"));
        assert_eq!(
            elements[0].id,
            Some(response_path_element::Id::FieldName("users".to_string()))
        );
        assert_eq!(
            elements[1].id,
            Some(response_path_element::Id::FieldName("@".to_string()))
        );
        assert_eq!(elements[2].id, Some(response_path_element::Id::Index(3)));
    }
}
