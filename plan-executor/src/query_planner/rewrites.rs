//! Rewrites of fetch data, applied around each subgraph call.
//!
//! Input rewrites are threaded through the representation walk in
//! [`super::selection`]; output rewrites are applied to the data a fetch
//! returned before it is merged into the in-memory results.

use serde::Deserialize;
use serde::Serialize;

use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::TYPENAME;
use crate::spec::Schema;

/// A rewrite described by the query plan.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", tag = "kind")]
pub enum DataRewrite {
    ValueSetter(DataValueSetter),
    KeyRenamer(DataKeyRenamer),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValueSetter {
    pub path: Path,
    pub set_value_to: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataKeyRenamer {
    pub path: Path,
    pub rename_key_to: String,
}

impl DataRewrite {
    fn path(&self) -> &Path {
        match self {
            DataRewrite::ValueSetter(setter) => &setter.path,
            DataRewrite::KeyRenamer(renamer) => &renamer.path,
        }
    }

    fn with_path(&self, path: Path) -> Self {
        match self {
            DataRewrite::ValueSetter(setter) => DataRewrite::ValueSetter(DataValueSetter {
                path,
                set_value_to: setter.set_value_to.clone(),
            }),
            DataRewrite::KeyRenamer(renamer) => DataRewrite::KeyRenamer(DataKeyRenamer {
                path,
                rename_key_to: renamer.rename_key_to.clone(),
            }),
        }
    }
}

/// An input rewrite whose path has been partially consumed by the
/// representation walk.
#[derive(Clone, Copy)]
pub(crate) struct PendingRewrite<'a> {
    setter: &'a DataValueSetter,
    position: usize,
}

/// The input rewrites of a fetch, ready to be threaded through the walk.
/// Only value setters participate: a key renamer makes no sense on the
/// way into a subgraph.
pub(crate) fn pending_input_rewrites(
    rewrites: &Option<Vec<DataRewrite>>,
) -> Vec<PendingRewrite<'_>> {
    rewrites
        .iter()
        .flatten()
        .filter_map(|rewrite| match rewrite {
            DataRewrite::ValueSetter(setter) => Some(PendingRewrite {
                setter,
                position: 0,
            }),
            DataRewrite::KeyRenamer(_) => None,
        })
        .collect()
}

/// Advance pending rewrites across a field step of the walk.
///
/// Returns the rewrites that continue below this field, and the
/// substitute value of a rewrite whose path ends exactly here, if any.
pub(crate) fn update_rewrites_for_field<'a>(
    pending: &[PendingRewrite<'a>],
    response_name: &str,
) -> (Vec<PendingRewrite<'a>>, Option<&'a Value>) {
    let mut advanced = Vec::new();
    let mut completed = None;
    for rewrite in pending {
        if let Some(PathElement::Key(key)) = rewrite.setter.path.0.get(rewrite.position) {
            if key == response_name {
                if rewrite.position + 1 == rewrite.setter.path.len() {
                    completed.get_or_insert(&rewrite.setter.set_value_to);
                } else {
                    advanced.push(PendingRewrite {
                        position: rewrite.position + 1,
                        ..*rewrite
                    });
                }
            }
        }
    }
    (advanced, completed)
}

/// Advance pending rewrites across a `... on T` step of the walk. Rewrites
/// whose next element is not that fragment do not pass through.
pub(crate) fn update_rewrites_for_fragment<'a>(
    pending: &[PendingRewrite<'a>],
    type_condition: &str,
) -> Vec<PendingRewrite<'a>> {
    pending
        .iter()
        .filter(|rewrite| {
            matches!(
                rewrite.setter.path.0.get(rewrite.position),
                Some(PathElement::Fragment(name)) if name == type_condition
            )
        })
        .map(|rewrite| PendingRewrite {
            position: rewrite.position + 1,
            ..*rewrite
        })
        .collect()
}

/// Apply rewrites to data returned by a fetch.
pub(crate) fn apply_rewrites(
    schema: &Schema,
    value: &mut Value,
    maybe_rewrites: &Option<Vec<DataRewrite>>,
) {
    for rewrite in maybe_rewrites.iter().flatten() {
        apply_single_rewrite(schema, value, rewrite);
    }
}

pub(crate) fn apply_single_rewrite(schema: &Schema, value: &mut Value, rewrite: &DataRewrite) {
    match rewrite {
        DataRewrite::KeyRenamer(renamer) => {
            if let Some((PathElement::Key(last), parent)) = renamer.path.0.split_last() {
                rewrite_at_path(schema, value, parent, &mut |object| {
                    if let Some(renamed) = object.remove(last.as_str()) {
                        object.insert(renamer.rename_key_to.as_str(), renamed);
                    }
                });
            }
        }
        DataRewrite::ValueSetter(setter) => {
            if let Some((PathElement::Key(last), parent)) = setter.path.0.split_last() {
                rewrite_at_path(schema, value, parent, &mut |object| {
                    object.insert(last.as_str(), setter.set_value_to.clone());
                });
            }
        }
    }
}

/// Restrict output rewrites to one returned entity.
///
/// The leading `... on T` of each rewrite path is matched against the
/// `__typename` that was sent in the representation (the returned entity
/// does not necessarily select it); matching rewrites continue with the
/// fragment stripped, others are dropped.
pub(crate) fn rewrites_for_entity(
    schema: &Schema,
    typename: Option<&str>,
    maybe_rewrites: &Option<Vec<DataRewrite>>,
) -> Option<Vec<DataRewrite>> {
    let rewrites = maybe_rewrites.as_ref()?;
    let filtered: Vec<DataRewrite> = rewrites
        .iter()
        .filter_map(|rewrite| match rewrite.path().0.first() {
            Some(PathElement::Fragment(condition)) => match typename {
                Some(typename) if schema.condition_matches(condition, typename) => {
                    Some(rewrite.with_path(Path(rewrite.path().0[1..].to_vec())))
                }
                _ => None,
            },
            _ => Some(rewrite.clone()),
        })
        .collect();
    (!filtered.is_empty()).then_some(filtered)
}

/// Walk `path` through `value` and call `f` on every object it reaches.
///
/// Arrays fan out at every step. A `... on T` step keeps a node whose
/// `__typename` satisfies the condition; a node that does not carry
/// `__typename` at all is searched through its members instead, so that
/// type-scoped rewrites find their targets under unselected parents.
fn rewrite_at_path(
    schema: &Schema,
    value: &mut Value,
    path: &[PathElement],
    f: &mut dyn FnMut(&mut Object),
) {
    if let Value::Array(items) = value {
        for item in items.iter_mut() {
            rewrite_at_path(schema, item, path, f);
        }
        return;
    }
    match path.first() {
        None => {
            if let Value::Object(object) = value {
                f(object);
            }
        }
        Some(PathElement::Fragment(name)) => {
            let typename = value
                .as_object()
                .and_then(|o| o.get(TYPENAME))
                .and_then(|t| t.as_str())
                .map(str::to_owned);
            match typename {
                Some(typename) => {
                    if schema.condition_matches(name, &typename) {
                        rewrite_at_path(schema, value, &path[1..], f);
                    }
                }
                None => {
                    if let Value::Object(object) = value {
                        for child in object.values_mut() {
                            rewrite_at_path(schema, child, path, f);
                        }
                    }
                }
            }
        }
        Some(PathElement::Key(key)) => {
            if let Value::Object(object) = value {
                if let Some(child) = object.get_mut(key.as_str()) {
                    rewrite_at_path(schema, child, &path[1..], f);
                }
            }
        }
        // rewrite paths are made of fields and type conditions only
        Some(PathElement::Index(_)) | Some(PathElement::Flatten) => {}
    }
}
