//! Manipulation of the dynamic JSON values that flow through plan execution.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;

use crate::error::FetchError;
use crate::spec::Schema;

/// A JSON value produced by or merged from a subgraph response.
pub type Value = serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

pub(crate) const TYPENAME: &str = "__typename";

const FRAGMENT_PREFIX: &str = "... on ";

/// A GraphQL path element that is composed of strings or numbers.
/// e.g `/book/3/name`
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash)]
#[serde(untagged)]
pub enum PathElement {
    /// A path element that given an array will flatmap the content.
    #[serde(
        deserialize_with = "deserialize_flatten",
        serialize_with = "serialize_flatten"
    )]
    Flatten,

    /// An index path element.
    Index(usize),

    /// A fragment application
    #[serde(
        deserialize_with = "deserialize_fragment",
        serialize_with = "serialize_fragment"
    )]
    Fragment(String),

    /// A key path element.
    Key(String),
}

fn deserialize_flatten<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserializer.deserialize_str(FlattenVisitor)
}

struct FlattenVisitor;

impl serde::de::Visitor<'_> for FlattenVisitor {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a string that is '@'")
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        if s == "@" {
            Ok(())
        } else {
            Err(serde::de::Error::invalid_value(
                serde::de::Unexpected::Str(s),
                &self,
            ))
        }
    }
}

fn serialize_flatten<S>(serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str("@")
}

fn deserialize_fragment<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserializer.deserialize_str(FragmentVisitor)
}

struct FragmentVisitor;

impl serde::de::Visitor<'_> for FragmentVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a string that begins with '... on '")
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        s.strip_prefix(FRAGMENT_PREFIX)
            .map(|v| v.to_string())
            .ok_or_else(|| serde::de::Error::invalid_value(serde::de::Unexpected::Str(s), &self))
    }
}

fn serialize_fragment<S>(name: &String, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(format!("{FRAGMENT_PREFIX}{name}").as_str())
}

/// A path into the result document.
///
/// This can be composed of strings and numbers
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Default, Hash)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Path {
        Path(Default::default())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn join(&self, other: impl AsRef<Self>) -> Self {
        let other = other.as_ref();
        let mut new = Vec::with_capacity(self.0.len() + other.0.len());
        new.extend(self.0.iter().cloned());
        new.extend(other.0.iter().cloned());
        Path(new)
    }

    pub fn push(&mut self, element: PathElement) {
        self.0.push(element)
    }

    /// The longest leading portion of this path that is concrete. Error
    /// paths surfaced to clients must not contain `@`: a failure below a
    /// flatten applies to the whole array it fans out over.
    pub fn concrete_ancestor(&self) -> Path {
        Path(
            self.0
                .iter()
                .take_while(|element| {
                    !matches!(element, PathElement::Flatten | PathElement::Fragment(_))
                })
                .cloned()
                .collect(),
        )
    }
}

impl AsRef<Path> for Path {
    fn as_ref(&self) -> &Path {
        self
    }
}

fn parse_path_element(s: &str) -> PathElement {
    if s == "@" {
        PathElement::Flatten
    } else if let Ok(index) = s.parse::<usize>() {
        PathElement::Index(index)
    } else if let Some(name) = s.strip_prefix(FRAGMENT_PREFIX) {
        PathElement::Fragment(name.to_string())
    } else {
        PathElement::Key(s.to_string())
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self(
            s.split('/')
                .filter(|x| !x.is_empty())
                .map(parse_path_element)
                .collect(),
        )
    }
}

impl FromIterator<PathElement> for Path {
    fn from_iter<T: IntoIterator<Item = PathElement>>(iter: T) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in self.iter() {
            write!(f, "/")?;
            match element {
                PathElement::Index(index) => write!(f, "{index}")?,
                PathElement::Key(key) => write!(f, "{key}")?,
                PathElement::Flatten => write!(f, "@")?,
                PathElement::Fragment(name) => write!(f, "{FRAGMENT_PREFIX}{name}")?,
            }
        }
        Ok(())
    }
}

/// Extension trait for [`Value`].
pub(crate) trait ValueExt {
    /// Merge another value into this one, in place.
    ///
    /// Objects merge key by key, arrays of equal length merge element by
    /// element, null never overwrites an existing value, and any other
    /// combination lets the incoming value win. Not commutative: callers
    /// must sequence merges in plan order.
    fn deep_merge(&mut self, other: Self);

    /// Insert a value at a concrete path (no `@`), creating intermediate
    /// objects and padding arrays as needed.
    fn insert(&mut self, path: &Path, value: Value) -> Result<(), FetchError>;

    /// Call `f` with every value selected by `path`, along with the
    /// concrete path (all `@` elements expanded against the arrays
    /// actually present) that reached it.
    ///
    /// A `@` element requires an array and fans out element-wise; a key
    /// element requires an object; a dead end selects nothing.
    fn select_values_and_paths<'a, F>(&'a self, schema: &Schema, path: &Path, f: F)
    where
        F: FnMut(&Path, &'a Value);

    /// Whether this value is an object whose `__typename` is `maybe_type`
    /// or, when `maybe_type` is abstract, a subtype of it.
    fn is_object_of_type(&self, schema: &Schema, maybe_type: &str) -> bool;
}

impl ValueExt for Value {
    fn deep_merge(&mut self, other: Self) {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => {
                for (key, value) in b.into_iter() {
                    match a.get_mut(&key) {
                        Some(target) => target.deep_merge(value),
                        // a key set to null is distinct from an absent key
                        None => {
                            a.insert(key, value);
                        }
                    }
                }
            }
            (Value::Array(a), Value::Array(mut b)) if a.len() == b.len() => {
                for (target, value) in a.iter_mut().zip(b.drain(..)) {
                    target.deep_merge(value);
                }
            }
            // null never overwrites data that is already there
            (_, Value::Null) => {}
            (a, b) => {
                *a = b;
            }
        }
    }

    fn insert(&mut self, path: &Path, value: Value) -> Result<(), FetchError> {
        let mut current = self;
        for element in path.iter() {
            match element {
                PathElement::Key(key) => {
                    if current.is_null() {
                        *current = Value::Object(Object::default());
                    }
                    match current {
                        Value::Object(o) => {
                            current = o.entry(key.as_str()).or_insert(Value::Null);
                        }
                        _ => {
                            return Err(FetchError::ExecutorError {
                                reason: format!("cannot insert key {key} into a non-object"),
                            });
                        }
                    }
                }
                PathElement::Index(index) => {
                    if current.is_null() {
                        *current = Value::Array(Vec::new());
                    }
                    match current {
                        Value::Array(a) => {
                            if a.len() <= *index {
                                a.resize(index + 1, Value::Null);
                            }
                            current = &mut a[*index];
                        }
                        _ => {
                            return Err(FetchError::ExecutorError {
                                reason: format!("cannot index a non-array at {index}"),
                            });
                        }
                    }
                }
                PathElement::Flatten | PathElement::Fragment(_) => {
                    return Err(FetchError::ExecutorError {
                        reason: "cannot insert at a non-concrete path".to_string(),
                    });
                }
            }
        }
        current.deep_merge(value);
        Ok(())
    }

    fn select_values_and_paths<'a, F>(&'a self, schema: &Schema, path: &Path, mut f: F)
    where
        F: FnMut(&Path, &'a Value),
    {
        iterate_path(schema, &mut Path::empty(), &path.0, self, &mut f)
    }

    fn is_object_of_type(&self, schema: &Schema, maybe_type: &str) -> bool {
        self.as_object()
            .and_then(|o| o.get(TYPENAME))
            .and_then(|t| t.as_str())
            .map(|typename| {
                typename == maybe_type || schema.is_subtype(maybe_type, typename)
            })
            .unwrap_or_default()
    }
}

fn iterate_path<'a, F>(
    schema: &Schema,
    parent: &mut Path,
    path: &[PathElement],
    data: &'a Value,
    f: &mut F,
) where
    F: FnMut(&Path, &'a Value),
{
    match path.first() {
        None => f(parent, data),
        Some(PathElement::Flatten) => {
            if let Value::Array(array) = data {
                for (i, value) in array.iter().enumerate() {
                    parent.push(PathElement::Index(i));
                    iterate_path(schema, parent, &path[1..], value, f);
                    parent.0.pop();
                }
            }
        }
        Some(PathElement::Index(i)) => {
            if let Value::Array(array) = data {
                if let Some(value) = array.get(*i) {
                    parent.push(PathElement::Index(*i));
                    iterate_path(schema, parent, &path[1..], value, f);
                    parent.0.pop();
                }
            }
        }
        Some(PathElement::Key(key)) => {
            if let Value::Object(object) = data {
                if let Some(value) = object.get(key.as_str()) {
                    parent.push(PathElement::Key(key.clone()));
                    iterate_path(schema, parent, &path[1..], value, f);
                    parent.0.pop();
                }
            }
        }
        Some(PathElement::Fragment(name)) => {
            if data.is_object_of_type(schema, name) {
                iterate_path(schema, parent, &path[1..], data, f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::spec::Schema;

    fn schema() -> Schema {
        Schema::for_tests()
    }

    #[test]
    fn test_deep_merge_objects() {
        let mut first = json!({"a": 1, "b": {"c": 2}});
        first.deep_merge(json!({"b": {"d": 3}, "e": 4}));
        assert_eq!(first, json!({"a": 1, "b": {"c": 2, "d": 3}, "e": 4}));
    }

    #[test]
    fn test_deep_merge_equal_length_arrays() {
        let mut first = json!({"users": [{"id": "1"}, {"id": "2"}]});
        first.deep_merge(json!({"users": [{"name": "Ada"}, {"name": "Grace"}]}));
        assert_eq!(
            first,
            json!({"users": [{"id": "1", "name": "Ada"}, {"id": "2", "name": "Grace"}]})
        );
    }

    #[test]
    fn test_deep_merge_null_does_not_overwrite() {
        let mut first = json!({"a": 1});
        first.deep_merge(json!({"a": null}));
        assert_eq!(first, json!({"a": 1}));

        // but null does land on an absent key
        let mut first = json!({"a": 1});
        first.deep_merge(json!({"b": null}));
        assert_eq!(first, json!({"a": 1, "b": null}));
    }

    #[test]
    fn test_deep_merge_scalar_later_wins() {
        let mut first = json!({"a": 1});
        first.deep_merge(json!({"a": 2}));
        assert_eq!(first, json!({"a": 2}));

        let mut empty = Value::Null;
        empty.deep_merge(json!({"a": 2}));
        assert_eq!(empty, json!({"a": 2}));
    }

    #[test]
    fn test_insert_at_path() {
        let mut value = Value::Null;
        value
            .insert(&Path::from("users/0"), json!({"email": "a@x"}))
            .unwrap();
        value
            .insert(&Path::from("users/1"), json!({"email": "b@x"}))
            .unwrap();
        assert_eq!(
            value,
            json!({"users": [{"email": "a@x"}, {"email": "b@x"}]})
        );
    }

    #[test]
    fn test_insert_rejects_flatten() {
        let mut value = Value::Null;
        assert!(value.insert(&Path::from("users/@"), json!({})).is_err());
    }

    #[test]
    fn test_select_values_expands_flatten() {
        let data = json!({"users": [{"id": "1"}, null, {"id": "3"}]});
        let mut selected = Vec::new();
        data.select_values_and_paths(&schema(), &Path::from("users/@"), |path, value| {
            selected.push((path.to_string(), value.clone()));
        });
        assert_eq!(
            selected,
            vec![
                ("/users/0".to_string(), json!({"id": "1"})),
                ("/users/1".to_string(), Value::Null),
                ("/users/2".to_string(), json!({"id": "3"})),
            ]
        );
    }

    #[test]
    fn test_select_values_dead_path() {
        let data = json!({"me": null});
        let mut selected = Vec::new();
        data.select_values_and_paths(&schema(), &Path::from("users/@"), |path, value| {
            selected.push((path.clone(), value.clone()));
        });
        assert!(selected.is_empty());
    }

    #[test]
    fn test_select_values_key_does_not_traverse_arrays() {
        // a key element never descends into an array implicitly
        let data = json!({"users": [{"id": "1"}]});
        let mut selected = Vec::new();
        data.select_values_and_paths(&schema(), &Path::from("users/id"), |path, value| {
            selected.push((path.clone(), value.clone()));
        });
        assert!(selected.is_empty());
    }

    #[test]
    fn test_path_serialization() {
        let path = Path::from("users/@/... on User/name/3");
        assert_eq!(
            serde_json::to_value(&path).unwrap(),
            serde_json::json!(["users", "@", "... on User", "name", 3]),
        );
        let parsed: Path =
            serde_json::from_value(serde_json::json!(["users", "@", "... on User", "name", 3]))
                .unwrap();
        assert_eq!(parsed, path);
        assert_eq!(path.to_string(), "/users/@/... on User/name/3");
    }
}
