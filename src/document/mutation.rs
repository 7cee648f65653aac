//! Mutation engine
//!
//! Applies a compiled path plus a value to a document. Intermediate
//! containers are created on demand: a map in front of a `MapKey`, a list
//! in front of any list operation. Navigating into an existing container of
//! the wrong kind fails with `StoreError::Type` instead of coercing it.
//!
//! Inserted values are `im` persistent structures, so a reader holding a
//! clone of the document never observes the writer's changes.

use log::trace;

use crate::core::{List, Map, Result, StoreError, Value};
use crate::document::path::{PathOp, compile_path};

impl PathOp {
    /// Empty container of the kind this operation navigates into.
    pub fn new_container(&self) -> Value {
        match self {
            Self::MapKey(_) => Value::empty_map(),
            Self::ListIndex(_) | Self::ListLastIndex | Self::ListAppend => Value::empty_list(),
        }
    }

    /// Resolves this operation against a container without modifying it.
    pub fn get<'a>(&self, container: &'a Value) -> Option<&'a Value> {
        match self {
            Self::MapKey(key) => container.as_map()?.get(key.as_str()),
            Self::ListIndex(index) => {
                let index = usize::try_from(*index).ok()?;
                container.as_list()?.get(index)
            }
            Self::ListLastIndex => container.as_list()?.last(),
            Self::ListAppend => None,
        }
    }

    /// Descends into the child addressed by this operation, creating the
    /// container `next` expects when the slot is absent or null.
    fn child_mut<'a>(&self, container: &'a mut Value, next: &PathOp) -> Result<&'a mut Value> {
        match self {
            Self::MapKey(key) => {
                let map = expect_map(container, self)?;
                if map.get(key.as_str()).is_none_or(Value::is_null) {
                    map.insert(key.clone(), next.new_container());
                }
                map.get_mut(key.as_str()).ok_or_else(|| missing_slot(self))
            }
            Self::ListIndex(index) => {
                let index = list_index(*index)?;
                let list = expect_list(container, self)?;
                if index >= list.len() {
                    pad_list(list, index);
                    list.push_back(next.new_container());
                } else if list[index].is_null() {
                    list.set(index, next.new_container());
                }
                list.get_mut(index).ok_or_else(|| missing_slot(self))
            }
            Self::ListLastIndex => {
                let list = expect_list(container, self)?;
                if list.last().is_none_or(Value::is_null) {
                    list.pop_back();
                    list.push_back(next.new_container());
                }
                let last = list.len() - 1;
                list.get_mut(last).ok_or_else(|| missing_slot(self))
            }
            Self::ListAppend => {
                let list = expect_list(container, self)?;
                list.push_back(next.new_container());
                let last = list.len() - 1;
                list.get_mut(last).ok_or_else(|| missing_slot(self))
            }
        }
    }

    /// Applies `value` at the slot addressed by this operation. A null value
    /// removes the slot instead.
    fn set(&self, container: &mut Value, value: Value) -> Result<()> {
        match self {
            Self::MapKey(key) => {
                let map = expect_map(container, self)?;
                if value.is_null() {
                    map.remove(key.as_str());
                } else {
                    map.insert(key.clone(), value);
                }
            }
            Self::ListIndex(index) => {
                let index = list_index(*index)?;
                let list = expect_list(container, self)?;
                if index < list.len() {
                    if value.is_null() {
                        list.remove(index);
                    } else {
                        list.set(index, value);
                    }
                } else if !value.is_null() {
                    pad_list(list, index);
                    list.push_back(value);
                }
            }
            Self::ListLastIndex => {
                let list = expect_list(container, self)?;
                list.pop_back();
                if !value.is_null() {
                    list.push_back(value);
                }
            }
            Self::ListAppend => {
                if value.is_null() {
                    return Err(StoreError::Value(
                        "cannot append a null value to a list".to_string(),
                    ));
                }
                expect_list(container, self)?.push_back(value);
            }
        }
        Ok(())
    }
}

/// Applies `value` at the location `ops` addresses inside `document`.
///
/// An empty `ops` replaces the whole document, which requires `value` to be
/// a map. The document is left untouched only when the failure is detected
/// before any container was created; callers needing all-or-nothing apply
/// to a clone first.
///
/// Values that cannot be written back as JSON (non-finite floats, nesting
/// past [`MAX_NESTING_DEPTH`](crate::core::MAX_NESTING_DEPTH)) fail with
/// `StoreError::Value` and leave the document untouched.
pub fn modify(document: &mut Value, ops: &[PathOp], value: Value) -> Result<()> {
    value.check_storable(ops.len())?;

    let Some(last) = ops.last() else {
        return replace_document(document, value);
    };

    let mut container = document;
    for pair in ops.windows(2) {
        container = pair[0].child_mut(container, &pair[1])?;
    }
    trace!("applying {:?} at depth {}", last, ops.len());
    last.set(container, value)
}

/// Resolves `ops` against `document`. Returns `None` when any step is
/// missing or addresses the wrong kind of container.
pub fn get_at<'a>(document: &'a Value, ops: &[PathOp]) -> Option<&'a Value> {
    ops.iter().try_fold(document, |node, op| op.get(node))
}

impl Value {
    /// Reads the value at a path string.
    pub fn get_path(&self, path: &str) -> Result<Option<&Value>> {
        let ops = compile_path(path)?;
        Ok(get_at(self, &ops))
    }

    /// Writes (or with `Value::Null`, removes) the value at a path string.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let ops = compile_path(path)?;
        modify(self, &ops, value.into())
    }
}

fn replace_document(document: &mut Value, value: Value) -> Result<()> {
    match value {
        Value::Map(_) => {
            *document = value;
            Ok(())
        }
        other => Err(StoreError::Type(format!(
            "document root must be a map, got {}",
            other.type_name()
        ))),
    }
}

fn expect_map<'a>(container: &'a mut Value, op: &PathOp) -> Result<&'a mut Map> {
    match container {
        Value::Map(map) => Ok(map),
        other => Err(StoreError::Type(format!(
            "{:?} needs a map, found {}",
            op,
            other.type_name()
        ))),
    }
}

fn expect_list<'a>(container: &'a mut Value, op: &PathOp) -> Result<&'a mut List> {
    match container {
        Value::List(list) => Ok(list),
        other => Err(StoreError::Type(format!(
            "{:?} needs a list, found {}",
            op,
            other.type_name()
        ))),
    }
}

fn list_index(index: i64) -> Result<usize> {
    usize::try_from(index).map_err(|_| StoreError::InvalidIndex(index))
}

/// Pads with nulls so the next push lands at `index`.
fn pad_list(list: &mut List, index: usize) {
    while list.len() < index {
        list.push_back(Value::Null);
    }
}

fn missing_slot(op: &PathOp) -> StoreError {
    StoreError::Type(format!("{:?} did not resolve after creation", op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::core::MAX_NESTING_DEPTH;

    fn apply(document: &mut Value, path: &str, value: impl Into<Value>) -> Result<()> {
        document.set_path(path, value)
    }

    #[test]
    fn test_creates_nested_containers_with_padding() {
        let mut doc = Value::empty_map();
        apply(&mut doc, "foo.bar.3", "v").unwrap();
        assert_eq!(doc, Value::from(json!({"foo": {"bar": [null, null, null, "v"]}})));
    }

    #[test]
    fn test_append_preserves_order() {
        let mut doc = Value::empty_map();
        apply(&mut doc, "x.", 1).unwrap();
        apply(&mut doc, "x.", 2).unwrap();
        assert_eq!(doc, Value::from(json!({"x": [1, 2]})));
    }

    #[test]
    fn test_append_null_is_value_error() {
        let mut doc = Value::empty_map();
        let err = apply(&mut doc, "x.", Value::Null).unwrap_err();
        assert!(matches!(err, StoreError::Value(_)));
    }

    #[test]
    fn test_last_index_appends_then_replaces() {
        let mut doc = Value::from(json!({"list": []}));
        apply(&mut doc, "list.-1", "v").unwrap();
        assert_eq!(doc, Value::from(json!({"list": ["v"]})));
        apply(&mut doc, "list.-1", "v2").unwrap();
        assert_eq!(doc, Value::from(json!({"list": ["v2"]})));
        apply(&mut doc, "list.-1", Value::Null).unwrap();
        assert_eq!(doc, Value::from(json!({"list": []})));
    }

    #[test]
    fn test_list_index_replace_and_delete() {
        let mut doc = Value::from(json!({"l": ["a", "b", "c"]}));
        apply(&mut doc, "l.1", "B").unwrap();
        assert_eq!(doc, Value::from(json!({"l": ["a", "B", "c"]})));
        apply(&mut doc, "l.0", Value::Null).unwrap();
        assert_eq!(doc, Value::from(json!({"l": ["B", "c"]})));
        // deleting beyond the end is a no-op
        apply(&mut doc, "l.9", Value::Null).unwrap();
        assert_eq!(doc, Value::from(json!({"l": ["B", "c"]})));
    }

    #[test]
    fn test_map_delete() {
        let mut doc = Value::from(json!({"a": {"b": 1, "c": 2}}));
        apply(&mut doc, "a.b", Value::Null).unwrap();
        assert_eq!(doc, Value::from(json!({"a": {"c": 2}})));
    }

    #[test]
    fn test_navigate_through_last_and_append() {
        let mut doc = Value::empty_map();
        apply(&mut doc, "threads.", Value::from(json!({"id": 1}))).unwrap();
        apply(&mut doc, "threads.-1.name", "main").unwrap();
        apply(&mut doc, "threads.", Value::from(json!({"id": 2}))).unwrap();
        assert_eq!(
            doc,
            Value::from(json!({"threads": [{"id": 1, "name": "main"}, {"id": 2}]}))
        );
    }

    #[test]
    fn test_replace_whole_document() {
        let mut doc = Value::from(json!({"old": true}));
        modify(&mut doc, &[], Value::from(json!({"new": 1}))).unwrap();
        assert_eq!(doc, Value::from(json!({"new": 1})));

        let err = modify(&mut doc, &[], Value::from(3)).unwrap_err();
        assert!(matches!(err, StoreError::Type(_)));
        assert_eq!(doc, Value::from(json!({"new": 1})));
    }

    #[test]
    fn test_wrong_container_kind_fails_fast() {
        let mut doc = Value::from(json!({"m": {"k": 1}, "s": "text"}));
        assert!(matches!(apply(&mut doc, "m.0", 1), Err(StoreError::Type(_))));
        assert!(matches!(apply(&mut doc, "s.x", 1), Err(StoreError::Type(_))));
        assert!(matches!(apply(&mut doc, "0", 1), Err(StoreError::Type(_))));
    }

    #[test]
    fn test_negative_index_is_rejected() {
        let mut doc = Value::from(json!({"l": [1]}));
        let err = apply(&mut doc, "l.-3", 1).unwrap_err();
        assert!(matches!(err, StoreError::InvalidIndex(-3)));
    }

    #[test]
    fn test_null_intermediate_is_replaced() {
        let mut doc = Value::from(json!({"a": null}));
        apply(&mut doc, "a.b", 1).unwrap();
        assert_eq!(doc, Value::from(json!({"a": {"b": 1}})));
    }

    #[test]
    fn test_get_at() {
        let doc = Value::from(json!({"a": {"list": [10, 20]}}));
        assert_eq!(doc.get_path("a.list.1").unwrap(), Some(&Value::from(20)));
        assert_eq!(doc.get_path("a.list.-1").unwrap(), Some(&Value::from(20)));
        assert_eq!(doc.get_path("a.list.").unwrap(), None);
        assert_eq!(doc.get_path("a.list.5").unwrap(), None);
        assert_eq!(doc.get_path("a.missing").unwrap(), None);
        assert_eq!(doc.get_path("").unwrap(), Some(&doc));
    }

    #[test]
    fn test_nesting_depth_is_capped() {
        let path = vec!["k"; MAX_NESTING_DEPTH].join(".");
        let mut doc = Value::empty_map();
        apply(&mut doc, &path, true).unwrap();
        assert_eq!(doc.get_path(&path).unwrap(), Some(&Value::from(true)));

        let before = doc.clone();
        let err = apply(&mut doc, &format!("{}.k", path), true).unwrap_err();
        assert!(matches!(err, StoreError::Value(_)));
        let err = apply(&mut doc, &path, json!({"one": "more"})).unwrap_err();
        assert!(matches!(err, StoreError::Value(_)));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        let mut doc = Value::from(json!({"x": 1.5}));
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(apply(&mut doc, "x", bad), Err(StoreError::Value(_))));
            assert!(matches!(apply(&mut doc, "crumbs.", bad), Err(StoreError::Value(_))));
            let nested = Value::from(vec![Value::from(1), Value::from(bad)]);
            assert!(matches!(apply(&mut doc, "l", nested), Err(StoreError::Value(_))));
        }
        assert_eq!(doc, Value::from(json!({"x": 1.5})));
    }
}
