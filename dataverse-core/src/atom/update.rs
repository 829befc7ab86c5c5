//! Structural-sharing updates of nested values.

use std::rc::Rc;

use tracing::warn;

use crate::reactive::Identity;
use crate::value::{PathSegment, Value};

/// Apply `reducer` to the value at `path` inside `value` and return the new
/// root.
///
/// Only the containers along `path` are copied; everything else is shared
/// with `value`. If the reducer hands back a value identical to its input,
/// `value` itself is returned, so no listener sees a change.
///
/// A container that does not fit the next segment (or a scalar, or
/// `Absent`) is replaced: by a map for a key, or by a list padded with
/// `Absent` for an index.
///
/// An index more than [`MAX_PADDING`] slots past the end of its list is
/// refused; the update is dropped and `value` is returned unchanged.
pub(crate) fn update_deep<F>(value: &Value, path: &[PathSegment], reducer: F) -> Value
where
    F: FnOnce(&Value) -> Value,
{
    let Some((segment, rest)) = path.split_first() else {
        return reducer(value);
    };

    let child = value.child(segment);
    let updated = update_deep(&child, rest, reducer);
    if updated.is_identical(&child) {
        return value.clone();
    }
    assign(value, segment, updated).unwrap_or_else(|| value.clone())
}

/// Largest number of `Absent` slots an index update may add to a list.
pub(crate) const MAX_PADDING: usize = 1 << 16;

fn assign(container: &Value, segment: &PathSegment, child: Value) -> Option<Value> {
    match (container, segment) {
        (Value::Map(map), PathSegment::Key(key)) => {
            let mut map = (**map).clone();
            map.insert(key.clone(), child);
            Some(Value::Map(Rc::new(map)))
        }
        (Value::List(items), segment) => match segment.as_index() {
            Some(index) => with_index((**items).clone(), index, child),
            None => fresh(segment, child),
        },
        (_, segment) => fresh(segment, child),
    }
}

fn with_index(mut items: Vec<Value>, index: usize, child: Value) -> Option<Value> {
    if index >= items.len() {
        if index - items.len() > MAX_PADDING {
            warn!(index, len = items.len(), "list index too far past the end, update dropped");
            return None;
        }
        items.resize(index + 1, Value::Absent);
    }
    items[index] = child;
    Some(Value::List(Rc::new(items)))
}

fn fresh(segment: &PathSegment, child: Value) -> Option<Value> {
    match segment {
        PathSegment::Key(key) => Some(Value::map([(key.clone(), child)])),
        PathSegment::Index(index) => with_index(Vec::new(), *index, child),
    }
}
