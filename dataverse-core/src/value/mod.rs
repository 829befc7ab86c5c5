//! Snapshot Values
//!
//! An atom holds one immutable snapshot made of nested lists, maps and
//! scalars. Containers live behind `Rc`, so cloning a value is cheap and two
//! clones of the same container share one allocation.
//!
//! # Identity
//!
//! Change detection never compares structure. Two containers are identical
//! only when they are the same allocation; scalars are identical when they are
//! equal. A reducer that returns its input untouched therefore produces no
//! notifications, while a reducer that rebuilds an equal container does.
//!
//! # Indexing
//!
//! Following a [`PathSegment`] into a value never fails. A segment that does
//! not fit the shape of the value (a key on a list, an index past the end, a
//! lookup on a scalar) yields [`Value::Absent`].

#[cfg(feature = "json")]
mod json;

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::reactive::Identity;

/// One step of a path: a map key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    /// The list index this segment addresses, if any.
    ///
    /// Keys that spell a non-negative integer address list elements too.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Index(index) => Some(*index),
            PathSegment::Key(key) => parse_index(key),
        }
    }
}

fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{key:?}"),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<&String> for PathSegment {
    fn from(key: &String) -> Self {
        PathSegment::Key(key.clone())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// A sequence of segments from the root of a value.
///
/// Most paths in practice are shallow, so the first few segments are stored
/// inline.
pub type Path = SmallVec<[PathSegment; 4]>;

/// Build a [`Path`] from keys and indices.
///
/// ```rust
/// use dataverse_core::{path, PathSegment};
///
/// let p = path!["list", 1usize];
/// assert_eq!(p[1], PathSegment::Index(1));
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::new()
    };
    ($($segment:expr),+ $(,)?) => {{
        let mut path = $crate::Path::new();
        $( path.push($crate::PathSegment::from($segment)); )+
        path
    }};
}

/// Render a path as `["a", 1]` for logs and error messages.
pub(crate) fn display_path(path: &[PathSegment]) -> String {
    let segments: Vec<String> = path.iter().map(ToString::to_string).collect();
    format!("[{}]", segments.join(", "))
}

/// Shape category used when diffing two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A list, addressed by index.
    Sequence,
    /// A map, addressed by key.
    Mapping,
    /// Anything without addressable children.
    Opaque,
}

/// An immutable snapshot value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// Nothing lives at this address.
    #[default]
    Absent,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
    List(Rc<Vec<Value>>),
    Map(Rc<IndexMap<String, Value>>),
}

impl Value {
    /// Build a list value.
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(Rc::new(items.into_iter().map(Into::into).collect()))
    }

    /// Build a map value. Entries keep their insertion order.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(Rc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn shape(&self) -> Shape {
        match self {
            Value::List(_) => Shape::Sequence,
            Value::Map(_) => Shape::Mapping,
            _ => Shape::Opaque,
        }
    }

    /// The value one segment below this one, or [`Value::Absent`].
    pub fn child(&self, segment: &PathSegment) -> Value {
        let found = match (self, segment) {
            (Value::Map(map), PathSegment::Key(key)) => map.get(key.as_str()),
            (Value::List(items), _) => segment.as_index().and_then(|i| items.get(i)),
            _ => None,
        };
        found.cloned().unwrap_or_default()
    }

    /// The value reached by following `path`. An empty path returns `self`.
    pub fn get_path(&self, path: &[PathSegment]) -> Value {
        let mut current = self.clone();
        for segment in path {
            if current.is_absent() {
                break;
            }
            current = current.child(segment);
        }
        current
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(&**map),
            _ => None,
        }
    }
}

impl Identity for Value {
    fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Absent, Value::Absent) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // Bitwise, so a NaN snapshot is identical to itself.
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Map(Rc::new(map))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Absent, Into::into)
    }
}
