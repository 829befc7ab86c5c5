//! Pointers
//!
//! A [`Pointer`] is an address into a value source: a root plus a path of
//! segments. It carries no data. Reading through a pointer goes through
//! [`pointer_to_prism`] or [`val`].
//!
//! # Identity
//!
//! Each pointer owns a small metadata object. Cloning a pointer shares the
//! metadata; [`Pointer::new`] and projections of a different parent do not.
//! The prism built for a pointer is cached on its metadata, so it lives
//! exactly as long as some handle to that pointer does.
//!
//! Projecting the same segment twice from one live pointer returns the same
//! child pointer while the first child is still alive.
//!
//! # Roots
//!
//! Any `Rc<dyn PointerRoot>` can anchor a pointer. A root that can produce
//! a prism of the value at a path advertises it through
//! [`PointerRoot::identity_prism_provider`]; [`Atom`](crate::Atom) does.

mod bridge;

pub use bridge::{pointer_to_prism, val, UnsupportedRootError, Val};

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::reactive::Prism;
use crate::value::{display_path, Path, PathSegment, Value};

/// The anchor of a pointer.
pub trait PointerRoot: 'static {
    /// This root's prism capability, if it has one.
    fn identity_prism_provider(self: Rc<Self>) -> Option<Rc<dyn IdentityPrismProvider>> {
        None
    }
}

/// A root that can produce a prism of the value at any path below it.
pub trait IdentityPrismProvider {
    fn identity_prism(self: Rc<Self>, path: &[PathSegment]) -> Prism<Value>;
}

struct PointerMeta {
    root: Rc<dyn PointerRoot>,
    path: Path,
    children: RefCell<HashMap<PathSegment, Weak<PointerMeta>>>,
    prism: RefCell<Option<Prism<Value>>>,
}

/// An immutable address: a root and a path below it.
///
/// `Pointer` deliberately has no `PartialEq`. Use [`Pointer::ptr_eq`] for
/// pointer identity and [`Pointer::is_path_equal`] for address equality.
#[derive(Clone)]
pub struct Pointer {
    meta: Rc<PointerMeta>,
}

impl Pointer {
    pub fn new(root: Rc<dyn PointerRoot>, path: impl IntoIterator<Item = PathSegment>) -> Self {
        Self {
            meta: Rc::new(PointerMeta {
                root,
                path: path.into_iter().collect(),
                children: RefCell::new(HashMap::new()),
                prism: RefCell::new(None),
            }),
        }
    }

    /// A pointer one segment further down.
    pub fn child(&self, segment: impl Into<PathSegment>) -> Pointer {
        let segment = segment.into();
        let cached = self
            .meta
            .children
            .borrow()
            .get(&segment)
            .and_then(Weak::upgrade);
        if let Some(meta) = cached {
            return Pointer { meta };
        }

        let mut path = self.meta.path.clone();
        path.push(segment.clone());
        let child = Pointer::new(Rc::clone(&self.meta.root), path);

        let mut children = self.meta.children.borrow_mut();
        children.retain(|_, meta| meta.strong_count() > 0);
        children.insert(segment, Rc::downgrade(&child.meta));
        child
    }

    /// Project a map key.
    pub fn prop(&self, key: impl Into<String>) -> Pointer {
        self.child(PathSegment::Key(key.into()))
    }

    /// Project a list index.
    pub fn index(&self, index: usize) -> Pointer {
        self.child(PathSegment::Index(index))
    }

    pub fn root(&self) -> &Rc<dyn PointerRoot> {
        &self.meta.root
    }

    pub fn path(&self) -> &[PathSegment] {
        &self.meta.path
    }

    pub fn parts(&self) -> PointerParts {
        PointerParts {
            root: Rc::clone(&self.meta.root),
            path: self.meta.path.clone(),
        }
    }

    /// Whether both handles are the same pointer (and share one prism).
    pub fn ptr_eq(a: &Pointer, b: &Pointer) -> bool {
        Rc::ptr_eq(&a.meta, &b.meta)
    }

    /// Whether both pointers address the same path of the same root.
    pub fn is_path_equal(&self, other: &Pointer) -> bool {
        same_root(&self.meta.root, &other.meta.root) && self.meta.path == other.meta.path
    }

    pub(crate) fn cached_prism(&self) -> Option<Prism<Value>> {
        self.meta.prism.borrow().clone()
    }

    /// The prism cached on this pointer, built by `init` on first use.
    pub(crate) fn prism_or_insert_with<F>(&self, init: F) -> Prism<Value>
    where
        F: FnOnce() -> Prism<Value>,
    {
        if let Some(prism) = self.cached_prism() {
            return prism;
        }
        let prism = init();
        self.meta.prism.borrow_mut().get_or_insert(prism).clone()
    }
}

fn same_root(a: &Rc<dyn PointerRoot>, b: &Rc<dyn PointerRoot>) -> bool {
    // Compare data addresses only; vtable pointers for one type may differ.
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pointer")
            .field("root", &(Rc::as_ptr(&self.meta.root) as *const ()))
            .field("path", &format_args!("{}", display_path(&self.meta.path)))
            .finish()
    }
}

/// The root and path of a pointer, detached from its identity.
#[derive(Clone)]
pub struct PointerParts {
    pub root: Rc<dyn PointerRoot>,
    pub path: Path,
}

impl fmt::Debug for PointerParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointerParts")
            .field("root", &(Rc::as_ptr(&self.root) as *const ()))
            .field("path", &self.path)
            .finish()
    }
}

pub fn get_pointer_parts(pointer: &Pointer) -> PointerParts {
    pointer.parts()
}

/// Whether `value` is a [`Pointer`].
pub fn is_pointer(value: &dyn Any) -> bool {
    value.is::<Pointer>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    struct PlainRoot;

    impl PointerRoot for PlainRoot {}

    fn root() -> Rc<dyn PointerRoot> {
        Rc::new(PlainRoot)
    }

    #[test]
    fn projection_extends_the_path() {
        let base = Pointer::new(root(), path!["a"]);
        let child = base.prop("b").index(2);

        assert_eq!(child.path(), &path!["a", "b", 2usize][..]);
        assert_eq!(base.path(), &path!["a"][..]);
    }

    #[test]
    fn projection_reuses_live_children() {
        let base = Pointer::new(root(), Path::new());
        let first = base.prop("x");
        let second = base.prop("x");
        assert!(Pointer::ptr_eq(&first, &second));

        let other = base.index(0);
        assert!(!Pointer::ptr_eq(&first, &other));
    }

    #[test]
    fn dropped_children_are_rebuilt() {
        let base = Pointer::new(root(), Path::new());
        let first_path = base.prop("x").path().to_vec();
        let again = base.prop("x");
        assert_eq!(again.path(), &first_path[..]);
    }

    #[test]
    fn path_equality_needs_the_same_root() {
        let shared = root();
        let a = Pointer::new(Rc::clone(&shared), path!["k"]);
        let b = Pointer::new(Rc::clone(&shared), path!["k"]);
        let c = Pointer::new(root(), path!["k"]);

        assert!(!Pointer::ptr_eq(&a, &b));
        assert!(a.is_path_equal(&b));
        assert!(!a.is_path_equal(&c));
    }

    #[test]
    fn parts_expose_root_and_path() {
        let shared = root();
        let pointer = Pointer::new(Rc::clone(&shared), path!["a", 1usize]);
        let parts = get_pointer_parts(&pointer);

        assert!(same_root(&parts.root, &shared));
        assert_eq!(parts.path, path!["a", 1usize]);
    }

    #[test]
    fn is_pointer_checks_the_type() {
        let pointer = Pointer::new(root(), Path::new());
        assert!(is_pointer(&pointer));
        assert!(!is_pointer(&"not a pointer"));
        assert!(!is_pointer(&Value::Null));
    }

    #[test]
    fn plain_roots_have_no_prism_capability() {
        assert!(root().identity_prism_provider().is_none());
    }
}
