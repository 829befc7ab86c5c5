//! Scope Tree
//!
//! Each atom keeps a tree of scopes that mirrors the paths somebody is
//! listening to. A change sweep only descends into scopes that exist, so the
//! cost of an update is bounded by the subscribed paths rather than by the
//! size of the value.
//!
//! # Lifetime
//!
//! Scopes are created on demand, together with any missing ancestors, when a
//! listener is added. When a scope is left with no listeners and no children
//! it is removed from its parent, and the check repeats on the parent. The
//! root scope is never removed.
//!
//! Parents own their children; a child only holds a weak link upward.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::trace;

use crate::reactive::SubscriberId;
use crate::value::{display_path, Path, PathSegment, Value};

pub(crate) type ScopeRef = Rc<RefCell<Scope>>;
pub(crate) type Listener = Rc<dyn Fn(&Value)>;

/// One node of the scope tree.
pub(crate) struct Scope {
    path: Path,
    parent: Weak<RefCell<Scope>>,
    children: IndexMap<PathSegment, ScopeRef>,
    listeners: IndexMap<SubscriberId, Listener>,
}

impl Scope {
    /// Create the root scope of a new tree.
    pub(crate) fn root() -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            path: Path::new(),
            parent: Weak::new(),
            children: IndexMap::new(),
            listeners: IndexMap::new(),
        }))
    }

    /// Get the child of `scope` at `segment`, creating it if needed.
    pub(crate) fn get_or_create_child(scope: &ScopeRef, segment: &PathSegment) -> ScopeRef {
        if let Some(child) = scope.borrow().children.get(segment) {
            return Rc::clone(child);
        }

        let mut path = scope.borrow().path.clone();
        path.push(segment.clone());
        trace!(path = %display_path(&path), "scope created");

        let child = Rc::new(RefCell::new(Scope {
            path,
            parent: Rc::downgrade(scope),
            children: IndexMap::new(),
            listeners: IndexMap::new(),
        }));
        scope
            .borrow_mut()
            .children
            .insert(segment.clone(), Rc::clone(&child));
        child
    }

    /// Walk from `root` along `path`, creating scopes as needed.
    pub(crate) fn resolve(root: &ScopeRef, path: &[PathSegment]) -> ScopeRef {
        path.iter().fold(Rc::clone(root), |scope, segment| {
            Scope::get_or_create_child(&scope, segment)
        })
    }

    pub(crate) fn add_listener(scope: &ScopeRef, listener: Listener) -> SubscriberId {
        let id = SubscriberId::new();
        scope.borrow_mut().listeners.insert(id, listener);
        id
    }

    /// Remove a listener and prune whatever became empty.
    pub(crate) fn remove_listener(scope: &ScopeRef, id: SubscriberId) {
        let removed = scope.borrow_mut().listeners.shift_remove(&id).is_some();
        if removed {
            Scope::prune(scope);
        }
    }

    /// Remove `scope` and then its ancestors for as long as they are empty.
    fn prune(scope: &ScopeRef) {
        let mut current = Rc::clone(scope);
        loop {
            let (parent, segment) = {
                let node = current.borrow();
                if !node.is_empty() {
                    return;
                }
                let (Some(parent), Some(segment)) = (node.parent.upgrade(), node.path.last())
                else {
                    return;
                };
                trace!(path = %display_path(&node.path), "scope pruned");
                (parent, segment.clone())
            };

            let detached = parent.borrow_mut().children.shift_remove(&segment);
            debug_assert!(
                detached.as_ref().map_or(true, |d| Rc::ptr_eq(d, &current)),
                "scope tree held a different node at {segment}"
            );
            current = parent;
        }
    }

    fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.children.is_empty()
    }

    pub(crate) fn has_listener(&self, id: SubscriberId) -> bool {
        self.listeners.contains_key(&id)
    }

    pub(crate) fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Listeners registered here, in registration order.
    pub(crate) fn listeners(&self) -> Vec<(SubscriberId, Listener)> {
        self.listeners
            .iter()
            .map(|(id, listener)| (*id, Rc::clone(listener)))
            .collect()
    }

    pub(crate) fn children(&self) -> Vec<(PathSegment, ScopeRef)> {
        self.children
            .iter()
            .map(|(segment, child)| (segment.clone(), Rc::clone(child)))
            .collect()
    }

    /// Number of scopes in the subtree, `scope` included.
    pub(crate) fn count(scope: &ScopeRef) -> usize {
        1 + scope
            .borrow()
            .children
            .values()
            .map(Scope::count)
            .sum::<usize>()
    }
}
