//! Atoms
//!
//! An [`Atom`] is the mutable root of the data model. It holds one immutable
//! [`Value`] snapshot and lets any number of listeners observe arbitrary
//! sub-paths of it.
//!
//! # Change Propagation
//!
//! Every [`set`](Atom::set) replaces the whole snapshot and then sweeps the
//! atom's scope tree with the old and new snapshots:
//!
//! 1. If the old and new values at a scope are identical, the sweep stops
//!    there. Nothing below an untouched container can have changed.
//! 2. The scope's listeners are called with the new value.
//! 3. If both values are opaque the sweep stops; otherwise each child scope is
//!    visited with the old and new values indexed at its segment.
//!
//! Only paths somebody listens to have scopes, so a sweep never visits more
//! of the value than the subscriptions require.
//!
//! # Re-entrancy
//!
//! A `set` issued by a listener while a sweep is running is queued and applied
//! after that sweep finishes, with its own sweep.

mod scope;
mod update;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::pointer::{IdentityPrismProvider, Pointer, PointerRoot};
use crate::reactive::{Identity, Notify, Prism, Runtime, Subscription, TrackingContext};
use crate::value::{Path, PathSegment, Shape, Value};

use scope::{Listener, Scope, ScopeRef};
use update::update_deep;

/// Shared state behind every handle to one atom.
pub(crate) struct AtomCore {
    value: RefCell<Value>,
    root_scope: ScopeRef,
    propagating: Cell<bool>,
    queued: RefCell<VecDeque<Value>>,
}

/// Marks a sweep as running; clears the mark (and anything queued behind a
/// sweep that unwound) when dropped.
struct SweepGuard<'a>(&'a AtomCore);

impl<'a> SweepGuard<'a> {
    fn new(core: &'a AtomCore) -> Self {
        core.propagating.set(true);
        Self(core)
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.propagating.set(false);
        self.0.queued.borrow_mut().clear();
    }
}

impl AtomCore {
    fn new(initial: Value) -> Self {
        Self {
            value: RefCell::new(initial),
            root_scope: Scope::root(),
            propagating: Cell::new(false),
            queued: RefCell::new(VecDeque::new()),
        }
    }

    fn get(&self) -> Value {
        self.value.borrow().clone()
    }

    fn get_at_path(&self, path: &[PathSegment]) -> Value {
        self.value.borrow().get_path(path)
    }

    fn set(&self, value: Value) {
        if self.propagating.get() {
            debug!("set during a change sweep, queued");
            self.queued.borrow_mut().push_back(value);
            return;
        }
        if let Some(owner) = TrackingContext::current_owner() {
            warn!(prism = owner.raw(), "atom set from inside a prism derivation");
        }

        Runtime::batch(|| {
            let _sweep = SweepGuard::new(self);
            let mut next = Some(value);
            while let Some(value) = next {
                let old = self.value.replace(value.clone());
                propagate(&self.root_scope, &old, &value);
                next = self.queued.borrow_mut().pop_front();
            }
        });
    }

    fn subscribe_at_path(&self, path: &[PathSegment], listener: Listener) -> Subscription {
        let scope = Scope::resolve(&self.root_scope, path);
        let id = Scope::add_listener(&scope, listener);
        let scope = Rc::downgrade(&scope);
        Subscription::new(move || {
            if let Some(scope) = scope.upgrade() {
                Scope::remove_listener(&scope, id);
            }
        })
    }

    fn identity_prism_at(core: &Rc<Self>, path: &[PathSegment]) -> Prism<Value> {
        let path: Path = path.iter().cloned().collect();
        let source = Rc::clone(core);
        let source_path = path.clone();
        let reader = Rc::clone(core);

        Prism::source(
            move |notify: Notify| {
                let listener: Listener = Rc::new(move |_: &Value| notify());
                source.subscribe_at_path(&source_path, listener)
            },
            move || reader.get_at_path(&path),
        )
    }
}

/// Sweep one scope with the values before and after a change.
fn propagate(scope: &ScopeRef, old: &Value, new: &Value) {
    if old.is_identical(new) {
        return;
    }

    let listeners = scope.borrow().listeners();
    for (id, listener) in listeners {
        // Skip listeners removed by an earlier one in this sweep.
        if scope.borrow().has_listener(id) {
            listener(new);
        }
    }

    if !scope.borrow().has_children() {
        return;
    }
    if old.shape() == Shape::Opaque && new.shape() == Shape::Opaque {
        return;
    }

    // Snapshot after the listeners ran; they may have added or pruned scopes.
    let children = scope.borrow().children();
    for (segment, child) in children {
        propagate(&child, &old.child(&segment), &new.child(&segment));
    }
}

impl PointerRoot for AtomCore {
    fn identity_prism_provider(self: Rc<Self>) -> Option<Rc<dyn IdentityPrismProvider>> {
        Some(self)
    }
}

impl IdentityPrismProvider for AtomCore {
    fn identity_prism(self: Rc<Self>, path: &[PathSegment]) -> Prism<Value> {
        AtomCore::identity_prism_at(&self, path)
    }
}

/// A mutable, path-observable container for one value.
///
/// Cloning an `Atom` creates another handle to the same state.
///
/// # Example
///
/// ```rust
/// use dataverse_core::{path, Atom, Value};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let atom = Atom::new(Value::map([("a", 1), ("b", 2)]));
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let log = seen.clone();
/// let _sub = atom.subscribe_at_path(&path!["a"], move |v| log.borrow_mut().push(v.clone()));
///
/// atom.set(Value::map([("a", 1), ("b", 3)]));
/// assert!(seen.borrow().is_empty());
///
/// atom.set(Value::map([("a", 5), ("b", 3)]));
/// assert_eq!(*seen.borrow(), vec![Value::Int(5)]);
/// ```
#[derive(Clone)]
pub struct Atom {
    core: Rc<AtomCore>,
    pointer: Pointer,
}

impl Atom {
    pub fn new(initial: impl Into<Value>) -> Self {
        let core = Rc::new(AtomCore::new(initial.into()));
        let root: Rc<dyn PointerRoot> = core.clone();
        let pointer = Pointer::new(root, Path::new());
        Self { core, pointer }
    }

    /// The current snapshot.
    pub fn get(&self) -> Value {
        self.core.get()
    }

    /// Replace the snapshot and notify every listener whose path changed.
    ///
    /// Prism listeners run before this returns, once, with values computed
    /// from the new snapshot.
    pub fn set(&self, value: impl Into<Value>) {
        self.core.set(value.into());
    }

    /// The value at `path`, or [`Value::Absent`] if the path does not exist.
    pub fn get_in(&self, path: &[PathSegment]) -> Value {
        self.core.get_at_path(path)
    }

    /// Same as [`get_in`](Atom::get_in).
    pub fn get_at_path(&self, path: &[PathSegment]) -> Value {
        self.core.get_at_path(path)
    }

    /// Replace the snapshot with `reducer` applied to it.
    pub fn reduce<F>(&self, reducer: F)
    where
        F: FnOnce(&Value) -> Value,
    {
        let next = reducer(&self.get());
        self.set(next);
    }

    /// Apply `reducer` to the value at the pointer chosen by `select`, copying
    /// only the containers on the way there.
    ///
    /// `select` receives this atom's root pointer. Only the path of the
    /// pointer it returns is used.
    pub fn reduce_by_pointer<S, F>(&self, select: S, reducer: F)
    where
        S: FnOnce(&Pointer) -> Pointer,
        F: FnOnce(&Value) -> Value,
    {
        let target = select(&self.pointer);
        let next = update_deep(&self.get(), target.path(), reducer);
        self.set(next);
    }

    /// Replace the value at the pointer chosen by `select`.
    pub fn set_by_pointer<S>(&self, select: S, value: impl Into<Value>)
    where
        S: FnOnce(&Pointer) -> Pointer,
    {
        let value = value.into();
        self.reduce_by_pointer(select, move |_| value);
    }

    /// Call `callback` with the new value at `path` whenever a `set` changes
    /// its identity.
    pub fn subscribe_at_path<F>(&self, path: &[PathSegment], callback: F) -> Subscription
    where
        F: Fn(&Value) + 'static,
    {
        self.core.subscribe_at_path(path, Rc::new(callback))
    }

    /// A source prism of the value at `path`.
    ///
    /// Every call builds a new prism. Use [`pointer_to_prism`](crate::pointer_to_prism)
    /// to share one prism per pointer.
    pub fn identity_prism(&self, path: &[PathSegment]) -> Prism<Value> {
        AtomCore::identity_prism_at(&self.core, path)
    }

    /// The pointer to this atom's root. Always the same pointer.
    pub fn pointer(&self) -> &Pointer {
        &self.pointer
    }

    /// The prism of the whole snapshot, shared by all callers.
    pub fn prism(&self) -> Prism<Value> {
        self.pointer
            .prism_or_insert_with(|| AtomCore::identity_prism_at(&self.core, &[]))
    }

    /// Number of live scopes, the root included. Equals one when nothing is
    /// subscribed.
    pub fn scope_count(&self) -> usize {
        Scope::count(&self.core.root_scope)
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom")
            .field("value", &*self.core.value.borrow())
            .field("scopes", &self.scope_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
