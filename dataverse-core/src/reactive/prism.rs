//! Prism Implementation
//!
//! A Prism is a memoized derived value. Its derivation reads other prisms,
//! and every read is recorded as a dependency for the next time around.
//!
//! # How Prisms Work
//!
//! 1. On first access, the prism runs its derivation inside a tracking frame
//!    and caches the result together with the dependencies it read and the
//!    value it saw from each.
//!
//! 2. When accessed again, a *cold* prism (no subscribers) pulls each recorded
//!    dependency and compares identities. Only if one differs does it rerun
//!    the derivation. A *hot* prism whose state is clean skips even that.
//!
//! 3. A prism becomes hot when something subscribes to it, either a listener
//!    or a downstream prism. Hot prisms hold live edges to their upstream, so
//!    a change marks them maybe-stale without anyone asking.
//!
//! 4. At the end of the update the runtime flushes every hot prism with
//!    listeners. Each pulls (recomputing only what actually changed) and
//!    notifies its listeners if the value's identity moved.
//!
//! # Sources
//!
//! The leaves of every graph are source prisms, built with
//! [`Prism::source`] from a pull function and a way to be told about changes.
//! [`Atom::identity_prism`](crate::Atom::identity_prism) is one.
//!
//! # Dynamic Dependencies
//!
//! Each recomputation replaces the dependency set. While hot, edges to
//! dependencies that were not read again are dropped, which can in turn make
//! those dependencies cold and release their own upstream subscriptions.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::context::TrackingContext;
use super::identity::Identity;
use super::node::{Downstream, PrismId, PrismState, Upstream};
use super::runtime::{Pending, Runtime};
use super::subscriber::{SubscriberId, Subscription};

/// Callback a source uses to report that its value may have changed.
pub type Notify = Rc<dyn Fn()>;

enum Derivation<T> {
    Derived(Box<dyn Fn() -> T>),
    Source {
        subscribe: Box<dyn Fn(Notify) -> Subscription>,
        get: Box<dyn Fn() -> T>,
    },
}

struct Cache<T> {
    /// Last computed value (None if never computed).
    value: Option<T>,
    state: PrismState,

    /// What the last derivation read, with the values it saw.
    dependencies: Vec<Rc<dyn Upstream>>,

    /// Hot downstream prisms.
    dependents: IndexMap<PrismId, Weak<dyn Downstream>>,
    listeners: IndexMap<SubscriberId, Rc<dyn Fn(&T)>>,
    stale_listeners: IndexMap<SubscriberId, Rc<dyn Fn()>>,

    /// Upstream edges (or the source subscription) are live.
    active: bool,
    source_subscription: Option<Subscription>,

    /// The value listeners last saw.
    emitted: Option<T>,
    queued: bool,
    marked_epoch: Option<u64>,
}

impl<T> Cache<T> {
    fn new() -> Self {
        Self {
            value: None,
            state: PrismState::Stale,
            dependencies: Vec::new(),
            dependents: IndexMap::new(),
            listeners: IndexMap::new(),
            stale_listeners: IndexMap::new(),
            active: false,
            source_subscription: None,
            emitted: None,
            queued: false,
            marked_epoch: None,
        }
    }

    fn is_hot(&self) -> bool {
        !self.dependents.is_empty() || !self.listeners.is_empty() || !self.stale_listeners.is_empty()
    }
}

struct PrismInner<T> {
    id: PrismId,
    this: Weak<PrismInner<T>>,
    derivation: Derivation<T>,
    cache: RefCell<Cache<T>>,
    computing: Cell<bool>,
}

/// Clears the computing flag even if the derivation unwinds.
struct ComputingGuard<'a>(&'a Cell<bool>);

impl<'a> ComputingGuard<'a> {
    fn new(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for ComputingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A memoized, dependency-tracked derived value.
///
/// Cloning a `Prism` creates a new handle to the **same** node: clones share
/// the cached value, the upstream subscriptions and the listeners.
///
/// # Example
///
/// ```rust,ignore
/// let atom = Atom::new(Value::map([("count", 1)]));
/// let count = atom.identity_prism(&path!["count"]);
/// let doubled = count.map(|v| v.as_i64().unwrap_or(0) * 2);
///
/// let _sub = doubled.subscribe(|v| println!("doubled: {v}"));
/// atom.set(Value::map([("count", 5)])); // prints "doubled: 10"
/// ```
pub struct Prism<T> {
    inner: Rc<PrismInner<T>>,
}

impl<T> Prism<T>
where
    T: Clone + Identity + 'static,
{
    /// Create a prism from a derivation.
    ///
    /// The derivation is not run until the value is first needed.
    pub fn new<F>(derive: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::from_derivation(Derivation::Derived(Box::new(derive)))
    }

    /// Create a source prism.
    ///
    /// `get` pulls the source's current value. `subscribe` registers a
    /// [`Notify`] callback that the source invokes when that value may have
    /// changed identity; it is called when the prism becomes hot, and the
    /// returned [`Subscription`] is dropped when it goes cold.
    pub fn source<S, G>(subscribe: S, get: G) -> Self
    where
        S: Fn(Notify) -> Subscription + 'static,
        G: Fn() -> T + 'static,
    {
        Self::from_derivation(Derivation::Source {
            subscribe: Box::new(subscribe),
            get: Box::new(get),
        })
    }

    fn from_derivation(derivation: Derivation<T>) -> Self {
        let inner = Rc::new_cyclic(|this| PrismInner {
            id: PrismId::new(),
            this: this.clone(),
            derivation,
            cache: RefCell::new(Cache::new()),
            computing: Cell::new(false),
        });
        Self { inner }
    }

    /// A prism of `f` applied to this prism's value.
    pub fn map<U, F>(&self, f: F) -> Prism<U>
    where
        U: Clone + Identity + 'static,
        F: Fn(&T) -> U + 'static,
    {
        let source = self.clone();
        Prism::new(move || f(&source.get_value()))
    }

    /// Get the current value, computing it if necessary.
    ///
    /// Inside another prism's derivation this also records the read as a
    /// dependency of that prism.
    ///
    /// # Panics
    ///
    /// Panics if called from this prism's own derivation.
    pub fn get_value(&self) -> T {
        self.inner.get_value()
    }

    /// Call `listener` with the new value whenever the value's identity
    /// changes. Listeners run once per update, after it completes.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        let id = SubscriberId::new();
        let became_hot = {
            let mut cache = self.inner.cache.borrow_mut();
            let was_hot = cache.is_hot();
            cache.listeners.insert(id, Rc::new(listener));
            !was_hot
        };
        if became_hot {
            self.inner.activate();
        }

        let needs_baseline = self.inner.cache.borrow().emitted.is_none();
        if needs_baseline {
            let value = self.inner.pull();
            self.inner.cache.borrow_mut().emitted = Some(value);
        }

        let inner = Rc::clone(&self.inner);
        Subscription::new(move || inner.remove_listener(id))
    }

    /// Call `listener` as soon as the prism may have become stale, while the
    /// update is still being propagated. The value must not be read from
    /// inside `listener`.
    pub fn on_stale<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + 'static,
    {
        let id = SubscriberId::new();
        let became_hot = {
            let mut cache = self.inner.cache.borrow_mut();
            let was_hot = cache.is_hot();
            cache.stale_listeners.insert(id, Rc::new(listener));
            !was_hot
        };
        if became_hot {
            self.inner.activate();
        }

        let inner = Rc::clone(&self.inner);
        Subscription::new(move || inner.remove_stale_listener(id))
    }

    /// Keep the prism hot without listening to it.
    pub fn keep_hot(&self) -> Subscription {
        self.subscribe(|_| {})
    }
}

impl<T> Prism<T> {
    pub fn id(&self) -> PrismId {
        self.inner.id
    }

    /// Whether anything subscribes to this prism.
    pub fn is_hot(&self) -> bool {
        self.inner.cache.borrow().is_hot()
    }

    pub fn state(&self) -> PrismState {
        self.inner.cache.borrow().state
    }

    /// Check if the prism has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.cache.borrow().value.is_some()
    }

    /// Number of dependencies read by the last derivation.
    pub fn dependency_count(&self) -> usize {
        self.inner.cache.borrow().dependencies.len()
    }

    /// Number of listeners plus hot downstream prisms.
    pub fn subscriber_count(&self) -> usize {
        let cache = self.inner.cache.borrow();
        cache.listeners.len() + cache.stale_listeners.len() + cache.dependents.len()
    }

    /// Whether two handles refer to the same prism.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<T> Clone for Prism<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Prism<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.inner.cache.borrow();
        f.debug_struct("Prism")
            .field("id", &self.inner.id)
            .field("state", &cache.state)
            .field("value", &cache.value)
            .field("hot", &cache.is_hot())
            .finish()
    }
}

impl<T> PrismInner<T>
where
    T: Clone + Identity + 'static,
{
    fn get_value(&self) -> T {
        let value = self.pull();
        if let Some(this) = self.this.upgrade() {
            TrackingContext::track(self.id, || {
                Rc::new(Observed {
                    prism: this,
                    value: value.clone(),
                }) as Rc<dyn Upstream>
            });
        }
        value
    }

    /// Bring the value up to date without recording a dependency.
    fn pull(&self) -> T {
        assert!(
            !self.computing.get(),
            "prism {:?} was read during its own derivation",
            self.id
        );

        match &self.derivation {
            Derivation::Source { get, .. } => {
                {
                    let cache = self.cache.borrow();
                    if cache.active && cache.state == PrismState::Clean {
                        if let Some(value) = &cache.value {
                            return value.clone();
                        }
                    }
                }

                let value = get();
                let mut cache = self.cache.borrow_mut();
                if cache.active {
                    cache.value = Some(value.clone());
                    cache.state = PrismState::Clean;
                }
                value
            }
            Derivation::Derived(derive) => {
                let (cached, trusted) = {
                    let cache = self.cache.borrow();
                    let trusted = cache.active && cache.state == PrismState::Clean;
                    (cache.value.clone(), trusted)
                };

                match cached {
                    Some(value) if trusted => value,
                    Some(value) if self.dependencies_current() => {
                        self.cache.borrow_mut().state = PrismState::Clean;
                        value
                    }
                    _ => self.recompute(derive.as_ref()),
                }
            }
        }
    }

    fn dependencies_current(&self) -> bool {
        let dependencies = self.cache.borrow().dependencies.clone();
        dependencies.iter().all(|dep| dep.is_current())
    }

    fn recompute(&self, derive: &dyn Fn() -> T) -> T {
        let frame = TrackingContext::enter(self.id);
        let value = {
            let _computing = ComputingGuard::new(&self.computing);
            derive()
        };
        let dependencies = frame.finish();
        trace!(
            prism = self.id.raw(),
            dependencies = dependencies.len(),
            "prism recomputed"
        );

        let (previous, active) = {
            let mut cache = self.cache.borrow_mut();
            cache.value = Some(value.clone());
            cache.state = PrismState::Clean;
            let previous = std::mem::replace(&mut cache.dependencies, dependencies.clone());
            (previous, cache.active)
        };
        if active {
            self.rewire(&previous, &dependencies);
        }
        value
    }

    /// Attach to newly read dependencies before detaching from dropped ones,
    /// so a dependency read both times never goes cold in between.
    fn rewire(&self, previous: &[Rc<dyn Upstream>], current: &[Rc<dyn Upstream>]) {
        let downstream: Weak<dyn Downstream> = self.this.clone();
        for dep in current {
            if !previous.iter().any(|p| p.id() == dep.id()) {
                dep.attach(self.id, downstream.clone());
            }
        }
        for dep in previous {
            if !current.iter().any(|c| c.id() == dep.id()) {
                dep.detach(self.id);
            }
        }
    }

    fn activate(&self) {
        if self.cache.borrow().active {
            return;
        }
        debug!(prism = self.id.raw(), "prism became hot");

        match &self.derivation {
            Derivation::Source { subscribe, .. } => {
                let this = self.this.clone();
                let notify: Notify = Rc::new(move || {
                    if let Some(inner) = this.upgrade() {
                        Runtime::batch(|| inner.mark(PrismState::Stale));
                    }
                });
                let subscription = subscribe(notify);

                let mut cache = self.cache.borrow_mut();
                cache.source_subscription = Some(subscription);
                cache.state = PrismState::Stale;
                cache.active = true;
            }
            Derivation::Derived(_) => {
                // A cold cache is only as good as its recorded dependencies.
                self.cache.borrow_mut().state = PrismState::MaybeStale;
                self.pull();

                let dependencies = {
                    let mut cache = self.cache.borrow_mut();
                    cache.active = true;
                    cache.dependencies.clone()
                };
                let downstream: Weak<dyn Downstream> = self.this.clone();
                for dep in &dependencies {
                    dep.attach(self.id, downstream.clone());
                }
            }
        }
    }

    fn deactivate(&self) {
        let (dependencies, subscription) = {
            let mut cache = self.cache.borrow_mut();
            if !cache.active {
                return;
            }
            cache.active = false;
            cache.emitted = None;
            (cache.dependencies.clone(), cache.source_subscription.take())
        };
        debug!(prism = self.id.raw(), "prism went cold");

        drop(subscription);
        for dep in dependencies {
            dep.detach(self.id);
        }
    }

    fn mark(&self, mark: PrismState) {
        let epoch = Runtime::epoch();
        let (dependents, stale_listeners, enqueue) = {
            let mut cache = self.cache.borrow_mut();
            let was_clean = cache.state == PrismState::Clean;
            cache.state = cache.state.escalate(mark);

            // Already dirty from this update: its dependents were marked then.
            if !was_clean && cache.marked_epoch == Some(epoch) {
                return;
            }
            cache.marked_epoch = Some(epoch);

            let enqueue = !cache.listeners.is_empty() && !cache.queued;
            if enqueue {
                cache.queued = true;
            }
            (
                cache.dependents.values().cloned().collect::<Vec<_>>(),
                cache.stale_listeners.values().cloned().collect::<Vec<_>>(),
                enqueue,
            )
        };

        if enqueue {
            if let Some(this) = self.this.upgrade() {
                Runtime::enqueue(this);
            }
        }
        for listener in stale_listeners {
            listener();
        }
        for dependent in dependents {
            if let Some(dependent) = dependent.upgrade() {
                dependent.mark_maybe_stale();
            }
        }
    }

    fn add_dependent(&self, id: PrismId, dependent: Weak<dyn Downstream>) {
        let became_hot = {
            let mut cache = self.cache.borrow_mut();
            let was_hot = cache.is_hot();
            cache.dependents.insert(id, dependent);
            !was_hot
        };
        if became_hot {
            self.activate();
        }
    }

    fn remove_dependent(&self, id: PrismId) {
        let became_cold = {
            let mut cache = self.cache.borrow_mut();
            cache.dependents.shift_remove(&id).is_some() && !cache.is_hot()
        };
        if became_cold {
            self.deactivate();
        }
    }

    fn remove_listener(&self, id: SubscriberId) {
        let became_cold = {
            let mut cache = self.cache.borrow_mut();
            let removed = cache.listeners.shift_remove(&id).is_some();
            // The next listener takes its own baseline.
            if removed && cache.listeners.is_empty() {
                cache.emitted = None;
            }
            removed && !cache.is_hot()
        };
        if became_cold {
            self.deactivate();
        }
    }

    fn remove_stale_listener(&self, id: SubscriberId) {
        let became_cold = {
            let mut cache = self.cache.borrow_mut();
            cache.stale_listeners.shift_remove(&id).is_some() && !cache.is_hot()
        };
        if became_cold {
            self.deactivate();
        }
    }
}

impl<T> Downstream for PrismInner<T>
where
    T: Clone + Identity + 'static,
{
    fn mark_maybe_stale(&self) {
        self.mark(PrismState::MaybeStale);
    }
}

impl<T> Pending for PrismInner<T>
where
    T: Clone + Identity + 'static,
{
    fn flush(&self) {
        let has_listeners = {
            let mut cache = self.cache.borrow_mut();
            cache.queued = false;
            !cache.listeners.is_empty()
        };
        if !has_listeners {
            return;
        }

        let value = self.pull();
        let listeners = {
            let mut cache = self.cache.borrow_mut();
            if cache.emitted.as_ref().is_some_and(|seen| seen.is_identical(&value)) {
                return;
            }
            cache.emitted = Some(value.clone());
            cache
                .listeners
                .iter()
                .map(|(id, listener)| (*id, Rc::clone(listener)))
                .collect::<Vec<_>>()
        };

        for (id, listener) in listeners {
            // A listener earlier in this loop may have unsubscribed this one.
            let registered = self.cache.borrow().listeners.contains_key(&id);
            if registered {
                listener(&value);
            }
        }
    }
}

/// A read recorded by a derivation.
struct Observed<T> {
    prism: Rc<PrismInner<T>>,
    value: T,
}

impl<T> Upstream for Observed<T>
where
    T: Clone + Identity + 'static,
{
    fn id(&self) -> PrismId {
        self.prism.id
    }

    fn is_current(&self) -> bool {
        self.prism.pull().is_identical(&self.value)
    }

    fn attach(&self, id: PrismId, dependent: Weak<dyn Downstream>) {
        self.prism.add_dependent(id, dependent);
    }

    fn detach(&self, id: PrismId) {
        self.prism.remove_dependent(id);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::untracked;

    /// A hand-driven source: holds a value and notifies on demand.
    #[derive(Clone)]
    struct ManualSource {
        value: Rc<Cell<i64>>,
        notifiers: Rc<RefCell<IndexMap<SubscriberId, Notify>>>,
    }

    impl ManualSource {
        fn new(value: i64) -> Self {
            Self {
                value: Rc::new(Cell::new(value)),
                notifiers: Rc::new(RefCell::new(IndexMap::new())),
            }
        }

        fn prism(&self) -> Prism<i64> {
            let notifiers = self.notifiers.clone();
            let value = self.value.clone();
            Prism::source(
                move |notify| {
                    let id = SubscriberId::new();
                    notifiers.borrow_mut().insert(id, notify);
                    let notifiers = notifiers.clone();
                    Subscription::new(move || {
                        notifiers.borrow_mut().shift_remove(&id);
                    })
                },
                move || value.get(),
            )
        }

        fn set(&self, value: i64) {
            self.value.set(value);
            let notifiers: Vec<Notify> = self.notifiers.borrow().values().cloned().collect();
            for notify in notifiers {
                notify();
            }
        }

        fn subscriber_count(&self) -> usize {
            self.notifiers.borrow().len()
        }
    }

    fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let count = Rc::new(Cell::new(0));
        (count.clone(), count)
    }

    #[test]
    fn prism_computes_on_first_access() {
        let (calls, calls_clone) = counter();
        let prism = Prism::new(move || {
            calls_clone.set(calls_clone.get() + 1);
            42_i64
        });

        // Not computed yet
        assert!(!prism.has_value());
        assert_eq!(calls.get(), 0);

        assert_eq!(prism.get_value(), 42);
        assert_eq!(calls.get(), 1);
        assert!(prism.has_value());
    }

    #[test]
    fn cold_prism_caches_while_dependencies_hold() {
        let source = ManualSource::new(3);
        let input = source.prism();
        let (calls, calls_clone) = counter();
        let doubled = Prism::new(move || {
            calls_clone.set(calls_clone.get() + 1);
            input.get_value() * 2
        });

        assert_eq!(doubled.get_value(), 6);
        assert_eq!(doubled.get_value(), 6);
        assert_eq!(calls.get(), 1);
        assert!(!doubled.is_hot());

        // No notification reaches a cold prism, but the pull notices.
        source.value.set(4);
        assert_eq!(doubled.get_value(), 8);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn subscribing_makes_the_chain_hot() {
        let source = ManualSource::new(1);
        let input = source.prism();
        let doubled = input.map(|v| v * 2);

        assert_eq!(source.subscriber_count(), 0);
        let sub = doubled.subscribe(|_| {});
        assert!(doubled.is_hot());
        assert!(input.is_hot());
        assert_eq!(source.subscriber_count(), 1);

        sub.unsubscribe();
        assert!(!doubled.is_hot());
        assert!(!input.is_hot());
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn listeners_receive_changed_values() {
        let source = ManualSource::new(1);
        let doubled = source.prism().map(|v| v * 2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();

        let _sub = doubled.subscribe(move |v| seen_clone.borrow_mut().push(*v));
        source.set(2);
        source.set(5);

        assert_eq!(*seen.borrow(), vec![4, 10]);
    }

    #[test]
    fn unchanged_results_are_not_delivered() {
        let source = ManualSource::new(1);
        let parity = source.prism().map(|v| v % 2);
        let (calls, calls_clone) = counter();

        let _sub = parity.subscribe(move |_| calls_clone.set(calls_clone.get() + 1));
        source.set(3);
        assert_eq!(calls.get(), 0);

        source.set(4);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn diamond_delivers_once_and_consistently() {
        let source = ManualSource::new(1);
        let input = source.prism();
        let left = input.map(|v| v + 1);
        let right = input.map(|v| v * 10);
        let (l, r) = (left.clone(), right.clone());
        let sum = Prism::new(move || l.get_value() + r.get_value());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = sum.subscribe(move |v| seen_clone.borrow_mut().push(*v));

        source.set(2);
        assert_eq!(*seen.borrow(), vec![3 + 20]);
    }

    #[test]
    fn batch_coalesces_notifications() {
        let source = ManualSource::new(0);
        let input = source.prism();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = input.subscribe(move |v| seen_clone.borrow_mut().push(*v));

        Runtime::batch(|| {
            source.set(1);
            source.set(2);
            source.set(3);
        });

        assert_eq!(*seen.borrow(), vec![3]);
    }

    #[test]
    fn dynamic_dependencies_are_released() {
        let flag = ManualSource::new(1);
        let a = ManualSource::new(10);
        let b = ManualSource::new(20);
        let (flag_p, a_p, b_p) = (flag.prism(), a.prism(), b.prism());
        let pick = Prism::new(move || {
            if flag_p.get_value() == 1 {
                a_p.get_value()
            } else {
                b_p.get_value()
            }
        });

        let _sub = pick.keep_hot();
        assert_eq!(pick.dependency_count(), 2);
        assert_eq!(a.subscriber_count(), 1);
        assert_eq!(b.subscriber_count(), 0);

        flag.set(0);
        assert_eq!(pick.get_value(), 20);
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn observers_share_one_upstream_subscription() {
        let source = ManualSource::new(1);
        let (calls, calls_clone) = counter();
        let input = source.prism();
        let derived = Prism::new(move || {
            calls_clone.set(calls_clone.get() + 1);
            input.get_value() + 1
        });

        let _a = derived.subscribe(|_| {});
        let _b = derived.subscribe(|_| {});
        assert_eq!(source.subscriber_count(), 1);

        source.set(7);
        assert_eq!(derived.get_value(), 8);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn resubscribing_a_prism_kept_hot_downstream_takes_a_fresh_baseline() {
        let source = ManualSource::new(1);
        let input = source.prism().map(|v| *v);
        let downstream = input.map(|v| v + 1);
        let _hot = downstream.keep_hot();

        let first = input.subscribe(|_| {});
        drop(first);
        source.set(2);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let _second = input.subscribe(move |v| seen_clone.borrow_mut().push(*v));
        assert_eq!(input.get_value(), 2);

        // Notified, but the value is still the one the listener started from.
        source.set(2);
        assert!(seen.borrow().is_empty());

        source.set(3);
        assert_eq!(*seen.borrow(), vec![3]);
    }

    #[test]
    fn on_stale_fires_during_propagation() {
        let source = ManualSource::new(1);
        let derived = source.prism().map(|v| v + 1);
        let (calls, calls_clone) = counter();

        let _sub = derived.on_stale(move || calls_clone.set(calls_clone.get() + 1));
        source.set(2);
        assert_eq!(calls.get(), 1);
        assert_eq!(derived.state(), PrismState::MaybeStale);

        assert_eq!(derived.get_value(), 3);
        assert_eq!(derived.state(), PrismState::Clean);
    }

    #[test]
    fn untracked_reads_do_not_become_dependencies() {
        let source = ManualSource::new(1);
        let input = source.prism();
        let derived = Prism::new(move || untracked(|| input.get_value()));

        assert_eq!(derived.get_value(), 1);
        assert_eq!(derived.dependency_count(), 0);
    }

    #[test]
    fn clone_shares_state() {
        let prism = Prism::new(|| 42_i64);
        assert_eq!(prism.get_value(), 42);

        let other = prism.clone();
        assert!(Prism::ptr_eq(&prism, &other));
        assert_eq!(prism.id(), other.id());
        assert!(other.has_value());
    }

    #[test]
    #[should_panic(expected = "during its own derivation")]
    fn self_reads_panic() {
        let slot: Rc<RefCell<Option<Prism<i64>>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();
        let prism = Prism::new(move || {
            let me = slot_clone.borrow().clone();
            me.map(|p| p.get_value()).unwrap_or(0)
        });
        *slot.borrow_mut() = Some(prism.clone());
        prism.get_value();
    }
}
