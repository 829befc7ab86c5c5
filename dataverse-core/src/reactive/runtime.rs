//! Reactive Runtime
//!
//! The runtime coordinates the two phases of an update so that no observer
//! ever sees a half-propagated state.
//!
//! # How It Works
//!
//! 1. An update opens a batch. [`Atom::set`](crate::Atom::set) does this
//!    implicitly; [`Runtime::batch`] does it explicitly.
//!
//! 2. While the batch is open, changes are only *pushed*: source prisms are
//!    marked stale, their dependents are marked maybe-stale, and every prism
//!    with listeners is queued once.
//!
//! 3. When the outermost batch closes, the queue is flushed. Each queued prism
//!    *pulls* its value (recomputing only what actually changed) and delivers
//!    it to its listeners if its identity changed.
//!
//! # Threading
//!
//! The batch depth, epoch and queue are thread-local. Prisms and atoms are
//! `!Send`, so every batch that touches them runs on their thread.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// Something waiting for the end of the batch.
pub(crate) trait Pending {
    fn flush(&self);
}

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static EPOCH: Cell<u64> = const { Cell::new(0) };
    static QUEUE: RefCell<VecDeque<Rc<dyn Pending>>> = const { RefCell::new(VecDeque::new()) };
}

/// Restores the batch depth even if the batched closure unwinds.
struct DepthGuard;

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Entry points to the thread's reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Run `f` as one update. Prism listeners fire once, after `f` returns,
    /// with values consistent with everything `f` changed.
    ///
    /// Batches nest; only the outermost one flushes.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        let outermost = DEPTH.with(|depth| {
            let current = depth.get();
            depth.set(current + 1);
            current == 0
        });
        if outermost {
            EPOCH.with(|epoch| epoch.set(epoch.get().wrapping_add(1)));
        }

        let result = {
            let _depth = DepthGuard;
            f()
        };

        if outermost {
            Self::flush();
        }
        result
    }

    /// Whether a batch is open on this thread.
    pub fn in_batch() -> bool {
        DEPTH.with(|depth| depth.get() > 0)
    }

    /// Identifies the current outermost batch. Marks made under the same
    /// epoch have already been propagated.
    pub(crate) fn epoch() -> u64 {
        EPOCH.with(Cell::get)
    }

    /// Queue `pending` for the end of the current batch.
    pub(crate) fn enqueue(pending: Rc<dyn Pending>) {
        QUEUE.with(|queue| queue.borrow_mut().push_back(pending));
    }

    fn flush() {
        // Listeners may open new batches; those flush their own additions
        // from the same queue.
        while let Some(pending) = QUEUE.with(|queue| queue.borrow_mut().pop_front()) {
            pending.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        log: Rc<RefCell<Vec<&'static str>>>,
        name: &'static str,
    }

    impl Pending for Recorder {
        fn flush(&self) {
            self.log.borrow_mut().push(self.name);
        }
    }

    #[test]
    fn flushes_after_outermost_batch() {
        let log = Rc::new(RefCell::new(Vec::new()));

        Runtime::batch(|| {
            Runtime::enqueue(Rc::new(Recorder { log: log.clone(), name: "a" }));
            Runtime::batch(|| {
                Runtime::enqueue(Rc::new(Recorder { log: log.clone(), name: "b" }));
            });
            // Inner batch must not flush
            assert!(log.borrow().is_empty());
            assert!(Runtime::in_batch());
        });

        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert!(!Runtime::in_batch());
    }

    #[test]
    fn each_outermost_batch_gets_a_new_epoch() {
        let first = Runtime::batch(Runtime::epoch);
        let nested = Runtime::batch(|| {
            let outer = Runtime::epoch();
            let inner = Runtime::batch(Runtime::epoch);
            (outer, inner)
        });

        assert_ne!(first, nested.0);
        assert_eq!(nested.0, nested.1);
    }

    #[test]
    fn batch_returns_the_closure_result() {
        assert_eq!(Runtime::batch(|| 7), 7);
    }
}
