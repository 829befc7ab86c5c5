//! Tracking Context
//!
//! The tracking context records which prisms a derivation reads while it
//! runs. This is what makes dependency tracking automatic: a derivation just
//! calls `get_value()` on other prisms, and every read lands in the frame of
//! the derivation currently executing.
//!
//! # Implementation
//!
//! A thread-local stack holds one frame per running derivation. Entering a
//! derivation pushes a frame; finishing it pops the frame and hands back the
//! dependencies that were read. Nested derivations (a prism pulled from inside
//! another prism's derivation) push their own frame, so reads are attributed
//! to the innermost computation only.
//!
//! [`untracked`] pushes a frame that discards what it collects.

use std::cell::RefCell;
use std::rc::Rc;

use super::node::{PrismId, Upstream};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the tracking stack.
struct Frame {
    /// The prism whose derivation is running, or `None` for an untracked
    /// section.
    owner: Option<PrismId>,
    /// Dependencies read so far, in first-read order, without duplicates.
    dependencies: Vec<Rc<dyn Upstream>>,
}

/// Guard for one tracking frame.
///
/// The frame is popped by [`finish`](TrackingContext::finish) or, if the
/// derivation unwinds, when the guard is dropped.
pub(crate) struct TrackingContext {
    owner: Option<PrismId>,
    popped: bool,
}

impl TrackingContext {
    /// Start collecting dependencies for `owner`.
    pub(crate) fn enter(owner: PrismId) -> Self {
        Self::push(Some(owner))
    }

    fn push(owner: Option<PrismId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                owner,
                dependencies: Vec::new(),
            });
        });

        Self {
            owner,
            popped: false,
        }
    }

    /// The prism whose derivation is currently collecting reads, if any.
    pub(crate) fn current_owner() -> Option<PrismId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|frame| frame.owner))
    }

    /// Record a read. `record` is only built when a tracked frame is active
    /// and has not already seen dependency `id`.
    pub(crate) fn track<F>(id: PrismId, record: F)
    where
        F: FnOnce() -> Rc<dyn Upstream>,
    {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let Some(frame) = stack.last_mut() else {
                return;
            };
            if frame.owner.is_none() || frame.dependencies.iter().any(|dep| dep.id() == id) {
                return;
            }
            frame.dependencies.push(record());
        });
    }

    /// Pop the frame and return what it collected.
    pub(crate) fn finish(mut self) -> Vec<Rc<dyn Upstream>> {
        self.popped = true;
        self.pop().map(|frame| frame.dependencies).unwrap_or_default()
    }

    fn pop(&self) -> Option<Frame> {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        // Frames must be popped in the order they were pushed.
        if let Some(frame) = &popped {
            debug_assert_eq!(
                frame.owner, self.owner,
                "TrackingContext mismatch: expected {:?}, got {:?}",
                self.owner, frame.owner
            );
        }
        popped
    }
}

impl Drop for TrackingContext {
    fn drop(&mut self) {
        if !self.popped {
            self.pop();
        }
    }
}

/// Run `f` without recording any prism reads as dependencies of the
/// surrounding derivation.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _frame = TrackingContext::push(None);
    f()
}
