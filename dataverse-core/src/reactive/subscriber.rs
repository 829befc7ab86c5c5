//! Subscriber identities and subscription handles.
//!
//! Every listener registered with an atom scope or a prism gets a
//! [`SubscriberId`]. Registration hands back a [`Subscription`] that removes
//! the listener again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a registered listener.
///
/// Closures have no usable identity of their own, so listener sets are keyed
/// by this id instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered listener.
///
/// Dropping the handle, or calling [`unsubscribe`](Subscription::unsubscribe),
/// removes the listener. Both are idempotent.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Wrap the function that undoes a registration.
    pub fn new<F>(unsubscribe: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A subscription with nothing to undo.
    pub fn empty() -> Self {
        Self { unsubscribe: None }
    }

    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        self.run();
    }

    /// Whether the listener is still registered through this handle.
    pub fn is_active(&self) -> bool {
        self.unsubscribe.is_some()
    }

    fn run(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
