//! Prism graph nodes
//!
//! Prisms form a DAG whose edges are discovered while derivations run. Each
//! edge is stored twice: the dependent keeps an [`Upstream`] record of what it
//! read (and which value it saw), and the dependency keeps a weak
//! [`Downstream`] handle to push staleness through.

use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a prism in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrismId(u64);

impl PrismId {
    /// Generate a new unique prism ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for PrismId {
    fn default() -> Self {
        Self::new()
    }
}

/// Staleness of a prism's cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrismState {
    /// The cached value is up-to-date.
    Clean,

    /// Something upstream changed. The recorded dependencies must be checked
    /// before the cached value can be trusted.
    MaybeStale,

    /// The node definitely needs to recompute. Only source prisms are marked
    /// this way, by their own change notification.
    Stale,
}

impl PrismState {
    /// Combine with an incoming mark; the stronger state wins.
    pub(crate) fn escalate(self, mark: PrismState) -> PrismState {
        match (self, mark) {
            (PrismState::Stale, _) | (_, PrismState::Stale) => PrismState::Stale,
            (PrismState::MaybeStale, _) | (_, PrismState::MaybeStale) => PrismState::MaybeStale,
            _ => PrismState::Clean,
        }
    }
}

/// A dependency recorded during a derivation, together with the value the
/// derivation observed from it.
pub(crate) trait Upstream {
    fn id(&self) -> PrismId;

    /// Pull the dependency's current value and check it against the observed
    /// one.
    fn is_current(&self) -> bool;

    /// Start pushing staleness to `dependent`. May make the dependency hot.
    fn attach(&self, id: PrismId, dependent: Weak<dyn Downstream>);

    /// Stop pushing staleness to `id`. May make the dependency cold.
    fn detach(&self, id: PrismId);
}

/// The receiving end of a dependency edge.
pub(crate) trait Downstream {
    fn mark_maybe_stale(&self);
}
