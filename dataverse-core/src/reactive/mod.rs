//! Reactive Primitives
//!
//! This module implements the derivation layer: prisms, the tracking context
//! that discovers their dependencies, and the runtime that schedules their
//! notifications.
//!
//! # Concepts
//!
//! ## Prisms
//!
//! A [`Prism`] is a memoized derived value. When its derivation reads another
//! prism, that read is recorded as a dependency. The prism recomputes only
//! when one of the values it read has changed identity.
//!
//! ## Hot and Cold
//!
//! A prism nobody subscribes to is *cold*: it holds no upstream subscriptions
//! and revalidates its cache on every read by pulling its dependencies. A
//! subscribed prism is *hot*: changes are pushed to it, so a clean hot prism
//! answers reads straight from its cache.
//!
//! ## Batches
//!
//! Listeners of hot prisms run once per update, after all affected prisms
//! have been marked. See [`Runtime::batch`].
//!
//! # Implementation Notes
//!
//! Dependency tracking uses a thread-local stack of frames, one per running
//! derivation. Everything here is single-threaded: prisms share state through
//! `Rc` and `RefCell` and are neither `Send` nor `Sync`.

mod context;
mod identity;
mod node;
mod prism;
mod runtime;
mod subscriber;

pub use context::untracked;
pub(crate) use context::TrackingContext;
pub use identity::Identity;
pub use node::{PrismId, PrismState};
pub use prism::{Notify, Prism};
pub use runtime::Runtime;
pub use subscriber::{SubscriberId, Subscription};
