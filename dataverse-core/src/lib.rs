//! Dataverse Core
//!
//! This crate provides the reactive state runtime for Dataverse.
//! It implements:
//!
//! - Atoms: a mutable root value observable at any sub-path
//! - Pointers: cheap, identity-carrying addresses into an atom
//! - Prisms: memoized derived values with automatic dependency tracking
//! - Glitch-free, batched change delivery
//!
//! Everything is single-threaded. Atoms, pointers and prisms are `Rc`-based
//! and must stay on the thread that created them.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the immutable snapshot type and path segments
//! - `atom`: the atom and its scope tree of path listeners
//! - `pointer`: pointers, root capabilities and the pointer-to-prism bridge
//! - `reactive`: prisms, dependency tracking and the batch runtime
//!
//! # Example
//!
//! ```rust,ignore
//! use dataverse_core::{pointer_to_prism, val, Atom, Prism, Value};
//!
//! // Create an atom
//! let atom = Atom::new(Value::map([("count", 1)]));
//! let count = atom.pointer().prop("count");
//!
//! // Create a derived value
//! let doubled = Prism::new(move || {
//!     val(&count).ok().and_then(|v| v.as_i64()).unwrap_or(0) * 2
//! });
//!
//! // Listen to it
//! let _sub = doubled.subscribe(|v| println!("doubled: {v}"));
//!
//! // Update the atom
//! atom.set_by_pointer(|root| root.prop("count"), 5);
//! // Listener runs once, prints: "doubled: 10"
//! ```

pub mod atom;
pub mod pointer;
pub mod reactive;
pub mod value;

pub use atom::Atom;
pub use pointer::{
    get_pointer_parts, is_pointer, pointer_to_prism, val, IdentityPrismProvider, Pointer,
    PointerParts, PointerRoot, UnsupportedRootError, Val,
};
pub use reactive::{untracked, Identity, Prism, Runtime, Subscription};
pub use value::{Path, PathSegment, Shape, Value};
