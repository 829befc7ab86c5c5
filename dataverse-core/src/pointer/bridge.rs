//! Reading through pointers.
//!
//! [`pointer_to_prism`] turns a pointer into the prism of the value it
//! addresses, building it at most once per pointer. [`val`] reads the
//! current value out of a pointer, a prism, or a plain value alike.

use std::rc::Rc;

use thiserror::Error;

use super::Pointer;
use crate::reactive::{Identity, Prism};
use crate::value::{display_path, Value};

/// The pointer's root cannot produce prisms.
#[derive(Debug, Clone, Error)]
#[error("pointer root at path {path} does not provide identity prisms")]
pub struct UnsupportedRootError {
    path: String,
}

impl UnsupportedRootError {
    /// The path of the offending pointer, rendered as `["a", 0]`.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// The prism of the value `pointer` addresses.
///
/// The prism is cached on the pointer: calling this twice with the same
/// pointer returns the same prism, while two pointers with equal paths get
/// independent ones.
pub fn pointer_to_prism(pointer: &Pointer) -> Result<Prism<Value>, UnsupportedRootError> {
    if let Some(prism) = pointer.cached_prism() {
        return Ok(prism);
    }

    let provider = Rc::clone(pointer.root())
        .identity_prism_provider()
        .ok_or_else(|| UnsupportedRootError {
            path: display_path(pointer.path()),
        })?;
    Ok(pointer.prism_or_insert_with(|| provider.identity_prism(pointer.path())))
}

/// Something [`val`] can read.
pub trait Val {
    type Output;

    fn val(&self) -> Result<Self::Output, UnsupportedRootError>;
}

impl Val for Pointer {
    type Output = Value;

    fn val(&self) -> Result<Value, UnsupportedRootError> {
        Ok(pointer_to_prism(self)?.get_value())
    }
}

impl<T> Val for Prism<T>
where
    T: Clone + Identity + 'static,
{
    type Output = T;

    fn val(&self) -> Result<T, UnsupportedRootError> {
        Ok(self.get_value())
    }
}

impl<V: Val> Val for Option<V> {
    type Output = Option<V::Output>;

    fn val(&self) -> Result<Self::Output, UnsupportedRootError> {
        self.as_ref().map(Val::val).transpose()
    }
}

macro_rules! val_by_clone {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Val for $ty {
                type Output = $ty;

                fn val(&self) -> Result<$ty, UnsupportedRootError> {
                    Ok(self.clone())
                }
            }
        )*
    };
}

val_by_clone!(Value, bool, i64, f64, String);

/// The current value behind `input`.
///
/// Pointers are read through their cached prism; prisms through
/// [`Prism::get_value`]. Plain values are returned as they are. Called from
/// a derivation, reads through pointers and prisms are tracked.
pub fn val<V: Val + ?Sized>(input: &V) -> Result<V::Output, UnsupportedRootError> {
    input.val()
}
