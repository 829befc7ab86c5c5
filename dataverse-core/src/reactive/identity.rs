//! Identity comparison for memoized values.
//!
//! Prisms only notify downstream when their value's identity changes. For
//! reference-counted values that means "a different allocation"; for plain
//! scalars it means "a different value".

use std::rc::Rc;
use std::sync::Arc;

/// Values whose identity a prism can compare.
pub trait Identity {
    /// Whether `other` is the same value as far as change detection goes.
    fn is_identical(&self, other: &Self) -> bool;
}

macro_rules! identity_by_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identity for $ty {
                fn is_identical(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

identity_by_eq!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, &'static str,
);

impl<T: ?Sized> Identity for Rc<T> {
    fn is_identical(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Identity for Arc<T> {
    fn is_identical(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: Identity> Identity for Option<T> {
    fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.is_identical(b),
            (None, None) => true,
            _ => false,
        }
    }
}

// Owned vectors have no identity to share; compare their contents.
impl<T: PartialEq> Identity for Vec<T> {
    fn is_identical(&self, other: &Self) -> bool {
        self == other
    }
}

impl<A: Identity, B: Identity> Identity for (A, B) {
    fn is_identical(&self, other: &Self) -> bool {
        self.0.is_identical(&other.0) && self.1.is_identical(&other.1)
    }
}

impl<A: Identity, B: Identity, C: Identity> Identity for (A, B, C) {
    fn is_identical(&self, other: &Self) -> bool {
        self.0.is_identical(&other.0)
            && self.1.is_identical(&other.1)
            && self.2.is_identical(&other.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_compare_by_value() {
        assert!(5_i64.is_identical(&5));
        assert!(!5_i64.is_identical(&6));
        assert!(String::from("a").is_identical(&String::from("a")));
    }

    #[test]
    fn rc_compares_by_allocation() {
        let a = Rc::new(vec![1, 2]);
        let b = Rc::new(vec![1, 2]);
        assert!(a.is_identical(&a.clone()));
        assert!(!a.is_identical(&b));
    }

    #[test]
    fn options_and_tuples_compose() {
        assert!(Some(1_u8).is_identical(&Some(1)));
        assert!(!Some(1_u8).is_identical(&None));
        assert!((1_i32, true).is_identical(&(1, true)));
        assert!(!(1_i32, true).is_identical(&(1, false)));
    }
}
