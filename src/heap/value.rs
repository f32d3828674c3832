//! Tagged values: the single machine word every heap slot, context slot and
//! map entry ultimately holds.
//!
//! Low bit set -> unboxed small integer, remaining bits are the integer
//! shifted right by one. Low bit clear -> either `nil` (the null pointer) or
//! a pointer to a heap cell whose first byte is a tag (see `super::cell`).

use std::fmt;
use wtf_rs::tagged_pointer::{bit_is_set, with_bit, without_bit};

/// A single tagged machine word.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(pub u64);

impl Value {
    pub const NIL: Value = Value(0);

    #[inline]
    pub fn from_ptr(ptr: *mut u8) -> Value {
        debug_assert_eq!(ptr as u64 & 1, 0, "heap pointers must have their low bit clear");
        Value(ptr as u64)
    }

    #[inline]
    pub fn from_smi(n: i64) -> Value {
        Value(with_bit((n << 1) as u64, 0))
    }

    #[inline]
    pub fn is_nil(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_smi(self) -> bool {
        bit_is_set(self.0, 0)
    }

    #[inline]
    pub fn is_heap_ptr(self) -> bool {
        self.0 != 0 && !bit_is_set(self.0, 0)
    }

    /// Untags and arithmetic-shifts back to the represented integer.
    ///
    /// Panics if this value is not a small integer.
    #[inline]
    pub fn as_smi(self) -> i64 {
        assert!(self.is_smi(), "Value is not an unboxed integer");
        (self.0 as i64) >> 1
    }

    #[inline]
    pub fn as_ptr(self) -> *mut u8 {
        debug_assert!(self.is_heap_ptr());
        self.0 as *mut u8
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "nil")
        } else if self.is_smi() {
            write!(f, "smi({})", self.as_smi())
        } else {
            write!(f, "ptr({:#x})", self.0)
        }
    }
}
