//! Element ownership model.
//!
//! Collections store elements by value. The three ownership disciplines map
//! onto native Rust ownership:
//!
//! - **Exclusive**: a plain `T` or `Box<T>`. Duplicating it produces an
//!   independent deep copy; dropping it destroys the element.
//! - **Transfer**: moving the value into the collection. The source binding
//!   is gone afterwards; nothing to model beyond move semantics.
//! - **Shared**: `Rc<T>`. Duplicating it bumps the reference count; the
//!   element outlives any single handle.
//!
//! Duplication is fallible on purpose. Bulk duplicate-inserts must be able
//! to unwind when a copy fails partway through (see `List::add_range_duplicate`),
//! and tests need a payload type whose copy fails on demand.

use std::rc::Rc;

use thiserror::Error;

/// Failure to produce a copy of an element.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("element duplication failed: {reason}")]
pub struct DuplicateError {
    pub reason: &'static str,
}

impl DuplicateError {
    pub fn new(reason: &'static str) -> DuplicateError {
        DuplicateError { reason }
    }
}

/// A fallible deep copy.
///
/// Like [`Clone`], but allowed to fail. Collections use this for
/// duplicate-mode insertion so a failing copy can abort (and roll back)
/// a bulk operation instead of panicking.
pub trait Duplicate: Sized {
    fn duplicate(&self) -> Result<Self, DuplicateError>;
}

macro_rules! duplicate_via_clone {
    ($($ty:ty)*) => {
        $(impl Duplicate for $ty {
            fn duplicate(&self) -> Result<Self, DuplicateError> {
                Ok(self.clone())
            }
        })*
    };
}

duplicate_via_clone! {
    u8 u16 u32 u64 u128 usize
    i8 i16 i32 i64 i128 isize
    bool char f32 f64
    String
}

/// Borrowed elements copy the reference.
impl<T: ?Sized> Duplicate for &'static T {
    fn duplicate(&self) -> Result<Self, DuplicateError> {
        Ok(*self)
    }
}

/// Exclusive handles copy their contents.
impl<T: Duplicate> Duplicate for Box<T> {
    fn duplicate(&self) -> Result<Self, DuplicateError> {
        Ok(Box::new(self.as_ref().duplicate()?))
    }
}

/// Shared handles copy the handle, not the element.
impl<T> Duplicate for Rc<T> {
    fn duplicate(&self) -> Result<Self, DuplicateError> {
        Ok(Rc::clone(self))
    }
}

impl<T: Duplicate> Duplicate for Option<T> {
    fn duplicate(&self) -> Result<Self, DuplicateError> {
        match self {
            Some(value) => Ok(Some(value.duplicate()?)),
            None => Ok(None),
        }
    }
}

impl<T: Duplicate> Duplicate for Vec<T> {
    fn duplicate(&self) -> Result<Self, DuplicateError> {
        let mut out = Vec::with_capacity(self.len());
        for item in self {
            out.push(item.duplicate()?);
        }
        Ok(out)
    }
}

impl<A: Duplicate, B: Duplicate> Duplicate for (A, B) {
    fn duplicate(&self) -> Result<Self, DuplicateError> {
        Ok((self.0.duplicate()?, self.1.duplicate()?))
    }
}
