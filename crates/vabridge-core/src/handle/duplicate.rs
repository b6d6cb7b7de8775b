//! Duplication of stateful list handles.

use super::{ListArg, RawListHandle, StatefulRecord};
use std::ffi::c_void;
use std::ptr;
use tracing::trace;

/// A pristine snapshot of a stateful `va_list`.
///
/// Only ever copied from. Primitives see duplicates, never the template.
#[derive(Debug, Clone, Copy)]
pub struct RecordTemplate<R> {
    record: R,
}

impl<R: StatefulRecord> RecordTemplate<R> {
    /// Creates a template from a record value
    pub fn from_record(record: R) -> Self {
        Self { record }
    }

    /// Snapshots the record behind a raw handle.
    ///
    /// The source may be only 4-byte aligned, so it is read unaligned.
    ///
    /// # Safety
    ///
    /// `raw` must point to a readable, initialised `R`.
    pub unsafe fn read(raw: RawListHandle) -> Self {
        // SAFETY: guaranteed by the caller.
        let record = unsafe { ptr::read_unaligned(raw.as_ptr().cast::<R>()) };
        Self { record }
    }

    /// Returns the captured record
    pub fn record(&self) -> &R {
        &self.record
    }

    /// Copies the template into freshly allocated memory
    pub fn duplicate(&self) -> ScopedCopy<R> {
        let slot = Box::new(self.record);
        trace!(abi = R::ABI, "duplicated list handle");
        ScopedCopy { slot }
    }
}

/// An independent, single-use copy of a stateful record.
///
/// Released on drop, whether or not the call that consumed it succeeded.
#[derive(Debug)]
pub struct ScopedCopy<R: StatefulRecord> {
    slot: Box<R>,
}

impl<R: StatefulRecord> ScopedCopy<R> {
    /// Returns the copy's current contents
    pub fn record(&self) -> &R {
        &self.slot
    }

    /// Hands the copy to exactly one call, then releases it
    pub fn consume<T>(mut self, f: impl FnOnce(ListArg<'_>) -> T) -> T {
        let ptr: *mut c_void = ptr::addr_of_mut!(*self.slot).cast();
        f(ListArg::new(ptr))
    }
}

impl<R: StatefulRecord> Drop for ScopedCopy<R> {
    fn drop(&mut self) {
        trace!(abi = R::ABI, "released list handle duplicate");
    }
}
