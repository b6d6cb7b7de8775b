//! Variadic argument list handles.
//!
//! A C `va_list` is an opaque, pointer-sized value whose meaning is fixed
//! by the calling convention of the call site. Nothing in its bytes says
//! which convention produced it, so the layout is always chosen up front
//! through [`HandleLayout`] and never inferred from content.
//!
//! ## Layouts
//!
//! - [`HandleLayout::Pointer`]: a plain pointer into a contiguous argument
//!   area. Formatting primitives take it by value, so the caller's copy is
//!   never advanced and the same pointer can be handed out any number of
//!   times.
//! - [`HandleLayout::SysVX64`] and [`HandleLayout::Aapcs64`]: the callee
//!   receives a pointer to a cursor record ([`SysVX64Record`],
//!   [`Aapcs64Record`]). Primitives advance that record in place while
//!   reading arguments, so every primitive call needs its own copy.
//!
//! ## Single use
//!
//! Primitives receive a [`ListArg`], which is moved into the call and
//! cannot be used again. Stateful copies are produced by
//! [`RecordTemplate::duplicate`] and are consumed by value:
//!
//! ```compile_fail
//! use vabridge_core::handle::{RecordTemplate, SysVX64Record};
//!
//! let template = RecordTemplate::from_record(SysVX64Record::default());
//! let copy = template.duplicate();
//! copy.consume(|arg| drop(arg));
//! // the copy was moved into the first call
//! copy.consume(|arg| drop(arg));
//! ```
//!
//! ```compile_fail
//! use vabridge_core::handle::{RecordTemplate, SysVX64Record};
//!
//! let template = RecordTemplate::from_record(SysVX64Record::default());
//! template.duplicate().consume(|arg| {
//!     let _first = arg.into_raw();
//!     let _second = arg.into_raw();
//! });
//! ```

mod duplicate;
mod record;

use crate::error::{Error, Result};
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;

pub use duplicate::{RecordTemplate, ScopedCopy};
pub use record::{Aapcs64Record, StatefulRecord, SysVX64Record};

/// In-memory shape of a `va_list` for a given calling convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleLayout {
    /// A single reusable pointer (i386, Windows, Apple arm64)
    Pointer,
    /// System V x86-64 register-save record
    SysVX64,
    /// AAPCS64 register-save record (Linux arm64)
    Aapcs64,
}

impl HandleLayout {
    /// Returns a short stable name for the layout
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleLayout::Pointer => "pointer",
            HandleLayout::SysVX64 => SysVX64Record::ABI,
            HandleLayout::Aapcs64 => Aapcs64Record::ABI,
        }
    }

    /// Returns true if each primitive call needs a fresh copy of the handle
    pub fn requires_duplication(&self) -> bool {
        !matches!(self, HandleLayout::Pointer)
    }

    /// Size in bytes of the value a primitive reads through the handle
    pub fn record_size(&self) -> usize {
        match self {
            HandleLayout::Pointer => std::mem::size_of::<*mut c_void>(),
            HandleLayout::SysVX64 => std::mem::size_of::<SysVX64Record>(),
            HandleLayout::Aapcs64 => std::mem::size_of::<Aapcs64Record>(),
        }
    }
}

impl fmt::Display for HandleLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The raw pointer-sized value a format callback receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct RawListHandle(*mut c_void);

impl RawListHandle {
    /// Wraps a raw `va_list` value
    pub fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    /// Returns the wrapped pointer
    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }

    /// Returns true if the handle is null
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

/// A list handle usable by exactly one primitive call
///
/// Not `Copy` or `Clone`: passing it to a primitive moves it.
#[derive(Debug)]
pub struct ListArg<'a> {
    ptr: *mut c_void,
    _scope: PhantomData<&'a mut c_void>,
}

impl<'a> ListArg<'a> {
    pub(crate) fn new(ptr: *mut c_void) -> Self {
        Self {
            ptr,
            _scope: PhantomData,
        }
    }

    /// Gives up the handle as the raw value to pass to a C primitive
    pub fn into_raw(self) -> *mut c_void {
        self.ptr
    }
}

/// A captured `va_list`, interpreted according to its layout
#[derive(Debug, Clone, Copy)]
pub enum ListHandle {
    /// Reusable pointer, passed through unchanged
    Simple(RawListHandle),
    /// System V x86-64 cursor, kept as a template and duplicated per call
    SysVX64(RecordTemplate<SysVX64Record>),
    /// AAPCS64 cursor, kept as a template and duplicated per call
    Aapcs64(RecordTemplate<Aapcs64Record>),
}

impl ListHandle {
    /// Captures a raw handle according to `layout`.
    ///
    /// Stateful layouts are snapshotted into a template immediately; the
    /// caller's record is read once here and never handed to a primitive.
    ///
    /// # Safety
    ///
    /// `raw` must be a `va_list` produced by a call site using `layout`, and
    /// the argument areas it refers to must stay alive for as long as the
    /// returned handle is used.
    pub unsafe fn capture(layout: HandleLayout, raw: RawListHandle) -> Result<Self> {
        if raw.is_null() {
            return Err(Error::InvalidRequest("null argument list handle"));
        }

        // SAFETY: non-null and produced by a `layout` call site per the contract.
        let handle = unsafe {
            match layout {
                HandleLayout::Pointer => ListHandle::Simple(raw),
                HandleLayout::SysVX64 => ListHandle::SysVX64(RecordTemplate::read(raw)),
                HandleLayout::Aapcs64 => ListHandle::Aapcs64(RecordTemplate::read(raw)),
            }
        };
        Ok(handle)
    }

    /// Returns the layout this handle was captured with
    pub fn layout(&self) -> HandleLayout {
        match self {
            ListHandle::Simple(_) => HandleLayout::Pointer,
            ListHandle::SysVX64(_) => HandleLayout::SysVX64,
            ListHandle::Aapcs64(_) => HandleLayout::Aapcs64,
        }
    }

    /// Runs `f` with a handle that is safe to consume once.
    ///
    /// Simple handles are passed through; stateful handles get a fresh
    /// duplicate that is released when `f` returns or unwinds.
    pub fn with_fresh<T>(&self, f: impl FnOnce(ListArg<'_>) -> T) -> T {
        match self {
            ListHandle::Simple(raw) => f(ListArg::new(raw.as_ptr())),
            ListHandle::SysVX64(template) => template.duplicate().consume(f),
            ListHandle::Aapcs64(template) => template.duplicate().consume(f),
        }
    }
}
