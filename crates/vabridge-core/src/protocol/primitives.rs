//! Measure and render primitives.
//!
//! The [`FormatPrimitives`] trait is the seam between the protocol and the
//! C runtime. [`NativePrimitives`] binds it to the host's `printf` family.

use crate::dispatch::{Dispatch, PrimitiveFamily};
use crate::error::{Error, Result};
use crate::handle::ListArg;
use std::ffi::{c_int, CStr};

/// A pair of C-style routines that consume a `va_list`.
///
/// Both take the list as a [`ListArg`], which is moved into the call. An
/// implementation may freely advance whatever the handle points at.
pub trait FormatPrimitives {
    /// Returns the number of bytes `format` expands to, excluding the
    /// terminator, or a negative value on failure.
    ///
    /// # Safety
    ///
    /// `args` must hold the arguments `format` refers to, in the layout the
    /// implementation expects.
    unsafe fn measure(&self, format: &CStr, args: ListArg<'_>) -> c_int;

    /// Writes the expansion of `format` plus a terminator into `buffer` and
    /// returns the number of bytes written before the terminator, or a
    /// negative value on failure.
    ///
    /// # Safety
    ///
    /// Same as [`FormatPrimitives::measure`].
    unsafe fn render(&self, buffer: &mut [u8], format: &CStr, args: ListArg<'_>) -> c_int;
}

impl<P: FormatPrimitives + ?Sized> FormatPrimitives for &P {
    unsafe fn measure(&self, format: &CStr, args: ListArg<'_>) -> c_int {
        // SAFETY: forwarded contract.
        unsafe { (**self).measure(format, args) }
    }

    unsafe fn render(&self, buffer: &mut [u8], format: &CStr, args: ListArg<'_>) -> c_int {
        // SAFETY: forwarded contract.
        unsafe { (**self).render(buffer, format, args) }
    }
}

#[cfg(unix)]
mod sys {
    use std::ffi::{c_char, c_int, c_void};

    extern "C" {
        // `va_list` is either passed by value as a pointer or decays to a
        // pointer to the cursor record; both are one pointer-sized argument.
        pub(super) fn vsnprintf(
            s: *mut c_char,
            n: libc::size_t,
            format: *const c_char,
            ap: *mut c_void,
        ) -> c_int;
    }
}

#[cfg(windows)]
mod sys {
    use std::ffi::{c_char, c_int, c_void};

    // UCRT only ships these inline; the legacy library exports them.
    #[cfg_attr(target_env = "msvc", link(name = "legacy_stdio_definitions"))]
    #[cfg_attr(not(target_env = "msvc"), link(name = "msvcrt"))]
    extern "C" {
        pub(super) fn _vscprintf(format: *const c_char, ap: *mut c_void) -> c_int;
        pub(super) fn _vsnprintf(
            s: *mut c_char,
            n: libc::size_t,
            format: *const c_char,
            ap: *mut c_void,
        ) -> c_int;
    }
}

/// The host C runtime's formatting routines
#[derive(Debug, Clone, Copy)]
pub struct NativePrimitives {
    family: PrimitiveFamily,
}

impl NativePrimitives {
    /// Binds the primitives a dispatch asks for.
    ///
    /// Fails if that family is not the one linked into this build, e.g. a
    /// Windows dispatch resolved on a Linux host for inspection.
    pub fn for_dispatch(dispatch: &Dispatch) -> Result<Self> {
        let family = dispatch.primitives();
        if PrimitiveFamily::host() != Some(family) {
            return Err(Error::PrimitivesUnavailable {
                family: family.as_str(),
            });
        }
        Ok(Self { family })
    }

    /// Returns the bound family
    pub fn family(&self) -> PrimitiveFamily {
        self.family
    }
}

#[cfg(unix)]
impl FormatPrimitives for NativePrimitives {
    unsafe fn measure(&self, format: &CStr, args: ListArg<'_>) -> c_int {
        // SAFETY: a null buffer with size 0 only computes the length.
        unsafe { sys::vsnprintf(std::ptr::null_mut(), 0, format.as_ptr(), args.into_raw()) }
    }

    unsafe fn render(&self, buffer: &mut [u8], format: &CStr, args: ListArg<'_>) -> c_int {
        // SAFETY: vsnprintf writes at most `buffer.len()` bytes, terminator included.
        unsafe {
            sys::vsnprintf(
                buffer.as_mut_ptr().cast(),
                buffer.len(),
                format.as_ptr(),
                args.into_raw(),
            )
        }
    }
}

#[cfg(windows)]
impl FormatPrimitives for NativePrimitives {
    unsafe fn measure(&self, format: &CStr, args: ListArg<'_>) -> c_int {
        // SAFETY: forwarded contract.
        unsafe { sys::_vscprintf(format.as_ptr(), args.into_raw()) }
    }

    unsafe fn render(&self, buffer: &mut [u8], format: &CStr, args: ListArg<'_>) -> c_int {
        // SAFETY: _vsnprintf writes at most `buffer.len()` bytes and
        // terminates when the output is shorter than that.
        unsafe {
            sys::_vsnprintf(
                buffer.as_mut_ptr().cast(),
                buffer.len(),
                format.as_ptr(),
                args.into_raw(),
            )
        }
    }
}
