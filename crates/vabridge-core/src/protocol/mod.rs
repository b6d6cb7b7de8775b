//! Two-phase formatting of `va_list` requests.
//!
//! ## Protocol
//!
//! For every [`FormatRequest`] the [`Formatter`]:
//!
//! 1. Measures the output with a fresh one-shot handle
//! 2. Allocates `measured + 1` bytes
//! 3. Renders into the buffer with a second, independently derived handle
//! 4. Decodes the buffer and releases it
//!
//! Each phase gets its own handle because on register-save layouts the
//! first call leaves the cursor past the last argument. Reusing it makes
//! the second call read past the argument list without any error from the
//! C runtime.
//!
//! Nothing is decoded unless render succeeded and wrote exactly the number
//! of bytes that measure predicted.

mod primitives;

use crate::decode::decode_terminated;
use crate::dispatch::Dispatch;
use crate::error::{Error, Result};
use crate::handle::{HandleLayout, ListHandle, RawListHandle};
use std::ffi::{c_char, c_int, CStr};
use tracing::{debug, trace};

pub use primitives::{FormatPrimitives, NativePrimitives};

/// One format string and the argument list it refers to
#[derive(Debug, Clone, Copy)]
pub struct FormatRequest<'a> {
    format: &'a CStr,
    handle: ListHandle,
}

impl<'a> FormatRequest<'a> {
    /// Creates a request from an already captured handle.
    ///
    /// # Safety
    ///
    /// `handle` must hold the arguments `format` refers to and stay valid
    /// for `'a`.
    pub unsafe fn new(format: &'a CStr, handle: ListHandle) -> Self {
        Self { format, handle }
    }

    /// Builds a request from the raw values a C callback receives.
    ///
    /// # Safety
    ///
    /// `format` must be null or a NUL-terminated string valid for `'a`, and
    /// `args` must be a `va_list` in `layout` holding the arguments `format`
    /// refers to, valid for `'a`.
    pub unsafe fn from_raw(
        layout: HandleLayout,
        format: *const c_char,
        args: RawListHandle,
    ) -> Result<Self> {
        if format.is_null() {
            return Err(Error::InvalidRequest("null format string"));
        }
        // SAFETY: guaranteed by the caller.
        let format = unsafe { CStr::from_ptr(format) };
        // SAFETY: guaranteed by the caller.
        let handle = unsafe { ListHandle::capture(layout, args)? };
        Ok(Self { format, handle })
    }

    /// The format string
    pub fn format(&self) -> &'a CStr {
        self.format
    }

    /// The captured argument list
    pub fn handle(&self) -> &ListHandle {
        &self.handle
    }
}

/// Configuration for the formatter
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatterConfig {
    /// Largest accepted output in bytes, excluding the terminator (0 = unlimited)
    pub max_output_len: usize,
}

impl FormatterConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the largest accepted output length
    pub fn max_output_len(mut self, len: usize) -> Self {
        self.max_output_len = len;
        self
    }
}

/// The render target for one request: `measured + 1` zeroed bytes
#[derive(Debug)]
pub struct RenderedBuffer {
    bytes: Vec<u8>,
}

impl RenderedBuffer {
    fn allocate(measured: usize) -> Result<Self> {
        let size = measured
            .checked_add(1)
            .ok_or(Error::BufferAllocation { size: usize::MAX })?;

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| Error::BufferAllocation { size })?;
        bytes.resize(size, 0);
        Ok(Self { bytes })
    }

    /// The raw buffer, terminator slot included
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decodes the rendered text
    pub fn decode(&self) -> Result<String> {
        decode_terminated(&self.bytes)
    }
}

/// Runs the two-phase protocol against a set of primitives
#[derive(Debug, Clone)]
pub struct Formatter<P> {
    dispatch: Dispatch,
    primitives: P,
    config: FormatterConfig,
}

impl<P: FormatPrimitives> Formatter<P> {
    /// Creates a formatter with default configuration
    pub fn new(dispatch: &Dispatch, primitives: P) -> Self {
        Self::with_config(dispatch, primitives, FormatterConfig::default())
    }

    /// Creates a formatter with custom configuration
    pub fn with_config(dispatch: &Dispatch, primitives: P, config: FormatterConfig) -> Self {
        Self {
            dispatch: *dispatch,
            primitives,
            config,
        }
    }

    /// The dispatch this formatter was wired with
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Measures, renders and decodes one request
    pub fn format(&self, request: &FormatRequest<'_>) -> Result<String> {
        let measured = self.measure(request)?;
        let buffer = self.render(request, measured)?;
        let text = buffer.decode()?;
        debug!("Formatted {} bytes from {:?}", measured, request.format);
        Ok(text)
    }

    /// Phase one: the byte length of the output, excluding the terminator
    pub fn measure(&self, request: &FormatRequest<'_>) -> Result<usize> {
        self.check_layout(request)?;

        let code = request.handle.with_fresh(|args| {
            // SAFETY: a FormatRequest's handle always matches its format.
            unsafe { self.primitives.measure(request.format, args) }
        });
        let measured = non_negative(code).ok_or_else(|| Error::measurement(code))?;
        trace!("Measured {} bytes", measured);

        let limit = self.config.max_output_len;
        if limit > 0 && measured > limit {
            return Err(Error::OutputTooLarge {
                size: measured,
                limit,
            });
        }
        Ok(measured)
    }

    /// Phases two and three: allocate and render.
    ///
    /// The buffer is dropped before any error is returned.
    pub fn render(&self, request: &FormatRequest<'_>, measured: usize) -> Result<RenderedBuffer> {
        self.check_layout(request)?;

        let mut buffer = RenderedBuffer::allocate(measured)?;
        trace!("Allocated {} byte render buffer", buffer.bytes.len());

        let code = request.handle.with_fresh(|args| {
            // SAFETY: as in `measure`; the buffer is exclusively ours.
            unsafe { self.primitives.render(&mut buffer.bytes, request.format, args) }
        });
        let rendered = non_negative(code).ok_or_else(|| Error::render(code))?;
        if rendered != measured {
            return Err(Error::LengthMismatch { measured, rendered });
        }
        trace!("Rendered {} bytes", rendered);
        Ok(buffer)
    }

    fn check_layout(&self, request: &FormatRequest<'_>) -> Result<()> {
        let captured = request.handle.layout();
        if captured != self.dispatch.layout() {
            return Err(Error::internal(format!(
                "request captured as {} but dispatch uses {}",
                captured,
                self.dispatch.layout()
            )));
        }
        Ok(())
    }
}

fn non_negative(code: c_int) -> Option<usize> {
    usize::try_from(code).ok()
}
