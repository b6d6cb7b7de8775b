//! # vabridge-core
//!
//! A library for safely formatting C `va_list` handles that arrive through
//! native callbacks.
//!
//! A `va_list` has to be consumed twice to produce a string: once to
//! measure the output and once to render it. On register-save calling
//! conventions (x86-64 System V, AAPCS64) the list is a cursor that the
//! first consumer advances in place, so a naive second call silently
//! formats garbage. This crate provides:
//!
//! - Per-architecture handle layouts and their duplication rules
//! - A two-phase measure/render protocol with scoped buffers
//! - Platform dispatch, resolved once at startup
//! - C callbacks and sessions that route native requests to the protocol
//!
//! ## Architecture
//!
//! - [`handle`]: `va_list` layouts, capture and single-use duplicates
//! - [`protocol`]: the two-phase formatter and its primitives
//! - [`decode`]: terminated buffer to text
//! - [`dispatch`]: (OS, architecture) to wiring
//! - [`session`]: C callbacks and request collection
//! - [`loader`]: symbol resolution for native entry points
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use vabridge_core::{Dispatch, DynamicLibrary, Formatter, NativePrimitives, Session};
//!
//! // Decide the wiring once, before any request
//! let dispatch = Dispatch::host()?;
//! let formatter = Formatter::new(&dispatch, NativePrimitives::for_dispatch(&dispatch)?);
//!
//! // Load the native library and let it call back with format requests
//! let library = DynamicLibrary::open("native/build/libnativeLibrary.x64.so")?;
//! let entry = unsafe { vabridge_core::loader::resolve_entry(&library, "triggerCallback")? };
//!
//! for output in unsafe { Session::new(formatter).trigger(entry)? } {
//!     println!("{}", output?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`FormatPrimitives`]: plug in other measure/render routines
//! - [`SymbolResolver`]: plug in other ways of finding entry points

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod decode;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod loader;
pub mod protocol;
pub mod session;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience
pub use decode::decode_terminated;
pub use dispatch::{Arch, Dispatch, Os, Platform, PrimitiveFamily};
pub use error::{Error, ErrorKind, Result};
pub use handle::{HandleLayout, ListHandle, RawListHandle};
#[cfg(unix)]
pub use loader::DynamicLibrary;
pub use loader::{StaticSymbols, SymbolResolver};
pub use protocol::{
    FormatPrimitives, FormatRequest, Formatter, FormatterConfig, NativePrimitives, RenderedBuffer,
};
pub use session::{FormatCallback, Session, TriggerFn};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
