//! Error types for the vabridge-core library.
//!
//! This module provides error handling using the `thiserror` crate, with
//! one variant per failure mode of dispatch, formatting, decoding and
//! library loading.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vabridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unsupported platform, detected before any request is processed
    Configuration,
    /// The measure primitive failed
    Measurement,
    /// The render primitive failed or produced an inconsistent result
    Render,
    /// The rendered buffer could not be turned into text
    Decode,
    /// Opening a library or resolving a symbol failed
    Loader,
    /// A request was malformed or the bridge itself misbehaved
    Internal,
}

/// Error type for all vabridge operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No wiring exists for this operating system and architecture
    #[error("unsupported platform: os '{os}', arch '{arch}'")]
    UnsupportedPlatform {
        /// Operating system name as detected or requested
        os: String,
        /// Architecture name as detected or requested
        arch: String,
    },

    /// The formatting primitives for a dispatch are not linked into this build
    #[error("{family} formatting primitives are not available on this host")]
    PrimitivesUnavailable {
        /// Name of the primitive family that was requested
        family: &'static str,
    },

    /// The measure primitive returned a negative value
    #[error("measuring formatted length failed with code {code}")]
    Measurement {
        /// Raw return value of the primitive
        code: i32,
    },

    /// The render primitive returned a negative value
    #[error("rendering formatted output failed with code {code}")]
    Render {
        /// Raw return value of the primitive
        code: i32,
    },

    /// Render wrote a different number of bytes than measure predicted
    #[error("rendered {rendered} bytes but {measured} were measured")]
    LengthMismatch {
        /// Byte count returned by the measure primitive
        measured: usize,
        /// Byte count returned by the render primitive
        rendered: usize,
    },

    /// Measured output exceeds the configured ceiling
    #[error("formatted output of {size} bytes exceeds the limit of {limit} bytes")]
    OutputTooLarge {
        /// Measured size in bytes, excluding the terminator
        size: usize,
        /// Configured maximum
        limit: usize,
    },

    /// The render buffer could not be allocated
    #[error("failed to allocate a {size}-byte render buffer")]
    BufferAllocation {
        /// Requested buffer size including the terminator
        size: usize,
    },

    /// Rendered buffer has no terminator within its bounds
    #[error("rendered buffer of {len} bytes has no terminator")]
    MissingTerminator {
        /// Length of the scanned buffer
        len: usize,
    },

    /// A format request arrived with a null format or null list handle
    #[error("invalid format request: {0}")]
    InvalidRequest(&'static str),

    /// Failed to open a dynamic library
    #[error("failed to open library '{path}': {message}")]
    LibraryOpen {
        /// Path handed to the loader
        path: PathBuf,
        /// Loader diagnostic
        message: String,
    },

    /// Failed to resolve a symbol in an open library
    #[error("failed to resolve symbol '{symbol}': {message}")]
    SymbolNotFound {
        /// Symbol name that was looked up
        symbol: String,
        /// Loader diagnostic
        message: String,
    },

    /// A string destined for C contained an interior NUL byte
    #[error("string contains an interior NUL byte: {0}")]
    InteriorNul(#[from] std::ffi::NulError),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new unsupported platform error
    pub fn unsupported_platform(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Creates a new measurement failure
    pub fn measurement(code: i32) -> Self {
        Self::Measurement { code }
    }

    /// Creates a new render failure
    pub fn render(code: i32) -> Self {
        Self::Render { code }
    }

    /// Creates a new library open error
    pub fn library_open(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::LibraryOpen {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new symbol lookup error
    pub fn symbol_not_found(symbol: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SymbolNotFound {
            symbol: symbol.into(),
            message: message.into(),
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the broad classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedPlatform { .. } | Self::PrimitivesUnavailable { .. } => {
                ErrorKind::Configuration
            }
            Self::Measurement { .. } | Self::OutputTooLarge { .. } => ErrorKind::Measurement,
            Self::Render { .. } | Self::LengthMismatch { .. } | Self::BufferAllocation { .. } => {
                ErrorKind::Render
            }
            Self::MissingTerminator { .. } => ErrorKind::Decode,
            Self::LibraryOpen { .. } | Self::SymbolNotFound { .. } | Self::InteriorNul(_) => {
                ErrorKind::Loader
            }
            Self::InvalidRequest(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if this error must stop processing before any request runs
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration | ErrorKind::Loader)
    }
}
