//! Terminated byte buffer to text.

use crate::error::{Error, Result};
use std::ffi::CStr;
use tracing::debug;

/// Decodes the bytes before the first NUL in `buffer` as UTF-8.
///
/// The scan never leaves `buffer`; a buffer without a terminator is
/// rejected instead of guessing a length. Invalid UTF-8 sequences are
/// replaced with U+FFFD.
pub fn decode_terminated(buffer: &[u8]) -> Result<String> {
    let text = CStr::from_bytes_until_nul(buffer)
        .map_err(|_| Error::MissingTerminator { len: buffer.len() })?;

    let bytes = text.to_bytes();
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_owned()),
        Err(e) => {
            debug!(
                "Rendered output is not valid UTF-8 after {} bytes, replacing",
                e.valid_up_to()
            );
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
