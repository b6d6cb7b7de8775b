//! Native library loading.
//!
//! The formatting core never loads anything itself; it only needs some
//! [`SymbolResolver`] that can turn an entry point name into an address.
//! [`DynamicLibrary`] is the `dlopen`-backed resolver for Unix hosts.

use crate::error::{Error, Result};
use crate::session::TriggerFn;
use std::ffi::c_void;
use std::ptr::NonNull;

/// Resolves exported symbols by name
pub trait SymbolResolver {
    /// Returns the address of `name`, or [`Error::SymbolNotFound`]
    fn resolve(&self, name: &str) -> Result<NonNull<c_void>>;
}

/// Resolves `name` and treats it as a native trigger entry point.
///
/// # Safety
///
/// The symbol must be a function with the [`TriggerFn`] signature.
pub unsafe fn resolve_entry(resolver: &dyn SymbolResolver, name: &str) -> Result<TriggerFn> {
    let address = resolver.resolve(name)?;
    // SAFETY: the caller vouches for the signature; function and data
    // pointers have the same size on every supported platform.
    Ok(unsafe { std::mem::transmute::<*mut c_void, TriggerFn>(address.as_ptr()) })
}

#[cfg(unix)]
pub use self::unix::DynamicLibrary;

#[cfg(unix)]
mod unix {
    use super::SymbolResolver;
    use crate::error::{Error, Result};
    use std::ffi::{c_void, CStr, CString};
    use std::os::unix::ffi::OsStrExt;
    use std::path::{Path, PathBuf};
    use std::ptr::NonNull;
    use tracing::{debug, warn};

    /// A library opened with `dlopen`, closed on drop
    #[derive(Debug)]
    pub struct DynamicLibrary {
        handle: NonNull<c_void>,
        path: PathBuf,
    }

    impl DynamicLibrary {
        /// Opens the library at `path` with lazy binding
        pub fn open(path: impl AsRef<Path>) -> Result<Self> {
            let path = path.as_ref();
            let c_path = CString::new(path.as_os_str().as_bytes())?;

            // SAFETY: c_path is a valid NUL-terminated string.
            let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_LAZY) };
            let handle = NonNull::new(handle)
                .ok_or_else(|| Error::library_open(path, last_error()))?;

            debug!("Opened native library {}", path.display());
            Ok(Self {
                handle,
                path: path.to_path_buf(),
            })
        }

        /// Path the library was opened from
        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl SymbolResolver for DynamicLibrary {
        fn resolve(&self, name: &str) -> Result<NonNull<c_void>> {
            let c_name = CString::new(name)?;

            // SAFETY: clears any stale error so a null result can be told
            // apart from a symbol whose value is null.
            unsafe { libc::dlerror() };
            let address = unsafe { libc::dlsym(self.handle.as_ptr(), c_name.as_ptr()) };

            let address =
                NonNull::new(address).ok_or_else(|| Error::symbol_not_found(name, last_error()))?;
            debug!("Resolved {} in {}", name, self.path.display());
            Ok(address)
        }
    }

    impl Drop for DynamicLibrary {
        fn drop(&mut self) {
            // SAFETY: the handle came from dlopen and is closed exactly once.
            if unsafe { libc::dlclose(self.handle.as_ptr()) } != 0 {
                warn!(
                    "Failed to close native library {}: {}",
                    self.path.display(),
                    last_error()
                );
            }
        }
    }

    fn last_error() -> String {
        // SAFETY: dlerror returns null or a NUL-terminated thread-local message.
        let message = unsafe { libc::dlerror() };
        if message.is_null() {
            "unknown error".to_string()
        } else {
            unsafe { CStr::from_ptr(message) }
                .to_string_lossy()
                .into_owned()
        }
    }

}

/// Resolver over a fixed table of addresses, for hosts and tests that
/// link their entry points statically
#[derive(Debug, Default)]
pub struct StaticSymbols {
    symbols: Vec<(String, NonNull<c_void>)>,
}

impl StaticSymbols {
    /// Creates an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a trigger entry point under `name`
    pub fn with_entry(mut self, name: impl Into<String>, entry: TriggerFn) -> Self {
        let address = entry as *mut c_void;
        if let Some(address) = NonNull::new(address) {
            self.symbols.push((name.into(), address));
        }
        self
    }
}

impl SymbolResolver for StaticSymbols {
    fn resolve(&self, name: &str) -> Result<NonNull<c_void>> {
        self.symbols
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, address)| address)
            .ok_or_else(|| Error::symbol_not_found(name, "not registered"))
    }
}
