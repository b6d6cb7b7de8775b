//! Platform dispatch.
//!
//! Picks, once at startup, how `va_list` handles look on the running
//! platform and which C formatting routines consume them. The resulting
//! [`Dispatch`] is handed to the formatter; nothing consults the platform
//! again per request.
//!
//! ```
//! use vabridge_core::dispatch::{Dispatch, Platform};
//! use vabridge_core::handle::HandleLayout;
//!
//! let dispatch = Dispatch::resolve(&Platform::new("linux", "x86_64"))?;
//! assert_eq!(dispatch.layout(), HandleLayout::SysVX64);
//! assert!(dispatch.requires_duplication());
//!
//! assert!(Dispatch::resolve(&Platform::new("linux", "riscv64")).is_err());
//! # Ok::<(), vabridge_core::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::handle::HandleLayout;
use crate::session::{self, FormatCallback};
use std::fmt;
use tracing::debug;

/// Operating systems with a known wiring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    /// Linux (glibc or musl)
    Linux,
    /// macOS
    MacOs,
    /// Windows
    Windows,
}

impl Os {
    /// Returns the name used by `std::env::consts::OS`
    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::MacOs => "macos",
            Os::Windows => "windows",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "linux" => Some(Os::Linux),
            "macos" => Some(Os::MacOs),
            "windows" => Some(Os::Windows),
            _ => None,
        }
    }

    fn library_extension(&self) -> &'static str {
        match self {
            Os::Linux => "so",
            Os::MacOs => "dylib",
            Os::Windows => "dll",
        }
    }
}

/// Processor architectures with a known wiring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 32-bit x86
    X86,
    /// x86-64
    X86_64,
    /// 64-bit Arm
    Aarch64,
}

impl Arch {
    /// Returns the name used by `std::env::consts::ARCH`
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }

    /// Returns the short label used in native library file names
    pub fn label(&self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x64",
            Arch::Aarch64 => "arm64",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "x86" | "i386" | "i586" | "i686" => Some(Arch::X86),
            "x86_64" | "amd64" | "x64" => Some(Arch::X86_64),
            "aarch64" | "arm64" => Some(Arch::Aarch64),
            _ => None,
        }
    }
}

/// Which C runtime routines measure and render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveFamily {
    /// `vsnprintf(NULL, 0, ..)` then `vsnprintf(buf, len, ..)`
    Posix,
    /// `_vscprintf` then `_vsnprintf`
    Msvcrt,
}

impl PrimitiveFamily {
    /// Returns a short stable name for the family
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveFamily::Posix => "posix",
            PrimitiveFamily::Msvcrt => "msvcrt",
        }
    }

    /// Returns the family linked into this build, if any
    pub fn host() -> Option<Self> {
        if cfg!(windows) {
            Some(PrimitiveFamily::Msvcrt)
        } else if cfg!(unix) {
            Some(PrimitiveFamily::Posix)
        } else {
            None
        }
    }
}

/// An operating system and architecture pair, as free-form names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Operating system name
    pub os: String,
    /// Architecture name
    pub arch: String,
}

impl Platform {
    /// Creates a platform from names
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Returns the platform this process runs on
    pub fn host() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

const SUPPORTED: &[(Os, Arch, HandleLayout, PrimitiveFamily)] = &[
    (Os::Linux, Arch::X86, HandleLayout::Pointer, PrimitiveFamily::Posix),
    (Os::Linux, Arch::X86_64, HandleLayout::SysVX64, PrimitiveFamily::Posix),
    (Os::Linux, Arch::Aarch64, HandleLayout::Aapcs64, PrimitiveFamily::Posix),
    (Os::MacOs, Arch::X86_64, HandleLayout::SysVX64, PrimitiveFamily::Posix),
    (Os::MacOs, Arch::Aarch64, HandleLayout::Pointer, PrimitiveFamily::Posix),
    (Os::Windows, Arch::X86, HandleLayout::Pointer, PrimitiveFamily::Msvcrt),
    (Os::Windows, Arch::X86_64, HandleLayout::Pointer, PrimitiveFamily::Msvcrt),
    (Os::Windows, Arch::Aarch64, HandleLayout::Pointer, PrimitiveFamily::Msvcrt),
];

/// The complete wiring for one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    os: Os,
    arch: Arch,
    layout: HandleLayout,
    primitives: PrimitiveFamily,
}

impl Dispatch {
    /// Resolves the wiring for `platform`.
    ///
    /// Fails with [`Error::UnsupportedPlatform`] for any pair outside the
    /// supported table.
    pub fn resolve(platform: &Platform) -> Result<Self> {
        let unsupported = || Error::unsupported_platform(&platform.os, &platform.arch);

        let os = Os::parse(&platform.os).ok_or_else(unsupported)?;
        let arch = Arch::parse(&platform.arch).ok_or_else(unsupported)?;

        let &(os, arch, layout, primitives) = SUPPORTED
            .iter()
            .find(|(o, a, _, _)| *o == os && *a == arch)
            .ok_or_else(unsupported)?;

        let dispatch = Self {
            os,
            arch,
            layout,
            primitives,
        };
        debug!("Resolved dispatch for {}: {}", platform, dispatch);
        Ok(dispatch)
    }

    /// Resolves the wiring for the running process
    pub fn host() -> Result<Self> {
        Self::resolve(&Platform::host())
    }

    /// Returns every supported wiring
    pub fn supported() -> impl Iterator<Item = Dispatch> {
        SUPPORTED
            .iter()
            .map(|&(os, arch, layout, primitives)| Dispatch {
                os,
                arch,
                layout,
                primitives,
            })
    }

    /// Operating system of this wiring
    pub fn os(&self) -> Os {
        self.os
    }

    /// Architecture of this wiring
    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// `va_list` layout in play
    pub fn layout(&self) -> HandleLayout {
        self.layout
    }

    /// Formatting primitives to call
    pub fn primitives(&self) -> PrimitiveFamily {
        self.primitives
    }

    /// Whether each primitive call needs its own copy of the handle
    pub fn requires_duplication(&self) -> bool {
        self.layout.requires_duplication()
    }

    /// The C callback native code should invoke with format requests
    pub fn callback(&self) -> FormatCallback {
        session::callback_for(self.layout)
    }

    /// File name of a native library built for this wiring,
    /// e.g. `libnativeLibrary.x64.so`
    pub fn library_file_name(&self, stem: &str) -> String {
        format!(
            "lib{}.{}.{}",
            stem,
            self.arch.label(),
            self.os.library_extension()
        )
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}: {} handles, {} primitives",
            self.os.as_str(),
            self.arch.as_str(),
            self.layout,
            self.primitives.as_str()
        )?;
        if self.requires_duplication() {
            f.write_str(", duplicated per call")?;
        }
        Ok(())
    }
}
