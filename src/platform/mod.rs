//! Platform detection and the per-OS library loading primitive.
//!
//! Everything above this module is platform-agnostic: the registry asks a
//! [`LoaderStrategy`] to open a file as an executable module and works with
//! the resulting [`libloading::Library`] from there.

use std::path::Path;

use libloading::Library;

use crate::error::NativeLoaderError;

#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod windows;

/// The operating system the process is running on, classified once at boot.
///
/// Immutable process-wide fact. 32-bit targets classify as `Unsupported`
/// regardless of OS: no native payloads ship for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Windows,
    Linux,
    MacOs,
    Unsupported,
}

impl PlatformKind {
    /// Classify the running platform.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(not(target_pointer_width = "64")) {
            return Self::Unsupported;
        }

        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Unsupported
        }
    }

    #[must_use]
    pub fn is_supported(self) -> bool {
        self != Self::Unsupported
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Unsupported => "unsupported",
        };
        write!(f, "{name}")
    }
}

/// Per-OS primitive for opening a file as an executable module.
///
/// Symbol resolution happens on the returned [`Library`] itself; the strategy
/// only decides how the module is mapped in (binding policy, dependency
/// search behavior).
pub trait LoaderStrategy: Send + Sync {
    /// Open the module at `path`.
    ///
    /// `path` must be absolute; the registry canonicalizes before calling.
    ///
    /// # Errors
    /// Returns [`NativeLoaderError::LoadFailure`] carrying the OS diagnostic
    /// when the file is missing, has unresolved dependencies, or fails a
    /// platform gatekeeping check.
    fn open(&self, path: &Path) -> Result<Library, NativeLoaderError>;

    /// Short name for logging.
    fn describe(&self) -> &'static str;
}

/// Select the loader strategy for a detected platform.
///
/// # Errors
/// Returns [`NativeLoaderError::UnsupportedPlatform`] when no strategy exists
/// for `platform` (unrecognized OS, or an OS this build was not compiled for).
pub fn strategy_for(
    platform: PlatformKind,
) -> Result<&'static dyn LoaderStrategy, NativeLoaderError> {
    match platform {
        #[cfg(unix)]
        PlatformKind::Linux | PlatformKind::MacOs => Ok(&posix::PosixLoader),
        #[cfg(windows)]
        PlatformKind::Windows => Ok(&windows::WindowsLoader),
        other => Err(NativeLoaderError::UnsupportedPlatform(other.to_string())),
    }
}
