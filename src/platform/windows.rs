use std::path::Path;

use libloading::os::windows::{Library as WindowsLibrary, LOAD_WITH_ALTERED_SEARCH_PATH};
use libloading::Library;

use crate::error::NativeLoaderError;

use super::LoaderStrategy;

/// `LoadLibraryExW`-based strategy for Windows.
///
/// Loads with `LOAD_WITH_ALTERED_SEARCH_PATH` so a library's private
/// dependencies resolve relative to its own directory rather than the
/// process's default search order. This replaces the classic
/// `SetDllDirectory`-before-`LoadLibrary` dance, which mutates process-wide
/// state and races against any other thread touching the search path; the
/// flag scopes the altered search to this one load. It requires an absolute
/// path, which the registry guarantees by canonicalizing first.
pub struct WindowsLoader;

impl LoaderStrategy for WindowsLoader {
    fn open(&self, path: &Path) -> Result<Library, NativeLoaderError> {
        let library =
            unsafe { WindowsLibrary::load_with_flags(path, LOAD_WITH_ALTERED_SEARCH_PATH) }
                .map_err(|source| NativeLoaderError::LoadFailure {
                    path: path.to_path_buf(),
                    reason: source.to_string(),
                })?;

        Ok(library.into())
    }

    fn describe(&self) -> &'static str {
        "windows-loadlibrary"
    }
}
