use std::path::Path;

use libloading::os::unix::{Library as PosixLibrary, RTLD_LOCAL, RTLD_NOW};
use libloading::Library;

use crate::error::NativeLoaderError;

use super::LoaderStrategy;

/// `dlopen`-based strategy for Linux and macOS.
///
/// Opens with `RTLD_NOW` so an unresolved dependency fails the load itself
/// instead of surfacing at the first call into the module, and `RTLD_LOCAL`
/// so one library's exports cannot shadow another's.
pub struct PosixLoader;

impl LoaderStrategy for PosixLoader {
    fn open(&self, path: &Path) -> Result<Library, NativeLoaderError> {
        let library = unsafe { PosixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) }.map_err(
            |source| NativeLoaderError::LoadFailure {
                path: path.to_path_buf(),
                reason: source.to_string(),
            },
        )?;

        Ok(library.into())
    }

    fn describe(&self) -> &'static str {
        "posix-dlopen"
    }
}
