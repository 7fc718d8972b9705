//! Maps file names to loaded-library records.
//!
//! All `open` side effects are confined to `register`/`register_any`;
//! `retrieve`/`retrieve_any` are pure lookups. Registration is single-threaded
//! during boot and the map is treated as read-only once boot completes.

use std::collections::HashMap;
use std::os::raw::c_void;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use libloading::Library;
use tracing::{debug, info};

use crate::error::NativeLoaderError;
use crate::platform::LoaderStrategy;

/// A native library after a successful `open`.
///
/// Owned exclusively by the registry; consumers only ever hold `&LoadedLibrary`
/// and resolve symbols through it. The OS handle is released when the record
/// is dropped (registry teardown or process exit).
#[derive(Debug)]
pub struct LoadedLibrary {
    file_name: String,
    path: PathBuf,
    library: Library,
}

impl LoadedLibrary {
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve an exported symbol to a raw pointer.
    ///
    /// The cast to a typed call signature is the caller's responsibility and
    /// should happen at the narrowest possible boundary.
    ///
    /// # Errors
    /// [`NativeLoaderError::SymbolNotFound`] when the export table has no
    /// such name.
    pub fn symbol(&self, name: &str) -> Result<NonNull<c_void>, NativeLoaderError> {
        let not_found = || NativeLoaderError::SymbolNotFound {
            library: self.file_name.clone(),
            symbol: name.to_string(),
        };

        let address = unsafe {
            self.library
                .get::<*mut c_void>(name.as_bytes())
                .map(|symbol| *symbol)
        }
        .map_err(|_| not_found())?;

        NonNull::new(address).ok_or_else(not_found)
    }

    /// Resolve a symbol that is allowed to be missing.
    ///
    /// The explicit opt-in for optional exports; a `None` here is an ordinary
    /// result, never an error.
    #[must_use]
    pub fn optional_symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        self.symbol(name).ok()
    }
}

/// File name → [`LoadedLibrary`], with ordered candidate fallback.
pub struct NativeLibraryRegistry {
    lookup_paths: Vec<PathBuf>,
    strategy: &'static dyn LoaderStrategy,
    libraries: HashMap<String, LoadedLibrary>,
}

// Manual impl: the strategy is a trait object, so deriving is out; its
// `describe()` name is the useful part anyway.
impl std::fmt::Debug for NativeLibraryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibraryRegistry")
            .field("lookup_paths", &self.lookup_paths)
            .field("strategy", &self.strategy.describe())
            .field("libraries", &self.libraries)
            .finish()
    }
}

impl NativeLibraryRegistry {
    pub fn new(lookup_paths: Vec<PathBuf>, strategy: &'static dyn LoaderStrategy) -> Self {
        Self {
            lookup_paths,
            strategy,
            libraries: HashMap::new(),
        }
    }

    /// Search the lookup paths for `file_name`, open the first match and
    /// record it.
    ///
    /// First match wins: once a directory contains the file, later
    /// directories are never consulted.
    ///
    /// # Errors
    /// - [`NativeLoaderError::AlreadyRegistered`] if the name is taken;
    ///   re-registration never replaces a live handle, because symbol
    ///   pointers obtained earlier must stay valid.
    /// - [`NativeLoaderError::NotFound`] if no lookup path contains the file.
    /// - [`NativeLoaderError::LoadFailure`] from the loader strategy.
    pub fn register(&mut self, file_name: &str) -> Result<&LoadedLibrary, NativeLoaderError> {
        if self.libraries.contains_key(file_name) {
            return Err(NativeLoaderError::AlreadyRegistered(file_name.to_string()));
        }

        let found = self
            .lookup_paths
            .iter()
            .map(|dir| dir.join(file_name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| NativeLoaderError::NotFound(file_name.to_string()))?;

        // Absolute path: the Windows strategy's altered-search-path load
        // requires one, and diagnostics are clearer everywhere.
        let path = found.canonicalize()?;

        debug!(
            "Opening '{}' from {} via {}",
            file_name,
            path.display(),
            self.strategy.describe()
        );
        let library = self.strategy.open(&path)?;

        let loaded = LoadedLibrary {
            file_name: file_name.to_string(),
            path,
            library,
        };

        Ok(self
            .libraries
            .entry(file_name.to_string())
            .or_insert(loaded))
    }

    /// Try each candidate file name in order, returning the first that
    /// registers.
    ///
    /// # Errors
    /// [`NativeLoaderError::NoCandidateSucceeded`] only if every candidate
    /// fails.
    pub fn register_any<S: AsRef<str>>(
        &mut self,
        file_names: &[S],
    ) -> Result<&LoadedLibrary, NativeLoaderError> {
        for (index, file_name) in file_names.iter().enumerate() {
            let file_name = file_name.as_ref();
            match self.register(file_name) {
                // Reborrow by name: returning the `register` borrow directly
                // would pin `self` for the whole loop.
                Ok(_) => return self.retrieve(file_name),
                Err(e) => {
                    debug!("Candidate {index} '{file_name}' failed: {e}");
                }
            }
        }

        Err(NativeLoaderError::NoCandidateSucceeded(
            file_names.iter().map(|n| n.as_ref().to_string()).collect(),
        ))
    }

    /// Pure lookup; never triggers a load.
    ///
    /// # Errors
    /// [`NativeLoaderError::NotRegistered`] if the name was never registered.
    pub fn retrieve(&self, file_name: &str) -> Result<&LoadedLibrary, NativeLoaderError> {
        self.libraries
            .get(file_name)
            .ok_or_else(|| NativeLoaderError::NotRegistered(file_name.to_string()))
    }

    /// Lookup-only variant fallback, mirroring [`register_any`].
    ///
    /// [`register_any`]: Self::register_any
    ///
    /// # Errors
    /// [`NativeLoaderError::NoCandidateSucceeded`] if none of the names were
    /// ever registered.
    pub fn retrieve_any<S: AsRef<str>>(
        &self,
        file_names: &[S],
    ) -> Result<&LoadedLibrary, NativeLoaderError> {
        file_names
            .iter()
            .find_map(|name| self.libraries.get(name.as_ref()))
            .ok_or_else(|| {
                NativeLoaderError::NoCandidateSucceeded(
                    file_names.iter().map(|n| n.as_ref().to_string()).collect(),
                )
            })
    }

    #[must_use]
    pub fn is_registered(&self, file_name: &str) -> bool {
        self.libraries.contains_key(file_name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Release every handle now instead of at process exit.
    ///
    /// The explicit teardown path for tests and partial re-initialization.
    /// Any raw symbol pointer obtained earlier dangles after this; callers
    /// own that hazard.
    pub fn release_all(&mut self) {
        let count = self.libraries.len();
        self.libraries.clear();
        info!("Released {count} native library handle(s)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{strategy_for, PlatformKind};

    #[cfg(unix)]
    fn test_registry(paths: Vec<PathBuf>) -> NativeLibraryRegistry {
        let platform = if cfg!(target_os = "macos") {
            PlatformKind::MacOs
        } else {
            PlatformKind::Linux
        };
        NativeLibraryRegistry::new(paths, strategy_for(platform).unwrap())
    }

    #[cfg(unix)]
    #[test]
    fn registry_and_records_format_for_diagnostics() {
        let registry = test_registry(vec![PathBuf::from(".")]);
        let rendered = format!("{registry:?}");
        assert!(rendered.contains("NativeLibraryRegistry"));
        assert!(rendered.contains("posix-dlopen"));
    }

    #[cfg(unix)]
    #[test]
    fn retrieve_never_loads() {
        let registry = test_registry(vec![PathBuf::from(".")]);
        let err = registry.retrieve("never-registered.so").unwrap_err();
        assert!(matches!(err, NativeLoaderError::NotRegistered(_)));
        assert!(registry.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn register_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = test_registry(vec![dir.path().to_path_buf()]);
        let err = registry.register("libnothing.so").unwrap_err();
        assert!(matches!(err, NativeLoaderError::NotFound(_)));
        assert!(registry.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn register_any_fails_only_when_all_candidates_fail() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = test_registry(vec![dir.path().to_path_buf()]);

        let err = registry
            .register_any(&["liba.so", "libb.so"])
            .unwrap_err();
        match err {
            NativeLoaderError::NoCandidateSucceeded(candidates) => {
                assert_eq!(candidates, vec!["liba.so", "libb.so"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn garbage_file_surfaces_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("libjunk.so"), b"this is not an ELF file").unwrap();

        let mut registry = test_registry(vec![dir.path().to_path_buf()]);
        let err = registry.register("libjunk.so").unwrap_err();
        assert!(matches!(err, NativeLoaderError::LoadFailure { .. }));
        assert!(registry.is_empty());
    }
}
