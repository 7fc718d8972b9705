//! Resource manifest: which native libraries to stage and load.
//!
//! Generated at packaging time (`natives.json`) and read verbatim here; the
//! loader core never edits it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One native library the application needs.
///
/// Immutable once constructed. `variants` lists acceptable physical file
/// names in priority order, covering platform/arch naming differences
/// (e.g. `libfoo64.so` vs `libfoo.so`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryDescriptor {
    /// Logical name, used in diagnostics and for `runtime_init` references.
    pub name: String,

    /// Acceptable physical file names, tried in order.
    pub variants: Vec<String>,

    /// Expected SHA-256 of the staged file, lowercase hex.
    /// Staging is unverified for this descriptor when absent.
    #[serde(default)]
    pub checksum: Option<String>,
}

impl LibraryDescriptor {
    pub fn new(name: impl Into<String>, variants: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
            checksum: None,
        }
    }

    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

/// Post-load initialization entry point for the underlying runtime.
///
/// The boot sequencer only reaches `Ready` after this succeeds. The symbol is
/// resolved through the registry and cast to a call signature by the consumer
/// (the binary), never inside the loader core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeInit {
    /// File name of the registered library exporting the entry point.
    pub library: String,

    /// Exported init function, `extern "C" fn() -> i32`, zero on success.
    pub symbol: String,

    /// Optional debug-level setter, called when extended debugging is on.
    #[serde(default)]
    pub debug_symbol: Option<String>,
}

/// The full manifest: every descriptor plus the optional runtime init hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NativeManifest {
    pub libraries: Vec<LibraryDescriptor>,

    #[serde(default)]
    pub runtime_init: Option<RuntimeInit>,
}

impl NativeManifest {
    /// Load a manifest from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest at {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse manifest at {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_manifest() {
        let json = r#"{
            "libraries": [
                { "name": "core", "variants": ["libcore64.so", "libcore.so"] },
                { "name": "mixer", "variants": ["libmixer.so"], "checksum": "ab12" }
            ]
        }"#;

        let manifest: NativeManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.libraries.len(), 2);
        assert_eq!(manifest.libraries[0].variants[1], "libcore.so");
        assert!(manifest.libraries[0].checksum.is_none());
        assert_eq!(manifest.libraries[1].checksum.as_deref(), Some("ab12"));
        assert!(manifest.runtime_init.is_none());
    }

    #[test]
    fn parses_runtime_init() {
        let json = r#"{
            "libraries": [{ "name": "core", "variants": ["libcore.so"] }],
            "runtime_init": { "library": "libcore.so", "symbol": "rt_init" }
        }"#;

        let manifest: NativeManifest = serde_json::from_str(json).unwrap();
        let init = manifest.runtime_init.unwrap();
        assert_eq!(init.library, "libcore.so");
        assert_eq!(init.symbol, "rt_init");
        assert!(init.debug_symbol.is_none());
    }
}
