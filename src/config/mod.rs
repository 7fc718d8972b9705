use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Boot configuration, read from `boot.json`.
///
/// Parsed once before boot; the loader core only reads the resulting struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootConfig {
    /// Skip SHA-256 verification of staged payloads. Development builds only;
    /// the boot sequencer warns loudly when this is set.
    #[serde(default)]
    pub skip_checksum_verification: bool,

    /// Ask the runtime for maximum debug output after initialization.
    #[serde(default)]
    pub enable_extended_debugging: bool,

    /// Directories searched for native libraries, most specific first.
    /// The staging directory is always searched before these.
    #[serde(default = "default_lookup_directories")]
    pub lookup_directories: Vec<PathBuf>,

    /// Where extracted payloads land before loading.
    #[serde(default = "default_staging_directory")]
    pub staging_directory: PathBuf,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            skip_checksum_verification: false,
            enable_extended_debugging: false,
            lookup_directories: default_lookup_directories(),
            staging_directory: default_staging_directory(),
        }
    }
}

impl BootConfig {
    /// Load the config from `path`, writing defaults back when the file is
    /// missing or invalid so users have something to edit next run.
    ///
    /// # Errors
    /// Returns an error only if the defaults cannot be serialized or written.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => Ok(config),
                Err(e) => {
                    warn!(
                        "Invalid boot config at {} ({e}); writing defaults",
                        path.display()
                    );
                    Self::write_defaults(path)
                }
            },
            Err(_) => {
                warn!("No boot config at {}; writing defaults", path.display());
                Self::write_defaults(path)
            }
        }
    }

    fn write_defaults(path: &Path) -> Result<Self> {
        let config = Self::default();
        let json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default boot config")?;

        fs::write(path, json).with_context(|| {
            format!("Failed to write default boot config to {}", path.display())
        })?;

        Ok(config)
    }
}

fn default_lookup_directories() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    // Next to the executable first, then the working directory.
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            dirs.push(dir.to_path_buf());
        }
    }
    dirs.push(PathBuf::from("."));

    dirs
}

fn default_staging_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("kindling")
        .join("natives")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_verifies_checksums() {
        let config = BootConfig::default();
        assert!(!config.skip_checksum_verification);
        assert!(!config.enable_extended_debugging);
        assert!(!config.lookup_directories.is_empty());
    }

    #[test]
    fn missing_file_writes_defaults_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boot.json");

        let config = BootConfig::load_or_create(&path).unwrap();
        assert!(!config.skip_checksum_verification);
        assert!(path.exists());

        // A second load parses the file that was just written.
        let reloaded = BootConfig::load_or_create(&path).unwrap();
        assert_eq!(
            reloaded.skip_checksum_verification,
            config.skip_checksum_verification
        );
        assert_eq!(reloaded.staging_directory, config.staging_directory);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boot.json");
        fs::write(&path, r#"{ "skip_checksum_verification": true }"#).unwrap();

        let config = BootConfig::load_or_create(&path).unwrap();
        assert!(config.skip_checksum_verification);
        assert!(!config.enable_extended_debugging);
        assert!(!config.lookup_directories.is_empty());
    }
}
