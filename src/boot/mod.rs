//! The boot state machine: detect platform, stage payloads, load natives,
//! run post-load initialization.
//!
//! Boot is single-threaded and strictly ordered. There is no partial-boot
//! mode and no mid-boot cancellation: any failure transitions to `Failed`
//! and the caller is expected to terminate, because downstream subsystems
//! assume every native is present.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::BootConfig;
use crate::error::NativeLoaderError;
use crate::extract::NativeExtractor;
use crate::manifest::NativeManifest;
use crate::platform::{strategy_for, PlatformKind};
use crate::registry::NativeLibraryRegistry;

/// Where the boot sequence currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStage {
    Uninitialized,
    PlatformDetected,
    Staged,
    NativesLoaded,
    Ready,
    Failed,
}

/// Drives extraction and registration in order, then hands the registry to
/// the application.
pub struct BootSequencer {
    config: BootConfig,
    manifest: NativeManifest,
    stage: BootStage,
    embedded_archive: Option<Vec<u8>>,
    platform_override: Option<PlatformKind>,
}

impl BootSequencer {
    pub fn new(config: BootConfig, manifest: NativeManifest) -> Self {
        Self {
            config,
            manifest,
            stage: BootStage::Uninitialized,
            embedded_archive: None,
            platform_override: None,
        }
    }

    /// Attach an embedded native archive, unpacked during staging.
    #[must_use]
    pub fn with_embedded_archive(mut self, bytes: Vec<u8>) -> Self {
        self.embedded_archive = Some(bytes);
        self
    }

    /// Override platform detection. For embedders and tests; the default is
    /// [`PlatformKind::detect`].
    #[must_use]
    pub fn with_platform(mut self, platform: PlatformKind) -> Self {
        self.platform_override = Some(platform);
        self
    }

    #[must_use]
    pub fn stage(&self) -> BootStage {
        self.stage
    }

    /// Run the whole sequence. `post_init` is the subsystem-specific
    /// initialization (the multimedia-runtime init equivalent); `Ready` is
    /// only entered once it succeeds.
    ///
    /// # Errors
    /// The first error from any stage, after transitioning to
    /// [`BootStage::Failed`]. Callers treat this as fatal.
    pub fn run<F>(&mut self, post_init: F) -> Result<NativeLibraryRegistry, NativeLoaderError>
    where
        F: FnOnce(&NativeLibraryRegistry) -> Result<(), NativeLoaderError>,
    {
        match self.try_run(post_init) {
            Ok(registry) => {
                self.stage = BootStage::Ready;
                info!("Boot complete: {} native library(ies) ready", registry.len());
                Ok(registry)
            }
            Err(e) => {
                self.stage = BootStage::Failed;
                Err(e)
            }
        }
    }

    fn try_run<F>(&mut self, post_init: F) -> Result<NativeLibraryRegistry, NativeLoaderError>
    where
        F: FnOnce(&NativeLibraryRegistry) -> Result<(), NativeLoaderError>,
    {
        let platform = self
            .platform_override
            .unwrap_or_else(PlatformKind::detect);

        // No strategy exists for a 32-bit or unrecognized OS; fail before
        // touching the filesystem.
        if !platform.is_supported() {
            return Err(NativeLoaderError::UnsupportedPlatform(platform.to_string()));
        }
        let strategy = strategy_for(platform)?;
        self.stage = BootStage::PlatformDetected;
        info!("Platform detected: {platform}");

        if platform == PlatformKind::MacOs {
            warn!("macOS support is currently untested; things may explode");
        }

        if self.config.skip_checksum_verification {
            warn!("Checksum verification disabled. Living on the edge, huh?");
        }

        let mut extractor = NativeExtractor::new(
            self.config.staging_directory.clone(),
            self.config.lookup_directories.clone(),
            !self.config.skip_checksum_verification,
        );
        if let Some(bytes) = self.embedded_archive.take() {
            extractor = extractor.with_embedded_archive(bytes);
        }
        extractor.extract_all(&self.manifest.libraries)?;
        self.stage = BootStage::Staged;

        // Staging directory first, then the configured lookup order.
        let mut lookup_paths: Vec<PathBuf> = vec![self.config.staging_directory.clone()];
        lookup_paths.extend(self.config.lookup_directories.iter().cloned());

        let mut registry = NativeLibraryRegistry::new(lookup_paths, strategy);
        for descriptor in &self.manifest.libraries {
            info!("Now loading: {}", descriptor.name);
            registry.register_any(&descriptor.variants)?;
        }
        self.stage = BootStage::NativesLoaded;

        post_init(&registry)?;

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_in(dir: &std::path::Path) -> BootConfig {
        BootConfig {
            skip_checksum_verification: false,
            enable_extended_debugging: false,
            lookup_directories: vec![dir.to_path_buf()],
            staging_directory: dir.join("staging"),
        }
    }

    #[test]
    fn unsupported_platform_fails_before_extraction() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let staging = config.staging_directory.clone();

        let mut sequencer = BootSequencer::new(config, NativeManifest::default())
            .with_platform(PlatformKind::Unsupported);

        let err = sequencer.run(|_| Ok(())).unwrap_err();
        assert!(matches!(err, NativeLoaderError::UnsupportedPlatform(_)));
        assert_eq!(sequencer.stage(), BootStage::Failed);
        // Extraction never ran.
        assert!(!staging.exists());
    }

    #[cfg(all(unix, target_pointer_width = "64"))]
    #[test]
    fn empty_manifest_reaches_ready() {
        let dir = tempdir().unwrap();
        let mut sequencer = BootSequencer::new(config_in(dir.path()), NativeManifest::default());

        let registry = sequencer.run(|_| Ok(())).unwrap();
        assert_eq!(sequencer.stage(), BootStage::Ready);
        assert!(registry.is_empty());
    }

    #[cfg(all(unix, target_pointer_width = "64"))]
    #[test]
    fn post_init_failure_is_fatal() {
        let dir = tempdir().unwrap();
        let mut sequencer = BootSequencer::new(config_in(dir.path()), NativeManifest::default());

        let err = sequencer
            .run(|_| Err(NativeLoaderError::RuntimeInit("init returned -1".into())))
            .unwrap_err();
        assert!(matches!(err, NativeLoaderError::RuntimeInit(_)));
        assert_eq!(sequencer.stage(), BootStage::Failed);
    }
}
