//! Stages native library payloads onto disk before any load attempt.
//!
//! Two payload kinds exist: filesystem-bundled files discovered by probing
//! the configured lookup directories, and an embedded deflate-compressed
//! archive unpacked wholesale into the staging directory. Either way, every
//! staged file can be verified against the manifest checksum before the
//! dynamic linker ever sees it.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::NativeLoaderError;
use crate::manifest::LibraryDescriptor;

/// Stages payloads for a set of descriptors into one staging directory.
pub struct NativeExtractor {
    staging_dir: PathBuf,
    probe_dirs: Vec<PathBuf>,
    verify_checksums: bool,
    embedded_archive: Option<Vec<u8>>,
}

impl NativeExtractor {
    pub fn new(
        staging_dir: impl Into<PathBuf>,
        probe_dirs: Vec<PathBuf>,
        verify_checksums: bool,
    ) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            probe_dirs,
            verify_checksums,
            embedded_archive: None,
        }
    }

    /// Attach an embedded archive (a zip, typically via `include_bytes!`)
    /// whose entries are unpacked into the staging directory first.
    #[must_use]
    pub fn with_embedded_archive(mut self, bytes: Vec<u8>) -> Self {
        self.embedded_archive = Some(bytes);
        self
    }

    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Stage every descriptor's payload, returning the staged paths.
    ///
    /// Idempotent: a pre-existing staged file whose checksum still matches is
    /// reused; one that no longer matches is re-staged from its source. A
    /// descriptor with no discoverable source is skipped with a debug note;
    /// registration will report the miss. Only a checksum mismatch with no
    /// source to re-stage from aborts the run.
    ///
    /// # Errors
    /// [`NativeLoaderError::IntegrityViolation`] on a checksum mismatch,
    /// or I/O / archive errors from the staging writes themselves.
    pub fn extract_all(
        &self,
        descriptors: &[LibraryDescriptor],
    ) -> Result<Vec<PathBuf>, NativeLoaderError> {
        if self.embedded_archive.is_some() {
            // Old payloads from a previous version must not shadow the
            // archive contents.
            self.clear_staging_dir()?;
        }
        fs::create_dir_all(&self.staging_dir)?;

        if let Some(bytes) = &self.embedded_archive {
            self.unpack_archive(bytes)?;
        }

        let mut staged = Vec::new();

        for descriptor in descriptors {
            match self.stage_descriptor(descriptor)? {
                Some(path) => staged.push(path),
                None => debug!(
                    "No payload found for '{}' (variants {:?}); deferring to registration",
                    descriptor.name, descriptor.variants
                ),
            }
        }

        Ok(staged)
    }

    /// Stage one descriptor: first variant that can be materialized wins.
    fn stage_descriptor(
        &self,
        descriptor: &LibraryDescriptor,
    ) -> Result<Option<PathBuf>, NativeLoaderError> {
        let expected = descriptor.checksum.as_deref();

        for variant in &descriptor.variants {
            let destination = self.staging_dir.join(variant);
            let source = self.probe(variant);

            if destination.is_file() {
                match self.verify(variant, expected, &destination) {
                    Ok(()) => {
                        debug!("Reusing staged '{}' at {}", variant, destination.display());
                        return Ok(Some(destination));
                    }
                    // A leftover from a previous version; re-stage from the
                    // source when one exists, otherwise the mismatch stands.
                    Err(NativeLoaderError::IntegrityViolation { .. }) if source.is_some() => {
                        debug!("Staged '{variant}' no longer matches the manifest; re-staging");
                    }
                    Err(e) => return Err(e),
                }
            }

            let Some(source) = source else {
                continue;
            };

            debug!("Staging '{}' from {}", variant, source.display());
            fs::copy(&source, &destination)?;
            self.verify(variant, expected, &destination)?;
            info!("Staged '{}' at {}", variant, destination.display());
            return Ok(Some(destination));
        }

        Ok(None)
    }

    /// Probe the lookup directories in order; first hit wins.
    fn probe(&self, file_name: &str) -> Option<PathBuf> {
        self.probe_dirs
            .iter()
            .map(|dir| dir.join(file_name))
            .find(|candidate| candidate.is_file())
    }

    fn verify(
        &self,
        file_name: &str,
        expected: Option<&str>,
        staged: &Path,
    ) -> Result<(), NativeLoaderError> {
        let Some(expected) = expected else {
            return Ok(());
        };

        if !self.verify_checksums {
            warn!("Skipping checksum verification for '{file_name}'");
            return Ok(());
        }

        let actual = sha256_hex(staged)?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(NativeLoaderError::IntegrityViolation {
                file: file_name.to_string(),
                expected: expected.to_ascii_lowercase(),
                actual,
            });
        }

        debug!("Checksum verified for '{file_name}'");
        Ok(())
    }

    fn clear_staging_dir(&self) -> io::Result<()> {
        if self.staging_dir.is_dir() {
            fs::remove_dir_all(&self.staging_dir)?;
        }
        Ok(())
    }

    /// Unpack every file entry of the embedded archive into the staging
    /// directory. Entry paths are flattened to their file names; an archive
    /// of natives has no meaningful directory structure.
    fn unpack_archive(&self, bytes: &[u8]) -> Result<(), NativeLoaderError> {
        let mut archive = ZipArchive::new(io::Cursor::new(bytes))?;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }

            let Some(file_name) = entry
                .enclosed_name()
                .and_then(|p| p.file_name().map(|n| n.to_os_string()))
            else {
                warn!("Skipping archive entry with unusable name: {}", entry.name());
                continue;
            };

            let destination = self.staging_dir.join(&file_name);
            let mut output = File::create(&destination)?;
            io::copy(&mut entry, &mut output)?;
            debug!("Unpacked embedded payload {}", destination.display());
        }

        Ok(())
    }
}

/// Streaming SHA-256 of a file, as lowercase hex.
pub fn sha256_hex(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn probe_respects_directory_order() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        fs::write(first.path().join("lib.so"), b"from-first").unwrap();
        fs::write(second.path().join("lib.so"), b"from-second").unwrap();

        let staging = tempdir().unwrap();
        let extractor = NativeExtractor::new(
            staging.path(),
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
            true,
        );

        let found = extractor.probe("lib.so").unwrap();
        assert_eq!(found, first.path().join("lib.so"));
    }

    #[test]
    fn sha256_hex_is_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        fs::write(&path, b"abc").unwrap();

        assert_eq!(
            sha256_hex(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
