use std::path::PathBuf;

/// Errors produced while staging, loading or resolving native libraries.
///
/// Everything that can go wrong during boot funnels into this taxonomy so the
/// boot sequencer can log one diagnostic and decide whether to terminate.
#[derive(Debug, thiserror::Error)]
pub enum NativeLoaderError {
    #[error("platform '{0}' is not supported (64-bit Windows, Linux and macOS only)")]
    UnsupportedPlatform(String),

    #[error("checksum mismatch for '{file}': expected {expected}, got {actual}")]
    IntegrityViolation {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("failed to find '{0}' at the provided lookup paths")]
    NotFound(String),

    #[error("library file '{0}' was never registered")]
    NotRegistered(String),

    #[error("library file '{0}' is already registered")]
    AlreadyRegistered(String),

    // Shared by register_any and retrieve_any, so the wording stays neutral
    // about which operation was attempted.
    #[error("none of the candidate file names {0:?} succeeded")]
    NoCandidateSucceeded(Vec<String>),

    #[error("failed to load '{path}': {reason}")]
    LoadFailure { path: PathBuf, reason: String },

    #[error("symbol '{symbol}' not found in '{library}'")]
    SymbolNotFound { library: String, symbol: String },

    #[error("runtime initialization failed: {0}")]
    RuntimeInit(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to unpack embedded natives: {0}")]
    Archive(#[from] zip::result::ZipError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_fallback_message_fits_both_register_and_retrieve() {
        let err = NativeLoaderError::NoCandidateSucceeded(vec!["libfoo64.so".to_string()]);
        assert_eq!(
            err.to_string(),
            r#"none of the candidate file names ["libfoo64.so"] succeeded"#
        );
    }

    #[test]
    fn lookup_miss_messages_stay_distinct() {
        let not_found = NativeLoaderError::NotFound("libfoo.so".to_string());
        let not_registered = NativeLoaderError::NotRegistered("libfoo.so".to_string());
        assert_eq!(
            not_found.to_string(),
            "failed to find 'libfoo.so' at the provided lookup paths"
        );
        assert_eq!(
            not_registered.to_string(),
            "library file 'libfoo.so' was never registered"
        );
    }
}

