use std::error::Error as StdError;
use std::io;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// In particular this means that use of Internal is never a guarantee
    /// the error is not, for example due to a user error - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The source or encrypted path does not exist.
    NotFound,
    /// The container is structurally broken: truncated length prefix,
    /// truncated metadata, malformed JSON, missing or invalid fields, or a
    /// ciphertext that is not a whole number of cipher blocks.
    InvalidFormat,
    /// The metadata names an algorithm or key derivation this build does not
    /// support.
    UnsupportedAlgorithm,
    /// Padding validation or the cipher failed. Deliberately covers both an
    /// incorrect password and tampered or corrupted ciphertext.
    DecryptionFailure,
    /// No free output name could be found for a decrypted file.
    NameCollisionExhausted,
    /// Encryption parameters supplied by the caller are unusable.
    InvalidParameters,
    /// The operating system random number generator failed.
    RandomnessUnavailable,
    /// Password could not be obtained from the configured reader.
    PassphraseUnavailable,
    /// The credential store rejected or failed an operation.
    CredentialStore,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct FilecryptError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Specific condition tag for consumers that need to branch their
    /// behavior.
    pub kind: ErrorKind,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl FilecryptError {
    /// Creates a new error tagged with a category and kind.
    pub fn new(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also retains the originating source error.
    pub fn with_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind,
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Shorthand for a user-attributable structural problem with a container.
    pub(crate) fn invalid_format(msg: impl Into<String>) -> Self {
        Self::new(ErrorCategory::User, ErrorKind::InvalidFormat, msg)
    }

    /// Maps an I/O error into the taxonomy, turning a missing file
    /// into `NotFound`.
    pub(crate) fn from_io(msg: impl Into<String>, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => {
                Self::with_source(ErrorCategory::User, ErrorKind::NotFound, msg, err)
            }
            io::ErrorKind::PermissionDenied => {
                Self::with_source(ErrorCategory::User, ErrorKind::Io, msg, err)
            }
            _ => Self::with_source(ErrorCategory::Internal, ErrorKind::Io, msg, err),
        }
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, FilecryptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_kind_and_category() {
        let err = FilecryptError::invalid_format("metadata truncated")
            .with_context("failed to read container");

        assert_eq!(err.kind, ErrorKind::InvalidFormat);
        assert_eq!(err.category, ErrorCategory::User);
        assert_eq!(err.to_string(), "failed to read container");
        assert_eq!(
            err.source_error().map(|s| s.to_string()).as_deref(),
            Some("metadata truncated")
        );
    }

    #[test]
    fn test_missing_file_maps_to_not_found() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = FilecryptError::from_io("failed to read x", io_err);
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.category, ErrorCategory::User);
    }

    #[test]
    fn test_other_io_is_internal() {
        let io_err = io::Error::other("disk on fire");
        let err = FilecryptError::from_io("failed to write y", io_err);
        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(err.category, ErrorCategory::Internal);
    }
}
