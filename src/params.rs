//! Encryption parameters and named presets
//!
//! Key and IV lengths are fixed by AES-256-CBC. Everything else is a value
//! handed to [`crate::service::EncryptionService`] at construction, so tests
//! can run with cheap key derivation without touching shared state.

use crate::error::{ErrorCategory, ErrorKind, FilecryptError, Result};
use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;
use std::str::FromStr;

/// Length of the derived key in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// Length of the initialization vector in bytes (one AES block)
pub const IV_LEN: usize = 16;

/// Cipher block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Default salt length in bytes
pub const DEFAULT_SALT_LEN: usize = 32;

/// Default PBKDF2 iteration count
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Default cap on `_1`, `_2`, ... attempts when picking a decrypt output name
pub const DEFAULT_MAX_NAME_ATTEMPTS: u32 = 10_000;

/// Iteration counts accepted from users choosing their own value
pub const USER_ITERATIONS: RangeInclusive<u32> = 10_000..=1_000_000;

/// Highest iteration count honored when reading a container. Anything above
/// is treated as a corrupt header rather than hours of key derivation.
pub const MAX_STORED_ITERATIONS: u32 = 10_000_000;

/// Tunables for a single [`crate::service::EncryptionService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionParameters {
    /// Number of random salt bytes generated per encryption.
    pub salt_len: usize,
    /// PBKDF2 iteration count recorded in, and used for, new containers.
    pub iterations: u32,
    /// How many numbered names decryption tries before giving up.
    pub max_name_attempts: u32,
}

impl Default for EncryptionParameters {
    fn default() -> Self {
        Self {
            salt_len: DEFAULT_SALT_LEN,
            iterations: DEFAULT_ITERATIONS,
            max_name_attempts: DEFAULT_MAX_NAME_ATTEMPTS,
        }
    }
}

impl EncryptionParameters {
    /// Defaults with the iteration count of `preset`.
    pub fn from_preset(preset: Preset) -> Self {
        Self {
            iterations: preset.iterations(),
            ..Self::default()
        }
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_salt_len(mut self, salt_len: usize) -> Self {
        self.salt_len = salt_len;
        self
    }

    pub fn with_max_name_attempts(mut self, attempts: u32) -> Self {
        self.max_name_attempts = attempts;
        self
    }

    /// Rejects values that would violate key derivation preconditions or
    /// make decrypt output naming impossible.
    pub fn validate(&self) -> Result<()> {
        if self.salt_len == 0 {
            return Err(invalid("salt length must be at least one byte"));
        }
        if self.iterations == 0 {
            return Err(invalid("iteration count must be at least one"));
        }
        if self.iterations > MAX_STORED_ITERATIONS {
            return Err(invalid(format!(
                "iteration count {} exceeds the supported maximum of {}",
                self.iterations, MAX_STORED_ITERATIONS
            )));
        }
        if self.max_name_attempts == 0 {
            return Err(invalid("at least one output name attempt is required"));
        }
        Ok(())
    }
}

/// Checks an iteration count chosen by a person rather than a test.
pub fn check_user_iterations(iterations: u32) -> Result<u32> {
    if USER_ITERATIONS.contains(&iterations) {
        Ok(iterations)
    } else {
        Err(invalid(format!(
            "iterations must be between {} and {}",
            USER_ITERATIONS.start(),
            USER_ITERATIONS.end()
        )))
    }
}

fn invalid(msg: impl Into<String>) -> FilecryptError {
    FilecryptError::new(ErrorCategory::User, ErrorKind::InvalidParameters, msg)
}

/// Named security/performance trade-offs for key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    QuickShare,
    DailyWork,
    Archival,
    SecureBackup,
    MaximumSecurity,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::QuickShare,
        Preset::DailyWork,
        Preset::Archival,
        Preset::SecureBackup,
        Preset::MaximumSecurity,
    ];

    pub fn iterations(self) -> u32 {
        match self {
            Preset::QuickShare => 50_000,
            Preset::DailyWork => 100_000,
            Preset::Archival => 250_000,
            Preset::SecureBackup => 500_000,
            Preset::MaximumSecurity => 1_000_000,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Preset::QuickShare => "quick-share",
            Preset::DailyWork => "daily-work",
            Preset::Archival => "archival",
            Preset::SecureBackup => "secure-backup",
            Preset::MaximumSecurity => "maximum-security",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Preset::QuickShare => "Fast encryption for temporary file sharing",
            Preset::DailyWork => "Balanced security and performance for everyday files",
            Preset::Archival => "Long-term storage of archives",
            Preset::SecureBackup => "High-security encryption for backups",
            Preset::MaximumSecurity => "Slowest derivation for sensitive documents",
        }
    }

    /// Suggests a preset from the file extension.
    pub fn suggest_for(path: &Path) -> Preset {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "doc" | "docx" | "pdf" | "txt" | "md" => Preset::DailyWork,
            "zip" | "tar" | "gz" | "bz2" | "xz" => Preset::Archival,
            "jpg" | "png" | "mp4" | "avi" => Preset::SecureBackup,
            _ => Preset::DailyWork,
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = FilecryptError;

    fn from_str(s: &str) -> Result<Self> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| invalid(format!("unknown preset: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = EncryptionParameters::default();
        assert_eq!(params.salt_len, 32);
        assert_eq!(params.iterations, 100_000);
        assert_eq!(params.max_name_attempts, 10_000);
        params.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let err = EncryptionParameters::default()
            .with_salt_len(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);

        let err = EncryptionParameters::default()
            .with_iterations(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);

        let err = EncryptionParameters::default()
            .with_max_name_attempts(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
    }

    #[test]
    fn test_validate_rejects_excessive_iterations() {
        let err = EncryptionParameters::default()
            .with_iterations(MAX_STORED_ITERATIONS + 1)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
    }

    #[test]
    fn test_user_iterations_range() {
        assert!(check_user_iterations(9_999).is_err());
        assert_eq!(check_user_iterations(10_000).unwrap(), 10_000);
        assert_eq!(check_user_iterations(1_000_000).unwrap(), 1_000_000);
        assert!(check_user_iterations(1_000_001).is_err());
    }

    #[test]
    fn test_preset_names_parse_back() {
        for preset in Preset::ALL {
            assert_eq!(preset.name().parse::<Preset>().unwrap(), preset);
            assert!(USER_ITERATIONS.contains(&preset.iterations()));
        }
        assert!("nonsense".parse::<Preset>().is_err());
    }

    #[test]
    fn test_suggest_for_extension() {
        assert_eq!(Preset::suggest_for(Path::new("notes.TXT")), Preset::DailyWork);
        assert_eq!(Preset::suggest_for(Path::new("a.tar.gz")), Preset::Archival);
        assert_eq!(Preset::suggest_for(Path::new("cat.png")), Preset::SecureBackup);
        assert_eq!(Preset::suggest_for(Path::new("Makefile")), Preset::DailyWork);
    }

    #[test]
    fn test_from_preset() {
        let params = EncryptionParameters::from_preset(Preset::Archival);
        assert_eq!(params.iterations, 250_000);
        assert_eq!(params.salt_len, DEFAULT_SALT_LEN);
    }
}
