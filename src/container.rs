//! Self-describing container format
//!
//! The on-disk layout is:
//! - metadata length: 4 bytes (big-endian u32) = N
//! - metadata: N bytes of UTF-8 JSON
//! - ciphertext: all remaining bytes
//!
//! Salt and IV are stored in the metadata as standard (padded) base64.

use crate::cipher::ALGORITHM_ID;
use crate::error::{ErrorCategory, ErrorKind, FilecryptError, Result};
use crate::kdf::KDF_ID;
use crate::params::{IV_LEN, MAX_STORED_ITERATIONS};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::mem::size_of;

/// Length of the metadata length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = size_of::<u32>();

/// Largest metadata block read from a file before parsing it as a header
pub const MAX_HEADER_METADATA_LEN: usize = 1024 * 1024;

/// Descriptive header embedded in every container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerMetadata {
    /// Base name of the plaintext source.
    pub original_filename: String,
    pub original_size: u64,
    pub encrypted_size: u64,
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub iv: [u8; IV_LEN],
    pub algorithm: String,
    pub key_derivation: String,
    pub iterations: u32,
}

impl ContainerMetadata {
    /// Fails with `UnsupportedAlgorithm` unless both the cipher and the key
    /// derivation identifiers are the ones this build implements.
    pub fn check_supported(&self) -> Result<()> {
        if self.algorithm != ALGORITHM_ID {
            return Err(FilecryptError::new(
                ErrorCategory::User,
                ErrorKind::UnsupportedAlgorithm,
                format!("unsupported encryption algorithm: {}", self.algorithm),
            ));
        }
        if self.key_derivation != KDF_ID {
            return Err(FilecryptError::new(
                ErrorCategory::User,
                ErrorKind::UnsupportedAlgorithm,
                format!("unsupported key derivation: {}", self.key_derivation),
            ));
        }
        Ok(())
    }

    /// Percentage by which the container payload is larger than the
    /// original, or `None` for an empty original.
    pub fn size_overhead_percent(&self) -> Option<f64> {
        if self.original_size == 0 {
            return None;
        }
        let original = self.original_size as f64;
        Some((self.encrypted_size as f64 - original) / original * 100.0)
    }

    fn check_values(&self) -> Result<()> {
        if self.salt.is_empty() {
            return Err(FilecryptError::invalid_format("metadata salt is empty"));
        }
        if self.iterations == 0 {
            return Err(FilecryptError::invalid_format(
                "metadata iteration count is zero",
            ));
        }
        if self.iterations > MAX_STORED_ITERATIONS {
            return Err(FilecryptError::invalid_format(format!(
                "metadata iteration count {} exceeds the supported maximum of {}",
                self.iterations, MAX_STORED_ITERATIONS
            )));
        }
        Ok(())
    }
}

/// A parsed container borrowing its ciphertext from the input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContainer<'a> {
    pub metadata: ContainerMetadata,
    pub ciphertext: &'a [u8],
}

/// Serialize metadata and ciphertext into the container layout.
pub fn serialize(metadata: &ContainerMetadata, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(metadata).map_err(|e| {
        FilecryptError::with_source(
            ErrorCategory::Internal,
            ErrorKind::InvalidFormat,
            "failed to encode metadata",
            e,
        )
    })?;
    let json_len = u32::try_from(json.len()).map_err(|e| {
        FilecryptError::with_source(
            ErrorCategory::User,
            ErrorKind::InvalidFormat,
            "metadata does not fit a 32-bit length prefix",
            e,
        )
    })?;

    let mut output = Vec::with_capacity(LENGTH_PREFIX_LEN + json.len() + ciphertext.len());
    output.extend_from_slice(&json_len.to_be_bytes());
    output.extend_from_slice(&json);
    output.extend_from_slice(ciphertext);
    Ok(output)
}

/// Parse a container, validating the metadata fields.
///
/// Algorithm identifiers are not checked here; see
/// [`ContainerMetadata::check_supported`].
pub fn deserialize(bytes: &[u8]) -> Result<EncryptedContainer<'_>> {
    let (metadata_bytes, ciphertext) = split(bytes)?;
    let invalid = |e: serde_json::Error| {
        FilecryptError::with_source(
            ErrorCategory::User,
            ErrorKind::InvalidFormat,
            format!("invalid container metadata: {}", e),
            e,
        )
    };
    // Derived structs also accept JSON arrays; the header must be an object.
    let object: Map<String, Value> = serde_json::from_slice(metadata_bytes).map_err(invalid)?;
    let metadata: ContainerMetadata =
        serde_json::from_value(Value::Object(object)).map_err(invalid)?;
    metadata.check_values()?;

    Ok(EncryptedContainer {
        metadata,
        ciphertext,
    })
}

/// Cheap structural check used to guess whether bytes are a container.
///
/// Only the header is needed: `bytes` may stop right after the metadata.
/// Metadata lengths above [`MAX_HEADER_METADATA_LEN`] are rejected outright,
/// and the metadata must be a JSON object carrying `algorithm`, `salt`,
/// `iv` and `original_filename`.
pub fn looks_like_container(bytes: &[u8]) -> bool {
    const REQUIRED: [&str; 4] = ["algorithm", "salt", "iv", "original_filename"];

    let Some(len) = read_length_prefix(bytes) else {
        return false;
    };
    if len > MAX_HEADER_METADATA_LEN {
        return false;
    }
    let Some(metadata_bytes) = bytes.get(LENGTH_PREFIX_LEN..LENGTH_PREFIX_LEN + len) else {
        return false;
    };
    serde_json::from_slice::<Map<String, Value>>(metadata_bytes)
        .is_ok_and(|object| REQUIRED.iter().all(|key| object.contains_key(*key)))
}

/// Number of leading bytes [`looks_like_container`] needs to see.
pub fn header_len(prefix: [u8; LENGTH_PREFIX_LEN]) -> usize {
    LENGTH_PREFIX_LEN + u32::from_be_bytes(prefix) as usize
}

fn read_length_prefix(bytes: &[u8]) -> Option<usize> {
    let prefix: [u8; LENGTH_PREFIX_LEN] = bytes.get(..LENGTH_PREFIX_LEN)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix) as usize)
}

fn split(bytes: &[u8]) -> Result<(&[u8], &[u8])> {
    let len = read_length_prefix(bytes).ok_or_else(|| {
        FilecryptError::invalid_format("input likely truncated while reading metadata length")
    })?;
    let rest = &bytes[LENGTH_PREFIX_LEN..];
    if rest.len() < len {
        return Err(FilecryptError::invalid_format(format!(
            "truncated container; metadata claims {} bytes but only {} remain",
            len,
            rest.len()
        )));
    }
    Ok(rest.split_at(len))
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<Vec<u8>>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)?;
        let len = bytes.len();
        T::try_from(bytes)
            .map_err(|_| D::Error::invalid_length(len, &"a byte string of the expected length"))
    }
}
