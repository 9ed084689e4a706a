//! filecrypt - Passphrase-based file encryption into self-describing
//! AES-256-CBC containers
//!
//! Layers, leaf first: [`kdf`] derives keys, [`cipher`] pads and encrypts,
//! [`container`] frames metadata and ciphertext, and [`service`] ties them
//! to files on disk.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod container;
pub mod credentials;
pub mod error;
pub mod file_ops;
pub mod kdf;
pub mod params;
pub mod passphrase;
pub mod service;

pub use container::ContainerMetadata;
pub use credentials::{CredentialStore, MemoryCredentialStore, NoopCredentialStore};
pub use error::{ErrorCategory, ErrorKind, FilecryptError, Result};
pub use params::{EncryptionParameters, Preset};
pub use service::{BatchReport, EncryptionService};
