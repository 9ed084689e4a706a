//! Credential store collaborator
//!
//! Remembers passwords keyed by the original (plaintext) filename. Failures
//! here never fail an encryption; the service logs and carries on.

use crate::error::{ErrorCategory, ErrorKind, FilecryptError, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use zeroize::Zeroizing;

/// Trait for remembering passwords across operations
pub trait CredentialStore: Send + Sync {
    fn store(&self, key: &str, password: &str) -> Result<()>;

    /// Returns `Ok(None)` when nothing is stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>>;

    /// Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// Remembers nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCredentialStore;

impl CredentialStore for NoopCredentialStore {
    fn store(&self, _key: &str, _password: &str) -> Result<()> {
        Ok(())
    }

    fn get(&self, _key: &str) -> Result<Option<Zeroizing<String>>> {
        Ok(None)
    }

    fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

/// Keeps passwords in process memory for the lifetime of the store
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, Zeroizing<String>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, Zeroizing<String>>>> {
        self.entries.lock().map_err(|_| {
            FilecryptError::new(
                ErrorCategory::Internal,
                ErrorKind::CredentialStore,
                "credential store lock poisoned",
            )
        })
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn store(&self, key: &str, password: &str) -> Result<()> {
        self.entries()?
            .insert(key.to_string(), Zeroizing::new(password.to_string()));
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}
