//! File-level encryption operations
//!
//! Every operation reads its whole input into memory, transforms it and
//! writes a whole new file. The service holds no mutable state, so calls on
//! distinct files may run concurrently; calls touching the same paths must
//! be serialized by the caller.

use crate::cipher::{self, ALGORITHM_ID};
use crate::container::{self, ContainerMetadata, LENGTH_PREFIX_LEN, MAX_HEADER_METADATA_LEN};
use crate::credentials::{CredentialStore, NoopCredentialStore};
use crate::error::{ErrorCategory, ErrorKind, FilecryptError, Result};
use crate::file_ops;
use crate::kdf::{self, KDF_ID};
use crate::params::{BLOCK_SIZE, EncryptionParameters, IV_LEN};
use rand::TryRngCore;
use rand::rngs::OsRng;
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Extension appended to encrypted files (without the leading dot)
pub const ENCRYPTED_EXTENSION: &str = "encrypted";

/// How many cipher blocks the quick password check decrypts
const QUICK_CHECK_BLOCKS: usize = 2;

/// Outcome of a batch encryption, item by item.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Containers written, in input order.
    pub encrypted: Vec<PathBuf>,
    /// Inputs that could not be encrypted, with the reason.
    pub failed: Vec<(PathBuf, FilecryptError)>,
}

/// Encrypts and decrypts files into self-describing containers.
pub struct EncryptionService {
    params: EncryptionParameters,
    credentials: Arc<dyn CredentialStore>,
}

impl EncryptionService {
    /// Creates a service that does not remember passwords.
    pub fn new(params: EncryptionParameters) -> Result<Self> {
        Self::with_credential_store(params, Arc::new(NoopCredentialStore))
    }

    pub fn with_credential_store(
        params: EncryptionParameters,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            credentials,
        })
    }

    pub fn params(&self) -> &EncryptionParameters {
        &self.params
    }

    /// Encrypt `source` into a new container.
    ///
    /// Writes to `output`, or to `source` with `.encrypted` appended. The
    /// source file is left untouched. When `store_password` is set the
    /// password is handed to the credential store under the source's base
    /// name; a store failure is logged and otherwise ignored. Sources whose
    /// file name is not valid UTF-8 are rejected.
    pub fn encrypt_file(
        &self,
        source: &Path,
        password: &str,
        output: Option<&Path>,
        store_password: bool,
    ) -> Result<PathBuf> {
        let original_filename = source
            .file_name()
            .ok_or_else(|| {
                FilecryptError::new(
                    ErrorCategory::User,
                    ErrorKind::InvalidParameters,
                    format!("{} does not name a file", source.display()),
                )
            })?
            .to_str()
            .map(str::to_owned)
            // The stored name must restore to the same file name.
            .ok_or_else(|| {
                FilecryptError::new(
                    ErrorCategory::User,
                    ErrorKind::InvalidParameters,
                    format!("file name of {} is not valid UTF-8", source.display()),
                )
            })?;
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_encrypted_path(source));

        let plaintext = Zeroizing::new(read_file(source)?);

        let mut salt = vec![0u8; self.params.salt_len];
        fill_random(&mut salt)?;
        let mut iv = [0u8; IV_LEN];
        fill_random(&mut iv)?;

        debug!(
            source = %source.display(),
            iterations = self.params.iterations,
            "deriving key"
        );
        let key = kdf::derive(password, &salt, self.params.iterations);
        let ciphertext = cipher::encrypt(&plaintext, &key, &iv);

        let metadata = ContainerMetadata {
            original_filename,
            original_size: plaintext.len() as u64,
            encrypted_size: ciphertext.len() as u64,
            salt,
            iv,
            algorithm: ALGORITHM_ID.to_string(),
            key_derivation: KDF_ID.to_string(),
            iterations: self.params.iterations,
        };
        let bytes = container::serialize(&metadata, &ciphertext)?;
        file_ops::write_atomic(&output, &bytes)
            .map_err(|e| e.with_context(format!("failed to write to {}", output.display())))?;

        if store_password {
            self.remember_password(&metadata.original_filename, password);
        }

        info!(
            source = %source.display(),
            output = %output.display(),
            bytes = metadata.original_size,
            "encrypted file"
        );
        Ok(output)
    }

    /// Decrypt a container into a new plaintext file.
    ///
    /// Writes to `output`, or to the stored original filename next to the
    /// container. An existing file is never replaced: `_1`, `_2`, ... is
    /// inserted before the extension until a free name is found.
    ///
    /// A wrong password and tampered ciphertext are reported identically as
    /// `DecryptionFailure`.
    pub fn decrypt_file(
        &self,
        encrypted: &Path,
        password: &str,
        output: Option<&Path>,
    ) -> Result<PathBuf> {
        let bytes = read_file(encrypted)?;
        let parsed = container::deserialize(&bytes)
            .map_err(|e| e.with_context(format!("invalid container {}", encrypted.display())))?;
        let metadata = &parsed.metadata;
        metadata.check_supported()?;

        let plaintext = Zeroizing::new(decrypt_container(metadata, parsed.ciphertext, password)?);

        let target = match output {
            Some(path) => path.to_path_buf(),
            None => encrypted
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(restored_file_name(metadata)?),
        };
        let attempts = self.params.max_name_attempts.saturating_add(1);
        let written = file_ops::write_new(candidate_names(&target), attempts, &plaintext)?;

        info!(
            encrypted = %encrypted.display(),
            output = %written.display(),
            bytes = plaintext.len(),
            "decrypted file"
        );
        Ok(written)
    }

    /// Fast, partial password check.
    ///
    /// Parses the metadata, derives the key and decrypts the first couple of
    /// cipher blocks without validating anything about the result. CBC
    /// decryption never fails on a wrong key, so this returns `true` for any
    /// password whenever the container header is intact. It is only a cheap
    /// pre-check; use [`Self::verify_encrypted_file`] when correctness
    /// matters.
    pub fn verify_password(&self, encrypted: &Path, password: &str) -> bool {
        match self.quick_check(encrypted, password) {
            Ok(()) => true,
            Err(e) => {
                debug!(path = %encrypted.display(), error = %e, "quick password check failed");
                false
            }
        }
    }

    /// Full check: decrypts and unpads the whole container and compares the
    /// recovered length against the recorded sizes. Never fails; any error
    /// yields `false`.
    pub fn verify_encrypted_file(&self, encrypted: &Path, password: &str) -> bool {
        match self.full_check(encrypted, password) {
            Ok(()) => true,
            Err(e) => {
                debug!(path = %encrypted.display(), error = %e, "verification failed");
                false
            }
        }
    }

    /// Advisory guess whether `path` is a container.
    ///
    /// True for regular files with the `.encrypted` extension (any case) or
    /// whose header parses as container metadata. Only the header is read.
    pub fn is_encrypted_file(&self, path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        let has_extension = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(ENCRYPTED_EXTENSION));
        if has_extension {
            return true;
        }
        read_header(path, MAX_HEADER_METADATA_LEN, 0)
            .map(|header| container::looks_like_container(&header))
            .unwrap_or(false)
    }

    /// Reads and validates the metadata of a container without decrypting.
    pub fn encryption_info(&self, encrypted: &Path) -> Result<ContainerMetadata> {
        let header = read_header(encrypted, MAX_HEADER_METADATA_LEN, 0)?;
        let parsed = container::deserialize(&header)
            .map_err(|e| e.with_context(format!("invalid container {}", encrypted.display())))?;
        Ok(parsed.metadata)
    }

    /// Encrypt each of `sources` into `output_dir` as `<name>.encrypted`.
    ///
    /// Items are independent: a failing input is recorded in the report and
    /// the batch moves on. Only failing to create `output_dir` fails the
    /// whole call. An input whose output name was already written by an
    /// earlier item is a failure of that item, so no container from this
    /// batch is overwritten.
    pub fn batch_encrypt_report<P: AsRef<Path>>(
        &self,
        sources: &[P],
        password: &str,
        output_dir: &Path,
        store_password: bool,
    ) -> Result<BatchReport> {
        fs::create_dir_all(output_dir).map_err(|e| {
            FilecryptError::from_io(format!("failed to create {}", output_dir.display()), e)
        })?;

        let mut report = BatchReport::default();
        let mut claimed = HashSet::new();
        for source in sources {
            let source = source.as_ref();
            match self.encrypt_into(source, password, output_dir, &mut claimed, store_password) {
                Ok(path) => report.encrypted.push(path),
                Err(e) => {
                    warn!(source = %source.display(), error = %e, "skipping file in batch");
                    report.failed.push((source.to_path_buf(), e));
                }
            }
        }

        info!(
            encrypted = report.encrypted.len(),
            failed = report.failed.len(),
            "batch encryption finished"
        );
        Ok(report)
    }

    /// Like [`Self::batch_encrypt_report`], returning only the containers
    /// written.
    pub fn batch_encrypt_files<P: AsRef<Path>>(
        &self,
        sources: &[P],
        password: &str,
        output_dir: &Path,
        store_password: bool,
    ) -> Result<Vec<PathBuf>> {
        self.batch_encrypt_report(sources, password, output_dir, store_password)
            .map(|report| report.encrypted)
    }

    /// Looks up a remembered password by original filename.
    pub fn recall_password(&self, original_filename: &str) -> Option<Zeroizing<String>> {
        match self.credentials.get(original_filename) {
            Ok(password) => password,
            Err(e) => {
                warn!(key = original_filename, error = %e, "could not read stored password");
                None
            }
        }
    }

    pub fn forget_password(&self, original_filename: &str) {
        if let Err(e) = self.credentials.delete(original_filename) {
            warn!(key = original_filename, error = %e, "could not delete stored password");
        }
    }

    fn remember_password(&self, original_filename: &str, password: &str) {
        if let Err(e) = self.credentials.store(original_filename, password) {
            warn!(key = original_filename, error = %e, "could not store password");
        }
    }

    fn encrypt_into(
        &self,
        source: &Path,
        password: &str,
        output_dir: &Path,
        claimed: &mut HashSet<PathBuf>,
        store_password: bool,
    ) -> Result<PathBuf> {
        if source.is_dir() {
            return Err(FilecryptError::new(
                ErrorCategory::User,
                ErrorKind::InvalidParameters,
                format!("{} is a directory", source.display()),
            ));
        }
        let output = default_encrypted_path(source);
        let output = match output.file_name() {
            Some(name) => output_dir.join(name),
            None => output,
        };
        // Inputs from different directories can share a base name.
        if claimed.contains(&output) {
            return Err(FilecryptError::new(
                ErrorCategory::User,
                ErrorKind::InvalidParameters,
                format!(
                    "{} was already written earlier in this batch",
                    output.display()
                ),
            ));
        }
        let written = self.encrypt_file(source, password, Some(&output), store_password)?;
        claimed.insert(written.clone());
        Ok(written)
    }

    fn quick_check(&self, encrypted: &Path, password: &str) -> Result<()> {
        let extra = (QUICK_CHECK_BLOCKS * BLOCK_SIZE) as u64;
        let header = read_header(encrypted, MAX_HEADER_METADATA_LEN, extra)?;
        let parsed = container::deserialize(&header)?;
        let metadata = &parsed.metadata;
        metadata.check_supported()?;
        let key = kdf::derive(password, &metadata.salt, metadata.iterations);
        cipher::decrypt_prefix(parsed.ciphertext, &key, &metadata.iv, QUICK_CHECK_BLOCKS)?;
        Ok(())
    }

    fn full_check(&self, encrypted: &Path, password: &str) -> Result<()> {
        let bytes = read_file(encrypted)?;
        let parsed = container::deserialize(&bytes)?;
        let metadata = &parsed.metadata;
        metadata.check_supported()?;
        if parsed.ciphertext.len() as u64 != metadata.encrypted_size {
            return Err(FilecryptError::invalid_format(format!(
                "ciphertext is {} bytes but metadata records {}",
                parsed.ciphertext.len(),
                metadata.encrypted_size
            )));
        }
        let plaintext = Zeroizing::new(decrypt_container(metadata, parsed.ciphertext, password)?);
        if plaintext.len() as u64 != metadata.original_size {
            return Err(FilecryptError::new(
                ErrorCategory::User,
                ErrorKind::DecryptionFailure,
                "decrypted size does not match recorded original size",
            ));
        }
        Ok(())
    }
}

fn decrypt_container(
    metadata: &ContainerMetadata,
    ciphertext: &[u8],
    password: &str,
) -> Result<Vec<u8>> {
    let key = kdf::derive(password, &metadata.salt, metadata.iterations);
    cipher::decrypt(ciphertext, &key, &metadata.iv).map_err(|e| match e.kind {
        ErrorKind::DecryptionFailure => FilecryptError::with_source(
            ErrorCategory::User,
            ErrorKind::DecryptionFailure,
            "invalid password or corrupted file",
            e,
        ),
        _ => e,
    })
}

fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng.try_fill_bytes(buf).map_err(|e| {
        FilecryptError::with_source(
            ErrorCategory::Internal,
            ErrorKind::RandomnessUnavailable,
            "failed to gather randomness",
            e,
        )
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path)
        .map_err(|e| FilecryptError::from_io(format!("failed to read from {}", path.display()), e))
}

/// Reads the length prefix, the metadata it announces and at most `extra`
/// bytes beyond it. Metadata longer than `metadata_limit` is refused before
/// reading it.
fn read_header(path: &Path, metadata_limit: usize, extra: u64) -> Result<Vec<u8>> {
    let read_err =
        |e: io::Error| FilecryptError::from_io(format!("failed to read from {}", path.display()), e);
    let mut file = File::open(path).map_err(read_err)?;

    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    if let Err(e) = file.read_exact(&mut prefix) {
        return Err(if e.kind() == io::ErrorKind::UnexpectedEof {
            FilecryptError::invalid_format("input likely truncated while reading metadata length")
        } else {
            read_err(e)
        });
    }

    let metadata_len = container::header_len(prefix) - LENGTH_PREFIX_LEN;
    if metadata_len > metadata_limit {
        return Err(FilecryptError::invalid_format(format!(
            "metadata length {} exceeds limit of {}",
            metadata_len, metadata_limit
        )));
    }

    let mut header = prefix.to_vec();
    file.take(metadata_len as u64 + extra)
        .read_to_end(&mut header)
        .map_err(read_err)?;
    Ok(header)
}

fn default_encrypted_path(source: &Path) -> PathBuf {
    let mut name = source
        .file_name()
        .map(OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".");
    name.push(ENCRYPTED_EXTENSION);
    source.with_file_name(name)
}

/// Base name to restore a container's plaintext under. Any directory
/// components in the stored name are dropped.
fn restored_file_name(metadata: &ContainerMetadata) -> Result<&OsStr> {
    Path::new(&metadata.original_filename)
        .file_name()
        .ok_or_else(|| {
            FilecryptError::invalid_format(format!(
                "stored original filename {:?} is not usable",
                metadata.original_filename
            ))
        })
}

/// `path`, then `stem_1.ext`, `stem_2.ext`, ... in the same directory.
fn candidate_names(path: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    let stem = path.file_stem().map(OsStr::to_os_string).unwrap_or_default();
    let extension = path.extension().map(OsStr::to_os_string);

    std::iter::once(path.to_path_buf()).chain((1u64..).map(move |n| {
        let mut name = OsString::from(&stem);
        name.push(format!("_{}", n));
        if let Some(ext) = &extension {
            name.push(".");
            name.push(ext);
        }
        path.with_file_name(name)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn service() -> EncryptionService {
        EncryptionService::new(EncryptionParameters::default().with_iterations(1000)).unwrap()
    }

    struct FailingStore;

    impl CredentialStore for FailingStore {
        fn store(&self, _key: &str, _password: &str) -> Result<()> {
            Err(FilecryptError::new(
                ErrorCategory::Internal,
                ErrorKind::CredentialStore,
                "keychain locked",
            ))
        }

        fn get(&self, _key: &str) -> Result<Option<Zeroizing<String>>> {
            Err(FilecryptError::new(
                ErrorCategory::Internal,
                ErrorKind::CredentialStore,
                "keychain locked",
            ))
        }

        fn delete(&self, _key: &str) -> Result<()> {
            Err(FilecryptError::new(
                ErrorCategory::Internal,
                ErrorKind::CredentialStore,
                "keychain locked",
            ))
        }
    }

    #[test]
    fn test_rejects_invalid_params() {
        let result = EncryptionService::new(EncryptionParameters::default().with_iterations(0));
        assert_eq!(result.err().map(|e| e.kind), Some(ErrorKind::InvalidParameters));
    }

    #[test]
    fn test_default_paths() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("notes.txt");
        fs::write(&source, b"some notes").unwrap();

        let svc = service();
        let encrypted = svc.encrypt_file(&source, "pw", None, false).unwrap();
        assert_eq!(encrypted, temp_dir.path().join("notes.txt.encrypted"));
        assert_eq!(fs::read(&source).unwrap(), b"some notes");

        // The plaintext still exists, so decryption picks a numbered name.
        let decrypted = svc.decrypt_file(&encrypted, "pw", None).unwrap();
        assert_eq!(decrypted, temp_dir.path().join("notes_1.txt"));
        assert_eq!(fs::read(&decrypted).unwrap(), b"some notes");
    }

    #[test]
    fn test_explicit_output_paths() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a.bin");
        let encrypted = temp_dir.path().join("vault.dat");
        let restored = temp_dir.path().join("restored.bin");
        fs::write(&source, [1u8, 2, 3]).unwrap();

        let svc = service();
        assert_eq!(svc.encrypt_file(&source, "pw", Some(&encrypted), false).unwrap(), encrypted);
        assert_eq!(svc.decrypt_file(&encrypted, "pw", Some(&restored)).unwrap(), restored);
        assert_eq!(fs::read(&restored).unwrap(), [1u8, 2, 3]);
    }

    #[test]
    fn test_missing_inputs() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.txt");
        let svc = service();

        let err = svc.encrypt_file(&missing, "pw", None, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        let err = svc.decrypt_file(&missing, "pw", None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        let err = svc.encryption_info(&missing).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(!missing.with_extension("txt.encrypted").exists());
    }

    #[test]
    fn test_unsupported_algorithm() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, b"data").unwrap();
        let svc = service();
        let encrypted = svc.encrypt_file(&source, "pw", None, false).unwrap();

        let bytes = fs::read(&encrypted).unwrap();
        let parsed = container::deserialize(&bytes).unwrap();
        let mut metadata = parsed.metadata.clone();
        metadata.algorithm = "AES-256-GCM".to_string();
        let rewritten = container::serialize(&metadata, parsed.ciphertext).unwrap();
        fs::write(&encrypted, rewritten).unwrap();

        let err = svc.decrypt_file(&encrypted, "pw", None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedAlgorithm);
        assert!(!svc.verify_encrypted_file(&encrypted, "pw"));
    }

    #[test]
    fn test_stored_filename_is_reduced_to_base_name() {
        let temp_dir = TempDir::new().unwrap();
        let inner = temp_dir.path().join("inner");
        fs::create_dir(&inner).unwrap();
        let source = inner.join("a.txt");
        fs::write(&source, b"data").unwrap();
        let svc = service();
        let encrypted = svc.encrypt_file(&source, "pw", None, false).unwrap();

        let bytes = fs::read(&encrypted).unwrap();
        let parsed = container::deserialize(&bytes).unwrap();
        let mut metadata = parsed.metadata.clone();
        metadata.original_filename = "../escaped.txt".to_string();
        fs::write(
            &encrypted,
            container::serialize(&metadata, parsed.ciphertext).unwrap(),
        )
        .unwrap();

        let decrypted = svc.decrypt_file(&encrypted, "pw", None).unwrap();
        assert_eq!(decrypted, inner.join("escaped.txt"));
        assert!(!temp_dir.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_encryption_info() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("report.pdf");
        fs::write(&source, vec![0u8; 40]).unwrap();
        let svc = service();
        let encrypted = svc.encrypt_file(&source, "pw", None, false).unwrap();

        let info = svc.encryption_info(&encrypted).unwrap();
        assert_eq!(info.original_filename, "report.pdf");
        assert_eq!(info.original_size, 40);
        assert_eq!(info.encrypted_size, 48);
        assert_eq!(info.algorithm, "AES-256-CBC");
        assert_eq!(info.key_derivation, "PBKDF2-SHA256");
        assert_eq!(info.iterations, 1000);
        assert_eq!(info.salt.len(), 32);
    }

    #[test]
    fn test_candidate_names() {
        let names: Vec<PathBuf> = candidate_names(Path::new("dir/archive.tar.gz")).take(3).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("dir/archive.tar.gz"),
                PathBuf::from("dir/archive.tar_1.gz"),
                PathBuf::from("dir/archive.tar_2.gz"),
            ]
        );

        let names: Vec<PathBuf> = candidate_names(Path::new("README")).take(2).collect();
        assert_eq!(names, vec![PathBuf::from("README"), PathBuf::from("README_1")]);
    }

    #[test]
    fn test_collision_limit() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, b"data").unwrap();
        fs::write(temp_dir.path().join("a_1.txt"), b"taken").unwrap();

        let svc = EncryptionService::new(
            EncryptionParameters::default()
                .with_iterations(1000)
                .with_max_name_attempts(1),
        )
        .unwrap();
        let encrypted = svc.encrypt_file(&source, "pw", None, false).unwrap();

        let err = svc.decrypt_file(&encrypted, "pw", None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NameCollisionExhausted);
    }

    #[test]
    fn test_store_password_keyed_by_original_name() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("taxes.xlsx");
        fs::write(&source, b"numbers").unwrap();

        let store = Arc::new(MemoryCredentialStore::new());
        let svc = EncryptionService::with_credential_store(
            EncryptionParameters::default().with_iterations(1000),
            store.clone(),
        )
        .unwrap();

        let out = temp_dir.path().join("renamed.bin");
        svc.encrypt_file(&source, "s3cret", Some(&out), true).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(svc.recall_password("taxes.xlsx").as_deref().map(String::as_str), Some("s3cret"));
        assert!(svc.recall_password("renamed.bin").is_none());

        svc.forget_password("taxes.xlsx");
        assert!(svc.recall_password("taxes.xlsx").is_none());
    }

    #[test]
    fn test_store_password_not_requested() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, b"data").unwrap();

        let store = Arc::new(MemoryCredentialStore::new());
        let svc = EncryptionService::with_credential_store(
            EncryptionParameters::default().with_iterations(1000),
            store.clone(),
        )
        .unwrap();
        svc.encrypt_file(&source, "pw", None, false).unwrap();
        assert!(store.is_empty());
    }

    #[traced_test]
    #[test]
    fn test_credential_store_failure_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, b"data").unwrap();

        let svc = EncryptionService::with_credential_store(
            EncryptionParameters::default().with_iterations(1000),
            Arc::new(FailingStore),
        )
        .unwrap();

        let encrypted = svc.encrypt_file(&source, "pw", None, true).unwrap();
        assert!(encrypted.exists());
        assert!(logs_contain("could not store password"));

        assert!(svc.recall_password("a.txt").is_none());
        svc.forget_password("a.txt");
        assert!(logs_contain("could not delete stored password"));
    }

    #[test]
    fn test_batch_skips_directories() {
        let temp_dir = TempDir::new().unwrap();
        let dir_input = temp_dir.path().join("subdir");
        fs::create_dir(&dir_input).unwrap();
        let file_input = temp_dir.path().join("a.txt");
        fs::write(&file_input, b"data").unwrap();
        let out_dir = temp_dir.path().join("out");

        let report = service()
            .batch_encrypt_report(&[&dir_input, &file_input], "pw", &out_dir, false)
            .unwrap();
        assert_eq!(report.encrypted, vec![out_dir.join("a.txt.encrypted")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, dir_input);
        assert_eq!(report.failed[0].1.kind, ErrorKind::InvalidParameters);
    }

    #[test]
    fn test_verify_password_on_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let junk = temp_dir.path().join("junk.encrypted");
        fs::write(&junk, b"definitely not a container").unwrap();

        let svc = service();
        assert!(!svc.verify_password(&junk, "pw"));
        assert!(!svc.verify_encrypted_file(&junk, "pw"));
        assert!(!svc.verify_password(&temp_dir.path().join("missing"), "pw"));
    }

    #[test]
    fn test_batch_does_not_overwrite_same_base_name() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("d1").join("a.txt");
        let second = temp_dir.path().join("d2").join("a.txt");
        fs::create_dir_all(first.parent().unwrap()).unwrap();
        fs::create_dir_all(second.parent().unwrap()).unwrap();
        fs::write(&first, b"first").unwrap();
        fs::write(&second, b"second").unwrap();
        let out_dir = temp_dir.path().join("out");

        let svc = service();
        let report = svc
            .batch_encrypt_report(&[&first, &second], "pw", &out_dir, false)
            .unwrap();
        assert_eq!(report.encrypted, vec![out_dir.join("a.txt.encrypted")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, second);
        assert_eq!(report.failed[0].1.kind, ErrorKind::InvalidParameters);

        let restored = temp_dir.path().join("restored.txt");
        svc.decrypt_file(&report.encrypted[0], "pw", Some(&restored)).unwrap();
        assert_eq!(fs::read(&restored).unwrap(), b"first");
    }

    #[test]
    fn test_header_reads_are_bounded() {
        let temp_dir = TempDir::new().unwrap();
        let bogus = temp_dir.path().join("bogus.bin");
        let mut bytes = u32::MAX.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        fs::write(&bogus, bytes).unwrap();

        let svc = service();
        let err = svc.encryption_info(&bogus).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidFormat);
        assert!(err.to_string().contains("exceeds limit"), "{}", err);
        assert!(!svc.verify_password(&bogus, "pw"));
        assert!(!svc.is_encrypted_file(&bogus));
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_non_utf8_file_name() {
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join(OsStr::from_bytes(b"caf\xe9.txt"));
        fs::write(&source, b"data").unwrap();

        let err = service().encrypt_file(&source, "pw", None, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
        assert!(!default_encrypted_path(&source).exists());
    }
}
