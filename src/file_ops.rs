//! Output file writing
//!
//! Both helpers stage the full contents in a temporary file in the target
//! directory, flush and fsync it, restrict permissions to the owner on Unix,
//! and only then rename it into place. A crash therefore leaves either no
//! output or a complete one, never a partial file.

use crate::error::{ErrorCategory, ErrorKind, FilecryptError, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Atomically write `contents` to `path`, replacing any existing file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_file = stage(path, contents)?;
    temp_file.persist(path).map_err(|e| {
        FilecryptError::from_io(
            format!("failed to rename to target file {}", path.display()),
            e.error,
        )
    })?;
    Ok(())
}

/// Write `contents` to the first path produced by `candidates` that does
/// not exist yet, never replacing an existing file.
///
/// Gives up with `NameCollisionExhausted` once `max_attempts` candidates
/// have been taken.
pub fn write_new<I>(candidates: I, max_attempts: u32, contents: &[u8]) -> Result<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut candidates = candidates.into_iter().take(max_attempts as usize).peekable();
    let first = candidates.peek().cloned().ok_or_else(|| {
        FilecryptError::new(
            ErrorCategory::Internal,
            ErrorKind::InvalidParameters,
            "no output path candidates",
        )
    })?;

    let mut temp_file = stage(&first, contents)?;
    for candidate in candidates {
        match temp_file.persist_noclobber(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                temp_file = e.file;
            }
            Err(e) => {
                return Err(FilecryptError::from_io(
                    format!("failed to rename to target file {}", candidate.display()),
                    e.error,
                ));
            }
        }
    }

    Err(FilecryptError::new(
        ErrorCategory::User,
        ErrorKind::NameCollisionExhausted,
        format!(
            "no free output name near {} after {} attempts",
            first.display(),
            max_attempts
        ),
    ))
}

fn stage(path: &Path, contents: &[u8]) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
        FilecryptError::from_io(format!("failed to create tempfile in {}", dir.display()), e)
    })?;

    temp_file
        .write_all(contents)
        .map_err(|e| FilecryptError::from_io("failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| FilecryptError::from_io("failed to flush tempfile", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| FilecryptError::from_io("failed to sync file prior to rename", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| FilecryptError::from_io("failed to get tempfile metadata", e))?
            .permissions();
        perms.set_mode(0o600);
        temp_file
            .as_file()
            .set_permissions(perms)
            .map_err(|e| FilecryptError::from_io("failed to set tempfile permissions", e))?;
    }

    Ok(temp_file)
}
