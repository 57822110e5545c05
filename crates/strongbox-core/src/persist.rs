//! Atomic file publication.
//!
//! Output files are written to a temporary file in the destination directory
//! and renamed into place only once fully written and synced, so a failed
//! operation never leaves a partial key or vault file behind. Concurrent
//! writers to the same destination are a caller error.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Who may read the published file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Mode 0644 on Unix.
    Shared,
    /// Mode 0600 on Unix. Used for private key files.
    OwnerOnly,
}

/// What to do when the destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    Replace,
    Refuse,
}

/// Atomically write `contents` to `path`.
///
/// # Errors
///
/// Returns the underlying I/O error if the temporary file cannot be created,
/// written, or renamed, or [`io::ErrorKind::AlreadyExists`] when `overwrite`
/// is [`Overwrite::Refuse`] and `path` exists. The temporary file is removed
/// on every failure path.
pub fn write_atomic(
    path: &Path,
    contents: &[u8],
    visibility: Visibility,
    overwrite: Overwrite,
) -> io::Result<()> {
    // Same directory keeps the final rename on one filesystem.
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(parent)?;
    set_visibility(&temp, visibility)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;

    match overwrite {
        Overwrite::Replace => temp.persist(path).map_err(|e| e.error)?,
        Overwrite::Refuse => temp.persist_noclobber(path).map_err(|e| e.error)?,
    };
    Ok(())
}

#[cfg(unix)]
fn set_visibility(temp: &NamedTempFile, visibility: Visibility) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = match visibility {
        Visibility::Shared => 0o644,
        Visibility::OwnerOnly => 0o600,
    };
    temp.as_file()
        .set_permissions(std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_visibility(_temp: &NamedTempFile, _visibility: Visibility) -> io::Result<()> {
    Ok(())
}
