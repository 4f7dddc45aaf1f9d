//! Atomic-replace file writes.
//!
//! A reader of the target path observes either the complete previous file or
//! the complete new file, never a partial write:
//!
//! ```text
//! NamedTempFile::new_in(dir) → write → flush → fsync → rename over target → fsync(dir)
//! ```
//!
//! The temporary file lives in the target's own directory so the rename never
//! crosses a filesystem. If any step fails the temporary file is removed when
//! it is dropped and the target is untouched.

use std::{fs, io::Write, path::Path};

use serde::Serialize;
use snafu::ResultExt;
use tempfile::NamedTempFile;

use crate::error::{IoSnafu, PersistSnafu, Result, SerializeSnafu};

/// Writes `data` to `path` via temp file + fsync + rename.
///
/// Creates the parent directory if it does not exist.
///
/// # Errors
///
/// Returns [`StoreError::Io`](crate::StoreError::Io) if the temporary file
/// cannot be created, written or synced, and
/// [`StoreError::Persist`](crate::StoreError::Persist) if the final rename fails.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let path_str = path.display().to_string();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    if !parent.exists() {
        fs::create_dir_all(parent).context(IoSnafu {
            operation: "create directory",
            path: parent.display().to_string(),
        })?;
    }

    let mut tmp = NamedTempFile::new_in(parent)
        .context(IoSnafu { operation: "create temp file", path: &path_str })?;
    tmp.write_all(data).context(IoSnafu { operation: "write temp file", path: &path_str })?;
    tmp.flush().context(IoSnafu { operation: "flush temp file", path: &path_str })?;
    tmp.as_file().sync_all().context(IoSnafu { operation: "fsync temp file", path: &path_str })?;

    tmp.persist(path).map_err(|e| e.error).context(PersistSnafu { path: &path_str })?;

    sync_directory(parent);
    Ok(())
}

/// Serializes `value` as pretty JSON and writes it with [`atomic_write`].
///
/// Serialization happens entirely in memory first, so an encoding failure
/// never touches the filesystem.
///
/// # Errors
///
/// Returns [`StoreError::Serialize`](crate::StoreError::Serialize) on encoding
/// failure, or any error from [`atomic_write`].
pub fn atomic_write_json<T: Serialize>(path: &Path, document: &str, value: &T) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(value).context(SerializeSnafu { document })?;
    json.push(b'\n');
    atomic_write(path, &json)
}

/// Fsyncs a directory so a completed rename survives power loss.
///
/// Directory handles cannot be synced on every platform; a failure here does
/// not undo the rename, so it is logged rather than returned.
fn sync_directory(dir: &Path) {
    #[cfg(unix)]
    {
        let result = fs::File::open(dir).and_then(|handle| handle.sync_all());
        if let Err(e) = result {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to fsync directory");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
}
