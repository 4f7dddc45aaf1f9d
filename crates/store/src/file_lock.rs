//! Single-process ownership of a ledger data directory.
//!
//! The ledger's exclusion domain lives in memory, so a second process pointed
//! at the same `keys.json`/`claims.json` would interleave its own
//! load-mutate-save cycles with ours and lose updates. The entry point takes
//! a [`DataDirLock`] before opening the ledger and keeps it until it exits.
//!
//! The lock is an OS advisory lock (`flock` on Unix) on `<data_dir>/.lock`.
//! The kernel drops it when the holder dies, so a crash never leaves the
//! directory wedged; the `.lock` file itself is left in place and reused.
//!
//! ```no_run
//! use keyledger_store::DataDirLock;
//!
//! let _guard = DataDirLock::acquire("/var/lib/keyledger")?;
//! // open the ledger, run, flush; the guard unlocks on drop
//! # Ok::<(), keyledger_store::StoreError>(())
//! ```

use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use fs2::FileExt;
use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::error::{IoSnafu, LockedSnafu, Result};

/// Lock file name inside the data directory.
pub const LOCK_FILE_NAME: &str = ".lock";

/// Held lock on a data directory; unlocks on drop.
#[derive(Debug)]
pub struct DataDirLock {
    handle: File,
    data_dir: PathBuf,
}

impl DataDirLock {
    /// Takes the lock without waiting. A missing `data_dir` is created.
    ///
    /// # Errors
    ///
    /// [`StoreError::Locked`](crate::StoreError::Locked) when another process
    /// owns the directory, [`StoreError::Io`](crate::StoreError::Io) when the
    /// directory or lock file cannot be created or locked.
    pub fn acquire(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).context(IoSnafu {
            operation: "create data directory",
            path: data_dir.display().to_string(),
        })?;

        let lock_file = data_dir.join(LOCK_FILE_NAME);
        // Never truncate: the file carries no content, only the lock.
        let handle = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_file)
            .context(IoSnafu { operation: "open lock file", path: lock_file.display().to_string() })?;

        if let Err(e) = handle.try_lock_exclusive() {
            if is_contended(&e) {
                warn!(data_dir = %data_dir.display(), "Data directory is in use by another process");
                return LockedSnafu { path: data_dir.display().to_string() }.fail();
            }
            return Err(e)
                .context(IoSnafu { operation: "lock data directory", path: lock_file.display().to_string() });
        }

        info!(data_dir = %data_dir.display(), "Locked data directory");
        Ok(Self { handle, data_dir })
    }

    /// The directory this lock owns.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Contention shows up as `WouldBlock`, or on some targets as a raw
/// EAGAIN/EWOULDBLOCK (11 on Linux, 35 on macOS).
fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock || matches!(e.raw_os_error(), Some(11 | 35))
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        match FileExt::unlock(&self.handle) {
            Ok(()) => debug!(data_dir = %self.data_dir.display(), "Unlocked data directory"),
            Err(e) => {
                warn!(data_dir = %self.data_dir.display(), error = %e, "Failed to unlock data directory");
            },
        }
    }
}
