//! Admin notification side channel.
//!
//! After a mutation is committed the ledger hands a [`LedgerEvent`] to an
//! [`AdminNotifier`]. Notification is best effort: a failure is logged at
//! `warn` and never changes the outcome of the mutation that produced it.
//!
//! - [`NullNotifier`] drops every event
//! - [`FileNotifier`] appends JSON Lines to a file with `sync_data()` per event

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use keyledger_types::LedgerEvent;
use parking_lot::Mutex;
use snafu::{ResultExt, Snafu};

/// Receiver of committed ledger events.
///
/// Implementations must be `Send + Sync`; the ledger calls `notify` from
/// whichever thread committed the mutation, after its locks are released.
pub trait AdminNotifier: Send + Sync {
    /// Delivers one event.
    fn notify(&self, event: &LedgerEvent) -> Result<(), NotifyError>;
}

/// Notifier that discards every event.
pub struct NullNotifier;

impl AdminNotifier for NullNotifier {
    fn notify(&self, _event: &LedgerEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Appends events as JSON Lines to a file.
///
/// Writes are serialized by a mutex so lines from concurrent mutations never
/// interleave.
pub struct FileNotifier {
    file: Mutex<File>,
    path: PathBuf,
}

impl FileNotifier {
    /// Opens (or creates) the event log at `path` in append mode.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Io`] if the file or its parent directory cannot
    /// be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, NotifyError> {
        let path = path.into();
        let display = path.display().to_string();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).context(IoSnafu { path: &display })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(IoSnafu { path: &display })?;

        Ok(Self { file: Mutex::new(file), path })
    }

    /// Path of the event log.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AdminNotifier for FileNotifier {
    fn notify(&self, event: &LedgerEvent) -> Result<(), NotifyError> {
        let mut line = serde_json::to_vec(event).context(SerializationSnafu)?;
        line.push(b'\n');

        let path = self.path.display().to_string();
        let mut file = self.file.lock();
        file.write_all(&line).context(IoSnafu { path: &path })?;
        file.sync_data().context(IoSnafu { path })?;
        Ok(())
    }
}

/// Creates a notifier: a [`FileNotifier`] when a path is given, otherwise a
/// [`NullNotifier`].
///
/// # Errors
///
/// Returns [`NotifyError::Io`] if the event log cannot be opened.
pub fn create_notifier(path: Option<PathBuf>) -> Result<Arc<dyn AdminNotifier>, NotifyError> {
    match path {
        Some(path) => Ok(Arc::new(FileNotifier::open(path)?)),
        None => Ok(Arc::new(NullNotifier)),
    }
}

/// Admin notification error.
#[derive(Debug, Snafu)]
pub enum NotifyError {
    /// I/O error while opening or appending to the event log.
    #[snafu(display("notifier I/O error for {path}: {source}"))]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The event could not be encoded.
    #[snafu(display("failed to serialize ledger event: {source}"))]
    Serialization {
        /// Underlying serialization error.
        source: serde_json::Error,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use keyledger_test_utils::TestDir;
    use keyledger_types::{Identity, LedgerAction};

    use super::*;

    #[test]
    fn test_null_notifier_accepts_everything() {
        let event = LedgerEvent::now(LedgerAction::KeysAdded { count: 3 });
        assert!(NullNotifier.notify(&event).is_ok());
    }

    #[test]
    fn test_file_notifier_appends_json_lines() {
        let dir = TestDir::new();
        let notifier = FileNotifier::open(dir.join("events/admin.jsonl")).unwrap();

        notifier.notify(&LedgerEvent::now(LedgerAction::KeysAdded { count: 2 })).unwrap();
        notifier
            .notify(&LedgerEvent::now(LedgerAction::KeyClaimed { identity: Identity::new("9") }))
            .unwrap();

        let content = dir.read("events/admin.jsonl");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: LedgerEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.action, LedgerAction::KeysAdded { count: 2 });
        let second: LedgerEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.action, LedgerAction::KeyClaimed { identity: Identity::new("9") });
    }

    #[test]
    fn test_file_notifier_reopen_appends() {
        let dir = TestDir::new();
        let path = dir.join("admin.jsonl");
        {
            let notifier = FileNotifier::open(&path).unwrap();
            notifier.notify(&LedgerEvent::now(LedgerAction::KeysAdded { count: 1 })).unwrap();
        }
        let notifier = FileNotifier::open(&path).unwrap();
        notifier.notify(&LedgerEvent::now(LedgerAction::KeysAdded { count: 1 })).unwrap();

        assert_eq!(dir.read("admin.jsonl").lines().count(), 2);
    }

    #[test]
    fn test_create_notifier_without_path_is_null() {
        let notifier = create_notifier(None).unwrap();
        assert!(notifier.notify(&LedgerEvent::now(LedgerAction::KeysAdded { count: 0 })).is_ok());
    }
}
