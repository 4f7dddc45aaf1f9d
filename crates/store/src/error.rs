//! Error types for the durable state repository.

use std::io;

use snafu::Snafu;

/// Result type alias for repository operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors that can occur while reading or writing persisted documents.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// A document could not be encoded. Nothing was written.
    #[snafu(display("failed to serialize {document}: {source}"))]
    Serialize {
        /// Which document failed to encode.
        document: String,
        /// The underlying serialization error.
        source: serde_json::Error,
    },

    /// I/O error while preparing, writing or syncing a file.
    #[snafu(display("I/O error during {operation} on {path}: {source}"))]
    Io {
        /// What the repository was doing.
        operation: &'static str,
        /// The path involved.
        path: String,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The final rename over the target failed. The previous document is intact.
    #[snafu(display("failed to replace {path}: {source}"))]
    Persist {
        /// The target path.
        path: String,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// A document is unreadable or corrupt and the corruption policy is `abort`.
    #[snafu(display("refusing to start: {path} is unusable ({reason})"))]
    Fatal {
        /// The damaged document.
        path: String,
        /// Why it could not be used.
        reason: String,
    },

    /// The data directory is already locked by another process.
    #[snafu(display("data directory is already locked by another process: {path}"))]
    Locked {
        /// The locked data directory.
        path: String,
    },
}

impl StoreError {
    /// Returns true if retrying the same operation may succeed.
    ///
    /// I/O and rename failures can be transient (disk pressure, a briefly
    /// held file). Encoding failures and refused startups are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Persist { .. })
    }
}
