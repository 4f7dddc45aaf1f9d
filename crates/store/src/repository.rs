//! Durable state repository.
//!
//! Loads and saves the pool + configuration document and the claims
//! document. Loading never fails on a *missing* document; what happens on an
//! unreadable or corrupt one depends on the [`CorruptionPolicy`]:
//!
//! | Document state | `Recover` | `Abort` |
//! |----------------|-----------|---------|
//! | missing        | `Defaulted { Missing }` | `Defaulted { Missing }` |
//! | unreadable     | quarantine, `Defaulted { Unreadable }` | `Err(Fatal)` |
//! | corrupt        | quarantine, `Defaulted { Corrupt }` | `Err(Fatal)` |
//!
//! Saves go through [`atomic_write_json`], so a failed save leaves the
//! previous document in place.

use std::{fmt, fs, io, path::Path};

use chrono::Utc;
use keyledger_types::{CorruptionPolicy, RepositoryOptions};
use tracing::{debug, warn};

use crate::{
    atomic::atomic_write_json,
    documents::{ClaimsDocument, PoolDocument},
    error::{FatalSnafu, Result},
};

/// Why a document was replaced with its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultReason {
    /// The file does not exist (first run).
    Missing,
    /// The file exists but could not be read.
    Unreadable(String),
    /// The file was read but is not a valid document.
    Corrupt(String),
}

impl fmt::Display for DefaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Unreadable(msg) => write!(f, "unreadable: {msg}"),
            Self::Corrupt(msg) => write!(f, "corrupt: {msg}"),
        }
    }
}

/// Result of loading one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome<T> {
    /// The document was read and decoded.
    Loaded(T),
    /// The document could not be used; `value` is the default.
    Defaulted {
        /// The substituted default document.
        value: T,
        /// Why the default was used.
        reason: DefaultReason,
    },
}

impl<T> LoadOutcome<T> {
    /// Returns the loaded or defaulted document.
    pub fn into_value(self) -> T {
        match self {
            Self::Loaded(value) | Self::Defaulted { value, .. } => value,
        }
    }

    /// Borrows the loaded or defaulted document.
    pub fn value(&self) -> &T {
        match self {
            Self::Loaded(value) | Self::Defaulted { value, .. } => value,
        }
    }

    /// Returns why the default was used, if it was.
    pub fn reason(&self) -> Option<&DefaultReason> {
        match self {
            Self::Loaded(_) => None,
            Self::Defaulted { reason, .. } => Some(reason),
        }
    }

    /// Splits into the document and the default reason.
    pub fn into_parts(self) -> (T, Option<DefaultReason>) {
        match self {
            Self::Loaded(value) => (value, None),
            Self::Defaulted { value, reason } => (value, Some(reason)),
        }
    }
}

/// Reads and writes the two persisted documents.
#[derive(Debug, Clone)]
pub struct StateRepository {
    options: RepositoryOptions,
}

impl StateRepository {
    /// Creates a repository over validated options.
    #[must_use]
    pub fn new(options: RepositoryOptions) -> Self {
        Self { options }
    }

    /// The options this repository was created with.
    #[must_use]
    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    /// Loads the pool + configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Fatal`](crate::StoreError::Fatal) if the document
    /// is unusable and the corruption policy is `Abort`.
    pub fn load_pool(&self) -> Result<LoadOutcome<PoolDocument>> {
        self.load(&self.options.pool_path(), PoolDocument::decode)
    }

    /// Loads the claims document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Fatal`](crate::StoreError::Fatal) if the document
    /// is unusable and the corruption policy is `Abort`.
    pub fn load_claims(&self) -> Result<LoadOutcome<ClaimsDocument>> {
        self.load(&self.options.claims_path(), ClaimsDocument::decode)
    }

    /// Atomically replaces the pool + configuration document.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::StoreError) if encoding or writing
    /// fails; the previous document is left intact.
    pub fn save_pool(&self, document: &PoolDocument) -> Result<()> {
        atomic_write_json(&self.options.pool_path(), "pool document", document)
    }

    /// Atomically replaces the claims document.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::StoreError) if encoding or writing
    /// fails; the previous document is left intact.
    pub fn save_claims(&self, document: &ClaimsDocument) -> Result<()> {
        atomic_write_json(&self.options.claims_path(), "claims document", document)
    }

    fn load<T: Default>(
        &self,
        path: &Path,
        decode: fn(&[u8]) -> std::result::Result<T, serde_json::Error>,
    ) -> Result<LoadOutcome<T>> {
        let reason = match fs::read(path) {
            Ok(bytes) => match decode(&bytes) {
                Ok(value) => {
                    debug!(path = %path.display(), "Loaded document");
                    return Ok(LoadOutcome::Loaded(value));
                },
                Err(e) => DefaultReason::Corrupt(e.to_string()),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Document missing, starting empty");
                return Ok(LoadOutcome::Defaulted {
                    value: T::default(),
                    reason: DefaultReason::Missing,
                });
            },
            Err(e) => DefaultReason::Unreadable(e.to_string()),
        };

        match self.options.corruption_policy {
            CorruptionPolicy::Abort => {
                FatalSnafu { path: path.display().to_string(), reason: reason.to_string() }.fail()
            },
            CorruptionPolicy::Recover => {
                warn!(path = %path.display(), %reason, "Document unusable, continuing from defaults");
                quarantine(path);
                Ok(LoadOutcome::Defaulted { value: T::default(), reason })
            },
        }
    }
}

/// Renames a damaged document aside so the next save cannot overwrite it.
///
/// Failure is logged only; the load continues either way.
fn quarantine(path: &Path) {
    let Some(file_name) = path.file_name() else {
        return;
    };
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let target = path.with_file_name(format!("{}.corrupt-{stamp}", file_name.to_string_lossy()));

    match fs::rename(path, &target) {
        Ok(()) => {
            warn!(from = %path.display(), to = %target.display(), "Quarantined damaged document");
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to quarantine damaged document");
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]
mod tests {
    use keyledger_test_utils::TestDir;
    use keyledger_types::{EligibilityMode, EligibilityPolicy, Identity, Key};

    use super::*;
    use crate::StoreError;

    fn repository(dir: &TestDir, policy: CorruptionPolicy) -> StateRepository {
        let options = RepositoryOptions::builder()
            .data_dir(dir.path())
            .corruption_policy(policy)
            .build()
            .unwrap();
        StateRepository::new(options)
    }

    fn quarantined(dir: &TestDir, prefix: &str) -> Vec<String> {
        fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(&format!("{prefix}.corrupt-")))
            .collect()
    }

    // ============================================
    // Missing documents
    // ============================================

    #[test]
    fn test_missing_documents_default() {
        let dir = TestDir::new();
        let repo = repository(&dir, CorruptionPolicy::Abort);

        let pool = repo.load_pool().unwrap();
        assert_eq!(pool.reason(), Some(&DefaultReason::Missing));
        assert_eq!(pool.into_value(), PoolDocument::default());

        let claims = repo.load_claims().unwrap();
        assert_eq!(claims.reason(), Some(&DefaultReason::Missing));
        assert!(claims.value().claims.is_empty());
    }

    // ============================================
    // Save / load
    // ============================================

    #[test]
    fn test_saved_documents_load_back() {
        let dir = TestDir::new();
        let repo = repository(&dir, CorruptionPolicy::Recover);

        let pool = PoolDocument {
            pool: vec![Key::new("A"), Key::new("B")],
            config: EligibilityPolicy { min_days: 14, mode: EligibilityMode::Guild },
        };
        let mut claims = ClaimsDocument::default();
        claims.claims.insert(Identity::new("100"), Key::new("Z"));

        repo.save_pool(&pool).unwrap();
        repo.save_claims(&claims).unwrap();

        assert_eq!(repo.load_pool().unwrap(), LoadOutcome::Loaded(pool));
        assert_eq!(repo.load_claims().unwrap(), LoadOutcome::Loaded(claims));
    }

    #[test]
    fn test_save_writes_expected_files() {
        let dir = TestDir::new();
        let repo = repository(&dir, CorruptionPolicy::Recover);

        repo.save_pool(&PoolDocument::default()).unwrap();
        repo.save_claims(&ClaimsDocument::default()).unwrap();

        assert!(dir.join("keys.json").exists());
        assert!(dir.join("claims.json").exists());
        let claims = fs::read_to_string(dir.join("claims.json")).unwrap();
        assert_eq!(claims.trim(), "{}");
    }

    // ============================================
    // Corruption handling
    // ============================================

    #[test]
    fn test_corrupt_pool_recovers_and_quarantines() {
        let dir = TestDir::new();
        fs::write(dir.join("keys.json"), b"{ not json").unwrap();
        let repo = repository(&dir, CorruptionPolicy::Recover);

        let outcome = repo.load_pool().unwrap();
        assert!(matches!(outcome.reason(), Some(DefaultReason::Corrupt(_))), "got {outcome:?}");
        assert_eq!(outcome.into_value(), PoolDocument::default());

        assert!(!dir.join("keys.json").exists(), "damaged file should be moved aside");
        let moved = quarantined(&dir, "keys.json");
        assert_eq!(moved.len(), 1);
        assert_eq!(fs::read(dir.join(&moved[0])).unwrap(), b"{ not json");
    }

    #[test]
    fn test_corrupt_claims_abort_is_fatal() {
        let dir = TestDir::new();
        fs::write(dir.join("claims.json"), b"[\"not a map\"]").unwrap();
        let repo = repository(&dir, CorruptionPolicy::Abort);

        match repo.load_claims() {
            Err(StoreError::Fatal { path, reason }) => {
                assert!(path.ends_with("claims.json"));
                assert!(reason.starts_with("corrupt"), "reason: {reason}");
            },
            other => panic!("expected Fatal, got {other:?}"),
        }
        assert!(dir.join("claims.json").exists(), "abort must not move the file");
        assert!(quarantined(&dir, "claims.json").is_empty());
    }

    #[test]
    fn test_unreadable_document_is_distinguished() {
        let dir = TestDir::new();
        // A directory where the document should be cannot be read as a file.
        fs::create_dir(dir.join("keys.json")).unwrap();
        let repo = repository(&dir, CorruptionPolicy::Abort);

        match repo.load_pool() {
            Err(StoreError::Fatal { reason, .. }) => {
                assert!(reason.starts_with("unreadable"), "reason: {reason}");
            },
            other => panic!("expected Fatal, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_save_keeps_previous_document() {
        let dir = TestDir::new();
        let repo = repository(&dir, CorruptionPolicy::Recover);
        let before = PoolDocument { pool: vec![Key::new("KEEP")], ..PoolDocument::default() };
        repo.save_pool(&before).unwrap();

        // A non-empty directory at the claims path makes the rename fail.
        fs::create_dir_all(dir.join("claims.json").join("inner")).unwrap();
        assert!(repo.save_claims(&ClaimsDocument::default()).is_err());

        assert_eq!(repo.load_pool().unwrap(), LoadOutcome::Loaded(before));
    }
}
