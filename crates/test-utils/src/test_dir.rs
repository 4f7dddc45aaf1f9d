//! Scratch data directories.
//!
//! Every test that touches disk gets its own [`TestDir`], so tests never share
//! documents or the `.lock` file and can run in parallel.

// Fixture I/O failures abort the test that hit them.
#![allow(clippy::expect_used, clippy::panic)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

/// A data directory that is deleted on drop.
///
/// ```
/// use keyledger_test_utils::TestDir;
///
/// let dir = TestDir::new();
/// dir.write("keys.json", r#"{"pool": ["A"]}"#);
/// assert_eq!(dir.file_names(), ["keys.json"]);
/// ```
pub struct TestDir(TempDir);

impl TestDir {
    /// Creates an empty directory under the system temp root.
    ///
    /// # Panics
    ///
    /// If the directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self(tempfile::Builder::new().prefix("keyledger-").tempdir().expect("create scratch dir"))
    }

    /// Absolute path of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.0.path()
    }

    /// Absolute path of `name` inside the directory. Nothing is created.
    #[must_use]
    pub fn join<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.path().join(name)
    }

    /// Replaces `name` with `contents`, bypassing the atomic writer. Used to
    /// plant arbitrary (including corrupt) documents.
    ///
    /// # Panics
    ///
    /// If the write fails.
    pub fn write<P: AsRef<Path>, C: AsRef<[u8]>>(&self, name: P, contents: C) {
        let target = self.join(name);
        fs::write(&target, contents)
            .unwrap_or_else(|e| panic!("write {}: {e}", target.display()));
    }

    /// Contents of `name` as UTF-8.
    ///
    /// # Panics
    ///
    /// If the file is missing or not UTF-8.
    #[must_use]
    pub fn read<P: AsRef<Path>>(&self, name: P) -> String {
        let target = self.join(name);
        fs::read_to_string(&target).unwrap_or_else(|e| panic!("read {}: {e}", target.display()))
    }

    /// Entry names in the directory, sorted. Handy for spotting quarantined
    /// or leftover temp files.
    ///
    /// # Panics
    ///
    /// If the directory cannot be listed.
    #[must_use]
    pub fn file_names(&self) -> Vec<String> {
        let mut names = fs::read_dir(self.path())
            .expect("list scratch dir")
            .map(|entry| {
                entry.expect("read dir entry").file_name().to_string_lossy().into_owned()
            })
            .collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}
