//! Fixtures shared by the KeyLedger test suites.
//!
//! [`TestDir`] gives each test a private data directory. [`strategies`]
//! generates keys, identities and operation sequences for property tests
//! over a deliberately tiny alphabet, so that random sequences collide on
//! the same keys and identities often.

#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::disallowed_methods))]

pub mod strategies;
mod test_dir;
pub use test_dir::TestDir;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_dirs_are_distinct() {
        let a = TestDir::new();
        let b = TestDir::new();
        assert!(a.path().is_dir());
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_join_does_not_create() {
        let dir = TestDir::new();
        let claims = dir.join("claims.json");
        assert_eq!(claims.parent(), Some(dir.path()));
        assert!(!claims.exists());
        assert!(dir.file_names().is_empty());
    }

    #[test]
    fn test_planted_documents_are_listed_sorted() {
        let dir = TestDir::new();
        dir.write("keys.json", "not json");
        dir.write("claims.json", "{}");

        assert_eq!(dir.read("keys.json"), "not json");
        assert_eq!(dir.file_names(), ["claims.json", "keys.json"]);
    }

    #[test]
    fn test_removed_on_drop() {
        let dir = TestDir::new();
        dir.write("keys.json", "{}");
        let path = dir.path().to_path_buf();

        drop(dir);

        assert!(!path.exists());
    }
}
