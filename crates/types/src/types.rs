//! Core type definitions for KeyLedger.
//!
//! - [`Key`]: an opaque distribution token held in the pool or bound to a claim
//! - [`Identity`]: the stable identifier of a requester (e.g. a numeric account id)
//!
//! Both are string newtypes so that a key can never be passed where an
//! identity is expected. They serialize transparently, which keeps the
//! persisted documents plain JSON strings.

use std::{borrow::Borrow, fmt};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ============================================================================
// Token Types
// ============================================================================

/// Generates a newtype wrapper around `String` for type-safe opaque tokens.
///
/// Each generated type provides:
/// - Standard derives: Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord
/// - Serde with `#[serde(transparent)]` for document format compatibility
/// - `new()` constructor, `normalized()` trimming constructor and `as_str()` accessor
/// - `Display` that prints the raw value (keys and identities are exported verbatim)
macro_rules! define_token {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, JsonSchema,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw value without normalization.
            #[inline]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Trims surrounding whitespace, returning `None` when nothing remains.
            #[must_use]
            pub fn normalized(raw: &str) -> Option<Self> {
                let trimmed = raw.trim();
                (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
            }

            /// Returns the raw string value.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the token, returning the raw string value.
            #[inline]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<$name> for String {
            #[inline]
            fn from(token: $name) -> Self {
                token.0
            }
        }

        impl AsRef<str> for $name {
            #[inline]
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            #[inline]
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

define_token!(
    /// An opaque, unique distribution token.
    ///
    /// A key is in exactly one of three states at any instant: pooled,
    /// claimed by a single identity, or purged from the system.
    Key
);

define_token!(
    /// A stable requester identifier, such as a platform account id.
    ///
    /// The ledger never interprets the value; authentication happens upstream.
    Identity
);

impl From<u64> for Identity {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_normalized_trims_whitespace() {
        let key = Key::normalized("  ABC-123 \n").expect("non-empty");
        assert_eq!(key.as_str(), "ABC-123");
    }

    #[test]
    fn test_normalized_rejects_blank() {
        assert!(Key::normalized("").is_none());
        assert!(Key::normalized("   \t").is_none());
        assert!(Identity::normalized("\n").is_none());
    }

    #[test]
    fn test_display_is_raw_value() {
        assert_eq!(Key::new("K-1").to_string(), "K-1");
        assert_eq!(Identity::from(42u64).to_string(), "42");
    }

    #[test]
    fn test_serde_transparent() {
        let key = Key::new("K-1");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"K-1\"");
        let identity: Identity = serde_json::from_str("\"1234\"").unwrap();
        assert_eq!(identity, Identity::new("1234"));
    }

    #[test]
    fn test_borrow_allows_str_lookup() {
        let set: HashSet<Key> = [Key::new("A"), Key::new("B")].into_iter().collect();
        assert!(set.contains("A"));
        assert!(!set.contains("C"));
    }
}
