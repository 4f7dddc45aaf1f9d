//! Error types for ledger operations.
//!
//! Conflicts (identity already claimed, key held by another identity, pool
//! exhausted) are *outcomes*, returned as values from the operations
//! themselves. [`LedgerError`] covers the cases where an operation could not
//! run or could not be made durable.
//!
//! Each variant maps to an [`ErrorCode`] with a numeric identifier,
//! retryability classification, and suggested recovery action.

use snafu::{Location, Snafu};

use keyledger_store::StoreError;
use keyledger_types::ConfigError;

/// Result type for ledger operations.
pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// Machine-readable error codes.
///
/// | Range     | Domain      | Examples                              |
/// |-----------|-------------|---------------------------------------|
/// | 1000–1099 | Persistence | Save failed, load refused             |
/// | 2000–2099 | Request     | Blank key or identity, bad config     |
/// | 3000–3099 | Internal    | Invariant violation                   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// A document could not be written. State is unchanged.
    Persistence = 1000,
    /// Persisted state could not be loaded.
    Load = 1001,
    /// A key argument was empty after trimming.
    InvalidKey = 2000,
    /// A configuration value was rejected.
    InvalidConfig = 2001,
    /// An identity argument was empty after trimming.
    InvalidIdentity = 2002,
    /// Committed state violates a ledger invariant.
    Internal = 3000,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for unknown values.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Persistence),
            1001 => Some(Self::Load),
            2000 => Some(Self::InvalidKey),
            2001 => Some(Self::InvalidConfig),
            2002 => Some(Self::InvalidIdentity),
            3000 => Some(Self::Internal),
            _ => None,
        }
    }

    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Persistence)
    }

    /// Suggested recovery action for this error code.
    #[must_use]
    pub const fn suggested_action(self) -> &'static str {
        match self {
            Self::Persistence => {
                "Check disk space and permissions on the data directory, then retry. No change was applied."
            },
            Self::Load => {
                "Repair or remove the damaged document, or restart with --on-corrupt recover to quarantine it."
            },
            Self::InvalidKey => "Provide a non-empty key.",
            Self::InvalidIdentity => "Provide a non-empty identity.",
            Self::InvalidConfig => {
                "Use a min_days value between 0 and 3650 and a mode of 'account' or 'guild'."
            },
            Self::Internal => {
                "Stop issuing keys and inspect keys.json and claims.json. Report the error details."
            },
        }
    }
}

/// Errors returned by [`KeyLedger`](crate::KeyLedger) operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LedgerError {
    /// A configuration update was rejected. State is unchanged.
    #[snafu(display("invalid configuration: {source}"))]
    InvalidConfig {
        /// The validation failure.
        source: ConfigError,
    },

    /// A key argument was empty after trimming.
    #[snafu(display("invalid key: {message}"))]
    InvalidKey {
        /// What was wrong with the key.
        message: String,
    },

    /// An identity argument was empty after trimming.
    #[snafu(display("invalid identity: {message}"))]
    InvalidIdentity {
        /// What was wrong with the identity.
        message: String,
    },

    /// A document could not be made durable. In-memory state is unchanged.
    #[snafu(display("failed to persist {document}: {source}"))]
    Persistence {
        /// Which document failed.
        document: &'static str,
        /// The underlying repository error.
        source: StoreError,
    },

    /// Persisted state could not be loaded at open.
    #[snafu(display("failed to load ledger state: {source}"))]
    Load {
        /// The underlying repository error.
        source: StoreError,
    },

    /// Committed state violates a ledger invariant.
    #[snafu(display("ledger invariant violated at {location}: {message}"))]
    Internal {
        /// Which invariant failed.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },
}

impl LedgerError {
    /// Returns the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::InvalidKey { .. } => ErrorCode::InvalidKey,
            Self::InvalidIdentity { .. } => ErrorCode::InvalidIdentity,
            Self::Persistence { .. } => ErrorCode::Persistence,
            Self::Load { .. } => ErrorCode::Load,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// Whether this error is retryable. Delegates to [`ErrorCode::is_retryable`].
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Suggested recovery action. Delegates to [`ErrorCode::suggested_action`].
    #[must_use]
    pub const fn suggested_action(&self) -> &'static str {
        self.code().suggested_action()
    }
}
