//! Errors surfaced by the `keyledger` binary.

use keyledger::{LedgerError, NotifyError};
use keyledger_store::StoreError;
use keyledger_types::ConfigError;
use snafu::Snafu;

/// Top-level error for one CLI invocation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    /// The repository options are invalid.
    #[snafu(display("invalid options: {source}"))]
    Options {
        /// The validation failure.
        source: ConfigError,
    },

    /// A policy argument is invalid.
    #[snafu(display("{source}"))]
    Config {
        /// The validation failure.
        source: ConfigError,
    },

    /// The data directory could not be locked.
    #[snafu(display("{source}"))]
    Lock {
        /// The lock failure.
        source: StoreError,
    },

    /// The admin event log could not be opened.
    #[snafu(display("{source}"))]
    Notifier {
        /// The open failure.
        source: NotifyError,
    },

    /// A ledger operation failed.
    #[snafu(display("{source}"))]
    Ledger {
        /// The ledger failure.
        source: LedgerError,
    },

    /// A key file could not be read.
    #[snafu(display("failed to read keys from {path}: {source}"))]
    ReadKeys {
        /// The key file.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Output could not be encoded.
    #[snafu(display("failed to encode output: {source}"))]
    Output {
        /// The serialization error.
        source: serde_json::Error,
    },
}

/// Result alias for CLI operations.
pub type Result<T, E = CliError> = std::result::Result<T, E>;

impl CliError {
    /// A recovery hint for the operator, when one applies.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Ledger { source } => Some(source.suggested_action()),
            Self::Lock { source: StoreError::Locked { .. } } => {
                Some("Another keyledger process is using this data directory. Wait for it to exit.")
            },
            Self::Config { .. } => Some("Use --min-days between 0 and 3650 and --mode account or guild."),
            _ => None,
        }
    }
}
