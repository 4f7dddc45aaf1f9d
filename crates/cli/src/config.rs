//! Command-line configuration.
//!
//! Global flags fall back to environment variables where an operator is
//! likely to fix them per deployment:
//!
//! | Flag            | Env var                 | Default   |
//! |-----------------|-------------------------|-----------|
//! | `--data-dir`    | `KEYLEDGER_DATA_DIR`    | `.`       |
//! | `--notify-log`  | `KEYLEDGER_NOTIFY_LOG`  | (none)    |
//! | `--log-format`  |                         | `auto`    |
//! | `--on-corrupt`  |                         | `recover` |

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use keyledger_types::CorruptionPolicy;

use crate::eligibility::parse_timestamp;

/// KeyLedger: one-time trial key distribution.
#[derive(Debug, Parser)]
#[command(name = "keyledger", version, about)]
pub struct Cli {
    /// Directory holding keys.json and claims.json.
    #[arg(long, env = "KEYLEDGER_DATA_DIR", default_value = ".", global = true)]
    pub data_dir: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Auto, global = true)]
    pub log_format: LogFormat,

    /// What to do when a document is unreadable or corrupt.
    #[arg(long, value_enum, default_value_t = OnCorrupt::Recover, global = true)]
    pub on_corrupt: OnCorrupt,

    /// Append admin events as JSON Lines to this file.
    #[arg(long, env = "KEYLEDGER_NOTIFY_LOG", global = true)]
    pub notify_log: Option<PathBuf>,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text.
    Text,
    /// One JSON object per event.
    Json,
    /// JSON when stderr is not a terminal, text otherwise.
    Auto,
}

/// Corruption handling at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnCorrupt {
    /// Quarantine the damaged file and continue from defaults.
    Recover,
    /// Refuse to start.
    Abort,
}

impl From<OnCorrupt> for CorruptionPolicy {
    fn from(value: OnCorrupt) -> Self {
        match value {
            OnCorrupt::Recover => Self::Recover,
            OnCorrupt::Abort => Self::Abort,
        }
    }
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the JSON Schema of the pool document.
    Schema,
    /// Operations that run against the ledger.
    #[command(flatten)]
    Ledger(LedgerCommand),
}

/// Operations that lock and open the data directory.
#[derive(Debug, Subcommand)]
pub enum LedgerCommand {
    /// Add keys to the pool (comma or newline separated).
    AddKeys {
        /// Keys to add.
        keys: Vec<String>,
        /// Read additional keys from a file.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List pooled keys.
    ListKeys,
    /// List all claims.
    ListClaims,
    /// Claim a key for an identity, if it qualifies.
    Claim {
        /// Claiming identity.
        identity: String,
        /// Account creation time (checked in `account` mode).
        #[arg(long, value_parser = parse_timestamp)]
        account_created: Option<DateTime<Utc>>,
        /// Membership join time (checked in `guild` mode).
        #[arg(long, value_parser = parse_timestamp)]
        joined_at: Option<DateTime<Utc>>,
    },
    /// Show the key an identity holds.
    MyKey {
        /// Identity to look up.
        identity: String,
    },
    /// Revoke an identity's claim.
    Revoke {
        /// Identity whose claim is revoked.
        identity: String,
        /// Discard the key instead of returning it to the pool head.
        #[arg(long)]
        purge: bool,
    },
    /// Bind a specific key to an identity.
    Assign {
        /// Receiving identity.
        identity: String,
        /// Key to bind.
        key: String,
        /// Refuse instead of taking the key out of the pool.
        #[arg(long)]
        keep_in_pool: bool,
    },
    /// Purge a key from the pool, or from the claim holding it.
    RemoveKey {
        /// Key to purge.
        key: String,
    },
    /// Print pooled keys, one per line.
    ExportKeys,
    /// Print claims as `user_id,key` CSV.
    ExportClaims,
    /// Show or change the eligibility policy.
    Config {
        /// Config action.
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print pool and claim counts.
    Stats {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Eligibility policy actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the current policy.
    Show,
    /// Change one or both policy fields.
    #[command(group(ArgGroup::new("change").required(true).multiple(true).args(["min_days", "mode"])))]
    Set {
        /// Minimum qualifying age in days (0-3650).
        #[arg(long, allow_negative_numbers = true)]
        min_days: Option<i64>,
        /// `account` or `guild`.
        #[arg(long)]
        mode: Option<String>,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "keyledger",
            "claim",
            "42",
            "--account-created",
            "2020-01-01",
            "--data-dir",
            "/tmp/kl",
            "--on-corrupt",
            "abort",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/kl"));
        assert_eq!(cli.on_corrupt, OnCorrupt::Abort);
        match cli.command {
            Command::Ledger(LedgerCommand::Claim { identity, account_created, joined_at }) => {
                assert_eq!(identity, "42");
                assert!(account_created.is_some());
                assert!(joined_at.is_none());
            },
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_config_set_requires_a_field() {
        assert!(Cli::try_parse_from(["keyledger", "config", "set"]).is_err());
        let cli = Cli::try_parse_from(["keyledger", "config", "set", "--min-days", "-1"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Ledger(LedgerCommand::Config {
                action: ConfigAction::Set { min_days: Some(-1), mode: None }
            })
        ));
    }

    #[test]
    fn test_schema_is_not_a_ledger_command() {
        let cli = Cli::try_parse_from(["keyledger", "schema"]).unwrap();
        assert!(matches!(cli.command, Command::Schema));
        let cli = Cli::try_parse_from(["keyledger", "stats", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Ledger(LedgerCommand::Stats { json: true })));
    }

    #[test]
    fn test_bad_timestamp_is_rejected() {
        let result = Cli::try_parse_from(["keyledger", "claim", "1", "--joined-at", "soon"]);
        assert!(result.is_err());
    }
}
