//! Subcommand execution.
//!
//! Every command runs against an opened [`KeyLedger`] and produces an
//! [`Output`]: the text for stdout and whether the request was refused.
//! Refusals (ineligible, pool exhausted, conflicts) are normal outcomes, not
//! errors.

use std::{fs, path::Path};

use chrono::{DateTime, Utc};
use keyledger::{AssignOutcome, ClaimOutcome, KeyLedger, RemoveOutcome};
use keyledger_types::{EligibilityMode, EligibilityPolicy, Identity, Key, PolicyUpdate};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    config::{ConfigAction, LedgerCommand},
    eligibility::{self, Eligibility},
    error::{ConfigSnafu, LedgerSnafu, OutputSnafu, ReadKeysSnafu, Result},
};

/// What a command printed and whether it was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// Text for stdout; printed verbatim.
    pub text: String,
    /// The request was valid but not granted.
    pub refused: bool,
}

impl Output {
    fn ok(text: impl Into<String>) -> Self {
        Self { text: line(text.into()), refused: false }
    }

    fn refused(text: impl Into<String>) -> Self {
        Self { text: line(text.into()), refused: true }
    }

    /// Exports are printed byte-for-byte.
    fn raw(text: String) -> Self {
        Self { text, refused: false }
    }
}

fn line(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Runs `command` against `ledger`. `now` anchors eligibility checks.
///
/// # Errors
///
/// Returns an error if the ledger rejects the arguments, a change cannot be
/// persisted, or a key file cannot be read.
pub fn execute(ledger: &KeyLedger, command: LedgerCommand, now: DateTime<Utc>) -> Result<Output> {
    match command {
        LedgerCommand::AddKeys { keys, file } => add_keys(ledger, &keys, file.as_deref()),
        LedgerCommand::ListKeys => Ok(list_keys(ledger)),
        LedgerCommand::ListClaims => Ok(list_claims(ledger)),
        LedgerCommand::Claim { identity, account_created, joined_at } => {
            claim(ledger, &identity_arg(&identity), account_created, joined_at, now)
        },
        LedgerCommand::MyKey { identity } => Ok(match ledger.get_claim(&identity_arg(&identity)) {
            Some(key) => Output::ok(format!("Your key: {key}")),
            None => Output::refused("You have not claimed a key."),
        }),
        LedgerCommand::Revoke { identity, purge } => revoke(ledger, &identity_arg(&identity), !purge),
        LedgerCommand::Assign { identity, key, keep_in_pool } => {
            assign(ledger, &identity_arg(&identity), Key::new(key), !keep_in_pool)
        },
        LedgerCommand::RemoveKey { key } => remove_key(ledger, &Key::new(key)),
        LedgerCommand::ExportKeys => Ok(Output::raw(ledger.export_pool())),
        LedgerCommand::ExportClaims => Ok(Output::raw(ledger.export_claims_csv())),
        LedgerCommand::Config { action: ConfigAction::Show } => Ok(Output::ok(describe(&ledger.get_config()))),
        LedgerCommand::Config { action: ConfigAction::Set { min_days, mode } } => {
            let update = PolicyUpdate::parse(min_days, mode.as_deref()).context(ConfigSnafu)?;
            let policy = ledger.set_config(update).context(LedgerSnafu)?;
            Ok(Output::ok(describe(&policy)))
        },
        LedgerCommand::Stats { json } => {
            let stats = ledger.stats();
            if json {
                return serde_json::to_string(&stats).context(OutputSnafu).map(Output::ok);
            }
            Ok(Output::ok(format!(
                "Available: {}\nClaimed: {}\nMinimum days: {}\nMode: {}",
                stats.available, stats.claimed, stats.min_days, stats.mode
            )))
        },
    }
}

/// Identities arrive as typed on the command line; messages echo them trimmed.
fn identity_arg(raw: &str) -> Identity {
    Identity::new(raw.trim())
}

/// The pool document's JSON Schema. Needs no ledger.
pub fn schema() -> Output {
    Output::ok(keyledger_store::pool_document_schema())
}

/// Splits raw input on newlines and commas.
pub fn split_keys(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines().flat_map(|line| line.split(','))
}

fn add_keys(ledger: &KeyLedger, args: &[String], file: Option<&Path>) -> Result<Output> {
    let from_file = match file {
        Some(path) => fs::read_to_string(path)
            .context(ReadKeysSnafu { path: path.display().to_string() })?,
        None => String::new(),
    };

    let candidates = args.iter().map(String::as_str).chain(std::iter::once(from_file.as_str()));
    let added = ledger.add_keys(candidates.flat_map(split_keys)).context(LedgerSnafu)?;
    Ok(Output::ok(format!("Added {added} new key(s). Pool size: {}", ledger.available_count())))
}

fn list_keys(ledger: &KeyLedger) -> Output {
    let pool = ledger.list_pool();
    if pool.is_empty() {
        return Output::ok("No keys in pool.");
    }
    let mut text = format!("Available keys ({}):", pool.len());
    for (i, key) in pool.iter().enumerate() {
        text.push_str(&format!("\n{}. {key}", i + 1));
    }
    Output::ok(text)
}

fn list_claims(ledger: &KeyLedger) -> Output {
    let claims = ledger.list_claims();
    if claims.is_empty() {
        return Output::ok("No claims yet.");
    }
    let mut text = format!("Claims ({}):", claims.len());
    for (i, (identity, key)) in claims.iter().enumerate() {
        text.push_str(&format!("\n{}. {identity} -> {key}", i + 1));
    }
    Output::ok(text)
}

fn claim(
    ledger: &KeyLedger,
    identity: &Identity,
    account_created: Option<DateTime<Utc>>,
    joined_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Output> {
    let policy = ledger.get_config();
    let reference = match policy.mode {
        EligibilityMode::Account => account_created,
        EligibilityMode::Guild => joined_at,
    };
    if let Eligibility::Ineligible(reason) = eligibility::check(&policy, reference, now) {
        debug!(%identity, %reason, "Claim refused by eligibility policy");
        return Ok(Output::refused(reason.to_string()));
    }

    Ok(match ledger.claim(identity).context(LedgerSnafu)? {
        ClaimOutcome::Claimed(key) => Output::ok(format!("Here is your trial key:\n{key}")),
        ClaimOutcome::AlreadyClaimed { existing } => {
            Output::refused(format!("You already claimed a key. Your key: {existing}"))
        },
        ClaimOutcome::PoolExhausted => Output::refused("No trial keys available."),
    })
}

fn revoke(ledger: &KeyLedger, identity: &Identity, return_to_pool: bool) -> Result<Output> {
    Ok(match ledger.revoke_claim(identity, return_to_pool).context(LedgerSnafu)? {
        Some(key) => Output::ok(format!(
            "Revoked claim from {identity}. Key: {key}. Returned to pool: {return_to_pool}"
        )),
        None => Output::refused("That user has no claim."),
    })
}

fn assign(
    ledger: &KeyLedger,
    identity: &Identity,
    key: Key,
    remove_from_pool: bool,
) -> Result<Output> {
    let shown = key.clone();
    Ok(match ledger.assign_key_to_user(identity, key, remove_from_pool).context(LedgerSnafu)? {
        AssignOutcome::Assigned => Output::ok(format!("Assigned key {shown} to {identity}.")),
        AssignOutcome::IdentityAlreadyClaimed { existing } => Output::refused(format!(
            "Unable to assign. {identity} already holds key {existing}."
        )),
        AssignOutcome::KeyHeldByOther { holder } => Output::refused(format!(
            "That key is already claimed by {holder}. Revoke first or choose another key."
        )),
        AssignOutcome::KeyPooled => Output::refused(
            "That key is in the pool. Run without --keep-in-pool to take it from the pool.",
        ),
    })
}

fn remove_key(ledger: &KeyLedger, key: &Key) -> Result<Output> {
    Ok(match ledger.remove_key_from_pool(key).context(LedgerSnafu)? {
        RemoveOutcome::FromPool => Output::ok(format!("Removed key {key} from the pool.")),
        RemoveOutcome::FromClaim { identity } => {
            Output::ok(format!("Removed key {key} from the claim of {identity}."))
        },
        RemoveOutcome::NotFound => Output::refused("Key not found in pool or claims."),
    })
}

fn describe(policy: &EligibilityPolicy) -> String {
    format!("Minimum days: {}\nMode: {}", policy.min_days, policy.mode)
}
