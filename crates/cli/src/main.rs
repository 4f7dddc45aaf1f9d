//! `keyledger`: operate a trial key ledger from the command line.
//!
//! Each invocation locks the data directory, loads both documents, runs one
//! operation, flushes and exits. Data goes to stdout; logs go to stderr.
//!
//! Exit status: `0` on success, `2` when a valid request was refused
//! (ineligible, pool exhausted, conflict), `1` on error.

use std::{
    io::{self, IsTerminal, Write},
    process::ExitCode,
};

use chrono::Utc;
use clap::Parser;
use keyledger::{KeyLedger, create_notifier};
use keyledger_store::DataDirLock;
use keyledger_types::RepositoryOptions;
use snafu::ResultExt;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod config;
mod eligibility;
mod error;

use crate::{
    commands::Output,
    config::{Cli, Command, LogFormat},
    error::{LedgerSnafu, LockSnafu, NotifierSnafu, OptionsSnafu, Result},
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match run(cli) {
        Ok(output) => {
            let mut stdout = io::stdout().lock();
            if stdout.write_all(output.text.as_bytes()).and_then(|()| stdout.flush()).is_err() {
                return ExitCode::FAILURE;
            }
            if output.refused { ExitCode::from(2) } else { ExitCode::SUCCESS }
        },
        Err(e) => {
            eprintln!("error: {e}");
            if let Some(hint) = e.hint() {
                eprintln!("hint: {hint}");
            }
            ExitCode::FAILURE
        },
    }
}

fn run(cli: Cli) -> Result<Output> {
    let command = match cli.command {
        // Needs no state, so no lock either.
        Command::Schema => return Ok(commands::schema()),
        Command::Ledger(command) => command,
    };

    let options = RepositoryOptions::builder()
        .data_dir(cli.data_dir)
        .corruption_policy(cli.on_corrupt.into())
        .build()
        .context(OptionsSnafu)?;

    let lock = DataDirLock::acquire(options.data_dir()).context(LockSnafu)?;
    let notifier = create_notifier(cli.notify_log).context(NotifierSnafu)?;
    let (ledger, report) = KeyLedger::open(options, notifier).context(LedgerSnafu)?;

    if !report.is_clean() {
        warn!(
            pool = ?report.pool.as_ref().map(ToString::to_string),
            claims = ?report.claims.as_ref().map(ToString::to_string),
            pool_overlaps = report.repairs.pool_overlaps,
            duplicate_claims = report.repairs.duplicate_claims,
            "Ledger opened with recovered state"
        );
    }

    let output = commands::execute(&ledger, command, Utc::now())?;
    ledger.flush().context(LedgerSnafu)?;
    drop(ledger);
    drop(lock);
    info!(refused = output.refused, "Done");
    Ok(output)
}

/// Installs the global subscriber. Logs always go to stderr so stdout stays
/// machine-readable.
fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = match format {
        LogFormat::Json => true,
        LogFormat::Text => false,
        LogFormat::Auto => !io::stderr().is_terminal(),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(io::stderr))
            .init();
    }
}
