//! KeyLedger: one-time allocation of a finite pool of keys.
//!
//! [`KeyLedger`] owns an ordered pool of unclaimed keys, a one-to-one
//! identity → key claim map, and the eligibility policy. Every mutation is
//! serialized, made durable through [`keyledger_store`], and only then
//! published to readers.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use keyledger::{KeyLedger, NullNotifier};
//! use keyledger_types::{Identity, RepositoryOptions};
//!
//! let options = RepositoryOptions::builder().data_dir("/var/lib/keyledger").build()?;
//! let (ledger, _report) = KeyLedger::open(options, Arc::new(NullNotifier))?;
//!
//! ledger.add_keys(["TRIAL-1", "TRIAL-2"])?;
//! if let Some(key) = ledger.claim(&Identity::from(1234))?.issued() {
//!     println!("your key: {key}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The ledger stores the eligibility policy but never evaluates it; callers
//! read [`KeyLedger::get_config`] and decide before calling
//! [`KeyLedger::claim`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
mod export;
mod ledger;
pub mod notifier;
mod outcome;
mod state;

pub use error::{ErrorCode, LedgerError, Result};
pub use export::CLAIMS_CSV_HEADER;
pub use ledger::{KeyLedger, LedgerStats, OpenReport};
pub use notifier::{AdminNotifier, FileNotifier, NotifyError, NullNotifier, create_notifier};
pub use outcome::{AssignOutcome, ClaimOutcome, RemoveOutcome};
pub use state::Repairs;
