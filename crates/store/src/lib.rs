//! keyledger-store: durable state repository for KeyLedger.
//!
//! The ledger's state lives in two independent JSON documents inside one data
//! directory:
//!
//! ```text
//! <data_dir>/
//! ├── .lock          exclusive process lock (DataDirLock)
//! ├── keys.json      pool + eligibility config (PoolDocument)
//! └── claims.json    identity → key (ClaimsDocument)
//! ```
//!
//! Every save is an atomic replace (temp file in the same directory, fsync,
//! rename, fsync of the directory), so a crash leaves each document either
//! fully old or fully new. The two documents are *not* written atomically
//! together; ordering and load-time reconciliation across them is the
//! ledger's job.
//!
//! ## Quick Start
//!
//! ```no_run
//! use keyledger_store::StateRepository;
//! use keyledger_types::RepositoryOptions;
//!
//! let options = RepositoryOptions::builder().data_dir("/var/lib/keyledger").build()?;
//! let repository = StateRepository::new(options);
//!
//! let pool = repository.load_pool()?.into_value();
//! repository.save_pool(&pool)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod atomic;
pub mod documents;
pub mod error;
pub mod file_lock;
pub mod repository;

pub use atomic::{atomic_write, atomic_write_json};
pub use documents::{ClaimsDocument, PoolDocument, pool_document_schema};
pub use error::{Result, StoreError};
pub use file_lock::DataDirLock;
pub use repository::{DefaultReason, LoadOutcome, StateRepository};
