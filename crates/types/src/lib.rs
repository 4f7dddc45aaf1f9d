//! Core types for KeyLedger.
//!
//! This crate provides the foundational types shared by the repository,
//! the ledger and its callers:
//! - Token newtypes ([`Key`], [`Identity`])
//! - Eligibility policy and repository configuration
//! - Admin notification events

#![deny(unsafe_code)]

pub mod config;
pub mod events;
pub mod types;

pub use config::{
    ConfigError, CorruptionPolicy, EligibilityMode, EligibilityPolicy, PolicyUpdate,
    RepositoryOptions,
};
pub use events::{LedgerAction, LedgerEvent, RemovedFrom};
pub use types::{Identity, Key};
