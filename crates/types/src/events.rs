//! Admin notification event types.
//!
//! Every committed ledger mutation produces one [`LedgerEvent`] describing
//! what changed. Events are handed to an optional notifier after the
//! mutation is durable; they are informational and never part of the
//! ledger's own state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::EligibilityMode,
    types::{Identity, Key},
};

/// Where a removed key was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovedFrom {
    /// The key was pooled.
    Pool,
    /// The key was bound to a claim, which was purged.
    Claim {
        /// Identity that held the key.
        identity: Identity,
    },
}

/// Ledger mutation categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    /// New keys were appended to the pool.
    KeysAdded {
        /// Number of genuinely new keys.
        count: usize,
    },
    /// An identity claimed the head key of the pool.
    KeyClaimed {
        /// Claiming identity.
        identity: Identity,
    },
    /// An identity's claim was revoked.
    ClaimRevoked {
        /// Identity whose claim was removed.
        identity: Identity,
        /// The revoked key.
        key: Key,
        /// Whether the key re-entered the pool head.
        returned_to_pool: bool,
    },
    /// A key was bound directly to an identity by an administrator.
    KeyAssigned {
        /// Receiving identity.
        identity: Identity,
        /// The assigned key.
        key: Key,
    },
    /// A key was purged from the system.
    KeyRemoved {
        /// The purged key.
        key: Key,
        /// Where the key was held.
        from: RemovedFrom,
    },
    /// The eligibility policy changed.
    ConfigChanged {
        /// Minimum qualifying age in days after the change.
        min_days: u32,
        /// Check mode after the change.
        mode: EligibilityMode,
    },
}

/// A committed ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// When the mutation was committed.
    pub timestamp: DateTime<Utc>,
    /// What changed.
    pub action: LedgerAction,
}

impl LedgerEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn now(action: LedgerAction) -> Self {
        Self { timestamp: Utc::now(), action }
    }

    /// Short human-readable summary for admin log channels.
    ///
    /// Claimed keys are not included in [`LedgerAction::KeyClaimed`]
    /// summaries; the claimant is the only party that should see them.
    #[must_use]
    pub fn summary(&self) -> String {
        match &self.action {
            LedgerAction::KeysAdded { count } => format!("added {count} key(s)"),
            LedgerAction::KeyClaimed { identity } => format!("user {identity} claimed a key"),
            LedgerAction::ClaimRevoked { identity, key, returned_to_pool } => format!(
                "revoked {identity}'s claim, key `{key}` returned_to_pool={returned_to_pool}"
            ),
            LedgerAction::KeyAssigned { identity, key } => {
                format!("assigned key `{key}` to {identity}")
            },
            LedgerAction::KeyRemoved { key, from: RemovedFrom::Pool } => {
                format!("removed key `{key}` from pool")
            },
            LedgerAction::KeyRemoved { key, from: RemovedFrom::Claim { identity } } => {
                format!("removed key `{key}` from {identity}'s claim")
            },
            LedgerAction::ConfigChanged { min_days, mode } => {
                format!("set min_days={min_days} mode={mode}")
            },
        }
    }
}
