//! Operation outcomes.
//!
//! Expected conflicts are reported as values so callers can match on them
//! exhaustively instead of inspecting error strings.

use keyledger_types::{Identity, Key};

/// Result of [`KeyLedger::claim`](crate::KeyLedger::claim).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The head of the pool was bound to the identity.
    Claimed(Key),
    /// The identity already holds a claim; nothing changed.
    AlreadyClaimed {
        /// The key the identity already holds.
        existing: Key,
    },
    /// The pool is empty; nothing changed.
    PoolExhausted,
}

impl ClaimOutcome {
    /// The newly issued key, if this call issued one.
    #[must_use]
    pub fn issued(&self) -> Option<&Key> {
        match self {
            Self::Claimed(key) => Some(key),
            Self::AlreadyClaimed { .. } | Self::PoolExhausted => None,
        }
    }
}

/// Result of [`KeyLedger::assign_key_to_user`](crate::KeyLedger::assign_key_to_user).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    /// The key is now bound to the identity.
    Assigned,
    /// The identity already holds a claim; nothing changed.
    IdentityAlreadyClaimed {
        /// The key the identity already holds.
        existing: Key,
    },
    /// Another identity holds the key; nothing changed.
    KeyHeldByOther {
        /// The current holder.
        holder: Identity,
    },
    /// The key is pooled and `remove_from_pool` was false; nothing changed.
    KeyPooled,
}

impl AssignOutcome {
    /// Whether the key was bound.
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        matches!(self, Self::Assigned)
    }
}

/// Result of [`KeyLedger::remove_key_from_pool`](crate::KeyLedger::remove_key_from_pool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The key was pooled and has been purged.
    FromPool,
    /// The key was claimed; the claim has been purged.
    FromClaim {
        /// The identity that held the key.
        identity: Identity,
    },
    /// The key is neither pooled nor claimed.
    NotFound,
}

impl RemoveOutcome {
    /// Whether anything was removed.
    #[must_use]
    pub fn removed(&self) -> bool {
        !matches!(self, Self::NotFound)
    }
}
