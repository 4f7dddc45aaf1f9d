//! In-memory ledger state and its pure transitions.
//!
//! Nothing here touches the filesystem or takes a lock. [`KeyLedger`]
//! stages each mutation on a clone of [`LedgerState`], persists the clone,
//! and only then publishes it.
//!
//! [`KeyLedger`]: crate::KeyLedger

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use keyledger_store::{ClaimsDocument, PoolDocument};
use keyledger_types::{EligibilityPolicy, Identity, Key};

use crate::outcome::{AssignOutcome, ClaimOutcome, RemoveOutcome};

/// Repairs applied while rebuilding state from two documents that disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Repairs {
    /// Keys dropped from the pool because a claim holds them.
    pub pool_overlaps: usize,
    /// Claims dropped because a lexicographically smaller identity holds the
    /// same key.
    pub duplicate_claims: usize,
}

impl Repairs {
    /// Whether anything was repaired.
    #[must_use]
    pub fn any(&self) -> bool {
        self.pool_overlaps > 0 || self.duplicate_claims > 0
    }
}

/// Pool, claims and policy, with reverse indexes for O(1) membership checks.
#[derive(Debug, Clone, Default)]
pub(crate) struct LedgerState {
    pool: VecDeque<Key>,
    pooled: HashSet<Key>,
    claims: BTreeMap<Identity, Key>,
    holders: HashMap<Key, Identity>,
    config: EligibilityPolicy,
}

impl LedgerState {
    /// Rebuilds state from persisted documents.
    ///
    /// Claims are authoritative: a key that is both pooled and claimed stays
    /// claimed. A key claimed by several identities stays with the smallest
    /// identity, which is the first one seen since the claims map is ordered.
    pub(crate) fn from_documents(pool: PoolDocument, claims: ClaimsDocument) -> (Self, Repairs) {
        let mut state = Self { config: pool.config, ..Self::default() };
        let mut repairs = Repairs::default();

        for (identity, key) in claims.claims {
            if state.holders.contains_key(&key) {
                repairs.duplicate_claims += 1;
                continue;
            }
            state.holders.insert(key.clone(), identity.clone());
            state.claims.insert(identity, key);
        }

        for key in pool.pool {
            if state.holders.contains_key(&key) {
                repairs.pool_overlaps += 1;
            } else if state.pooled.insert(key.clone()) {
                state.pool.push_back(key);
            }
        }

        (state, repairs)
    }

    pub(crate) fn pool_document(&self) -> PoolDocument {
        PoolDocument { pool: self.pool.iter().cloned().collect(), config: self.config }
    }

    pub(crate) fn claims_document(&self) -> ClaimsDocument {
        ClaimsDocument { claims: self.claims.clone() }
    }

    // ============================================
    // Reads
    // ============================================

    pub(crate) fn pool(&self) -> impl ExactSizeIterator<Item = &Key> {
        self.pool.iter()
    }

    pub(crate) fn claims(&self) -> &BTreeMap<Identity, Key> {
        &self.claims
    }

    pub(crate) fn claim_of(&self, identity: &Identity) -> Option<&Key> {
        self.claims.get(identity)
    }

    pub(crate) fn config(&self) -> EligibilityPolicy {
        self.config
    }

    // ============================================
    // Transitions
    // ============================================

    /// Appends genuinely new keys at the tail. Returns how many were added.
    pub(crate) fn add_keys<I, S>(&mut self, candidates: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for candidate in candidates {
            let Some(key) = Key::normalized(candidate.as_ref()) else {
                continue;
            };
            if self.holders.contains_key(&key) || !self.pooled.insert(key.clone()) {
                continue;
            }
            self.pool.push_back(key);
            added += 1;
        }
        added
    }

    /// Binds the head of the pool to `identity`.
    pub(crate) fn claim(&mut self, identity: &Identity) -> ClaimOutcome {
        if let Some(existing) = self.claims.get(identity) {
            return ClaimOutcome::AlreadyClaimed { existing: existing.clone() };
        }
        let Some(key) = self.pool.pop_front() else {
            return ClaimOutcome::PoolExhausted;
        };
        self.pooled.remove(&key);
        self.bind(identity.clone(), key.clone());
        ClaimOutcome::Claimed(key)
    }

    /// Removes `identity`'s claim, optionally returning the key to the pool head.
    pub(crate) fn revoke(&mut self, identity: &Identity, return_to_pool: bool) -> Option<Key> {
        let key = self.claims.remove(identity)?;
        self.holders.remove(&key);
        if return_to_pool && self.pooled.insert(key.clone()) {
            self.pool.push_front(key.clone());
        }
        Some(key)
    }

    /// Binds `key` to `identity` directly.
    pub(crate) fn assign(
        &mut self,
        identity: &Identity,
        key: Key,
        remove_from_pool: bool,
    ) -> AssignOutcome {
        if let Some(existing) = self.claims.get(identity) {
            return AssignOutcome::IdentityAlreadyClaimed { existing: existing.clone() };
        }
        if let Some(holder) = self.holders.get(&key) {
            return AssignOutcome::KeyHeldByOther { holder: holder.clone() };
        }
        if self.pooled.contains(&key) {
            if !remove_from_pool {
                return AssignOutcome::KeyPooled;
            }
            self.remove_pooled(&key);
        }
        self.bind(identity.clone(), key);
        AssignOutcome::Assigned
    }

    /// Purges `key` from the pool, or failing that, purges the claim holding it.
    pub(crate) fn remove(&mut self, key: &Key) -> RemoveOutcome {
        if self.remove_pooled(key) {
            return RemoveOutcome::FromPool;
        }
        match self.holders.remove(key) {
            Some(identity) => {
                self.claims.remove(&identity);
                RemoveOutcome::FromClaim { identity }
            },
            None => RemoveOutcome::NotFound,
        }
    }

    pub(crate) fn set_config(&mut self, config: EligibilityPolicy) {
        self.config = config;
    }

    fn bind(&mut self, identity: Identity, key: Key) {
        self.holders.insert(key.clone(), identity.clone());
        self.claims.insert(identity, key);
    }

    fn remove_pooled(&mut self, key: &Key) -> bool {
        if !self.pooled.remove(key) {
            return false;
        }
        self.pool.retain(|k| k != key);
        true
    }

    // ============================================
    // Invariants
    // ============================================

    /// Verifies pool uniqueness, pool/claim disjointness, claim injectivity
    /// and that both indexes agree with the data they mirror.
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        let mut seen = HashSet::with_capacity(self.pool.len());
        for key in &self.pool {
            if key.as_str().is_empty() {
                return Err("pool contains an empty key".to_string());
            }
            if !seen.insert(key) {
                return Err(format!("key `{key}` appears twice in the pool"));
            }
            if self.holders.contains_key(key) {
                return Err(format!("key `{key}` is both pooled and claimed"));
            }
        }
        if seen.len() != self.pooled.len() || !self.pooled.iter().all(|k| seen.contains(k)) {
            return Err("pool index does not match the pool".to_string());
        }

        if self.holders.len() != self.claims.len() {
            return Err(format!(
                "{} claims map onto {} distinct keys",
                self.claims.len(),
                self.holders.len()
            ));
        }
        for (identity, key) in &self.claims {
            if self.holders.get(key) != Some(identity) {
                return Err(format!("claim index disagrees for identity {identity}"));
            }
        }
        Ok(())
    }
}
