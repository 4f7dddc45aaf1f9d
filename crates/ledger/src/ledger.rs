//! The key pool and claim ledger.
//!
//! # Exclusion and durability
//!
//! All state sits behind one `parking_lot::RwLock`. A mutation:
//!
//! ```text
//! upgradable_read()        ← at most one holder; mutations are serialized
//!   clone committed state
//!   apply change to clone  ← readers still see committed state
//!   save affected documents
//! upgrade() → write        ← waits for in-flight readers
//!   publish clone
//! release, then notify
//! ```
//!
//! If a save fails the clone is discarded, so in-memory state always matches
//! what was last made durable.
//!
//! When both documents change, the one that *adds* a key's presence is saved
//! first. A crash between the two saves leaves a key recorded twice (never
//! zero times), which [`KeyLedger::open`] repairs with claims taking
//! precedence.

use std::{collections::BTreeMap, sync::Arc};

use keyledger_store::{DefaultReason, StateRepository};
use keyledger_types::{
    EligibilityMode, EligibilityPolicy, Identity, Key, LedgerAction, LedgerEvent, PolicyUpdate,
    RemovedFrom, RepositoryOptions,
};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use serde::Serialize;
use snafu::ResultExt;
use tracing::{debug, error, info, warn};

use crate::{
    error::{
        InternalSnafu, InvalidConfigSnafu, InvalidIdentitySnafu, InvalidKeySnafu, LoadSnafu,
        PersistenceSnafu, Result,
    },
    export,
    notifier::AdminNotifier,
    outcome::{AssignOutcome, ClaimOutcome, RemoveOutcome},
    state::{LedgerState, Repairs},
};

const POOL_DOCUMENT: &str = "pool document";
const CLAIMS_DOCUMENT: &str = "claims document";

/// Which documents a mutation must save, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persist {
    Nothing,
    Pool,
    Claims,
    ClaimsThenPool,
    PoolThenClaims,
}

#[derive(Debug, Clone, Copy)]
enum Document {
    Pool,
    Claims,
}

impl Document {
    fn name(self) -> &'static str {
        match self {
            Self::Pool => POOL_DOCUMENT,
            Self::Claims => CLAIMS_DOCUMENT,
        }
    }
}

/// What a staged mutation produced.
struct Staged<T> {
    value: T,
    persist: Persist,
    action: Option<LedgerAction>,
}

impl<T> Staged<T> {
    fn unchanged(value: T) -> Self {
        Self { value, persist: Persist::Nothing, action: None }
    }

    fn changed(value: T, persist: Persist, action: LedgerAction) -> Self {
        Self { value, persist, action: Some(action) }
    }
}

/// How each document was obtained at open, plus any repairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenReport {
    /// Why the pool document was defaulted; `None` if it loaded.
    pub pool: Option<DefaultReason>,
    /// Why the claims document was defaulted; `None` if it loaded.
    pub claims: Option<DefaultReason>,
    /// Cross-document repairs applied during load.
    pub repairs: Repairs,
}

impl OpenReport {
    /// True when no document was damaged and nothing needed repair.
    ///
    /// A missing document (first run) still counts as clean.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        let intact = |reason: &Option<DefaultReason>| {
            matches!(reason, None | Some(DefaultReason::Missing))
        };
        intact(&self.pool) && intact(&self.claims) && !self.repairs.any()
    }
}

/// Point-in-time counts and policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    /// Keys waiting in the pool.
    pub available: usize,
    /// Active claims.
    pub claimed: usize,
    /// Minimum qualifying age in days.
    pub min_days: u32,
    /// Eligibility check mode.
    pub mode: EligibilityMode,
}

/// Authoritative key pool, claim ledger and eligibility policy.
///
/// `KeyLedger` is `Send + Sync`; share it behind an `Arc` and call any
/// operation from any thread.
pub struct KeyLedger {
    state: RwLock<LedgerState>,
    repository: StateRepository,
    notifier: Arc<dyn AdminNotifier>,
}

impl std::fmt::Debug for KeyLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLedger")
            .field("options", self.repository.options())
            .finish_non_exhaustive()
    }
}

impl KeyLedger {
    /// Loads both documents, reconciles them, and returns the ledger with a
    /// report of how each document was obtained.
    ///
    /// Repaired state is written back before returning.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Load`](crate::LedgerError::Load) if a document
    /// is unusable under `CorruptionPolicy::Abort`, and
    /// [`LedgerError::Persistence`](crate::LedgerError::Persistence) if
    /// repaired state cannot be saved.
    pub fn open(
        options: RepositoryOptions,
        notifier: Arc<dyn AdminNotifier>,
    ) -> Result<(Self, OpenReport)> {
        let repository = StateRepository::new(options);

        let (pool, pool_reason) = repository.load_pool().context(LoadSnafu)?.into_parts();
        let (claims, claims_reason) = repository.load_claims().context(LoadSnafu)?.into_parts();

        let (state, repairs) = LedgerState::from_documents(pool, claims);
        if repairs.any() {
            warn!(
                pool_overlaps = repairs.pool_overlaps,
                duplicate_claims = repairs.duplicate_claims,
                "Reconciled inconsistent documents, claims take precedence"
            );
            repository
                .save_claims(&state.claims_document())
                .context(PersistenceSnafu { document: CLAIMS_DOCUMENT })?;
            repository
                .save_pool(&state.pool_document())
                .context(PersistenceSnafu { document: POOL_DOCUMENT })?;
        }
        if let Err(message) = state.check_invariants() {
            return InternalSnafu { message }.fail();
        }

        info!(
            available = state.pool().len(),
            claimed = state.claims().len(),
            min_days = state.config().min_days,
            mode = %state.config().mode,
            "Opened key ledger"
        );

        let report = OpenReport { pool: pool_reason, claims: claims_reason, repairs };
        let ledger = Self { state: RwLock::new(state), repository, notifier };
        Ok((ledger, report))
    }

    // ============================================
    // Reads
    // ============================================

    /// Whether `identity` holds a claim. Surrounding whitespace is ignored,
    /// as in [`claim`](Self::claim); a blank identity holds nothing.
    pub fn has_claimed(&self, identity: &Identity) -> bool {
        self.get_claim(identity).is_some()
    }

    /// The key `identity` holds, if any.
    pub fn get_claim(&self, identity: &Identity) -> Option<Key> {
        let identity = Identity::normalized(identity.as_str())?;
        self.state.read().claim_of(&identity).cloned()
    }

    /// Number of pooled keys.
    pub fn available_count(&self) -> usize {
        self.state.read().pool().len()
    }

    /// Number of active claims.
    pub fn claim_count(&self) -> usize {
        self.state.read().claims().len()
    }

    /// Copy of the pool, head first.
    pub fn list_pool(&self) -> Vec<Key> {
        self.state.read().pool().cloned().collect()
    }

    /// Copy of all claims, ordered by identity.
    pub fn list_claims(&self) -> BTreeMap<Identity, Key> {
        self.state.read().claims().clone()
    }

    /// The current eligibility policy.
    pub fn get_config(&self) -> EligibilityPolicy {
        self.state.read().config()
    }

    /// Counts and policy from one consistent snapshot.
    pub fn stats(&self) -> LedgerStats {
        let state = self.state.read();
        let config = state.config();
        LedgerStats {
            available: state.pool().len(),
            claimed: state.claims().len(),
            min_days: config.min_days,
            mode: config.mode,
        }
    }

    /// The pool as newline-separated keys, head first.
    pub fn export_pool(&self) -> String {
        export::pool_text(self.state.read().pool())
    }

    /// All claims as `user_id,key` CSV, ordered by identity.
    pub fn export_claims_csv(&self) -> String {
        export::claims_csv(self.state.read().claims())
    }

    /// Verifies the committed state's structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`](crate::LedgerError::Internal)
    /// describing the first violation found.
    pub fn check_invariants(&self) -> Result<()> {
        match self.state.read().check_invariants() {
            Ok(()) => Ok(()),
            Err(message) => InternalSnafu { message }.fail(),
        }
    }

    // ============================================
    // Mutations
    // ============================================

    /// Appends new keys to the pool tail.
    ///
    /// Candidates are trimmed; blanks, keys already pooled or claimed, and
    /// repeats within the batch are skipped. Returns how many were added.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`](crate::LedgerError::Persistence)
    /// if the pool cannot be saved; nothing is added in that case.
    pub fn add_keys<I, S>(&self, candidates: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = self.mutate(|state| {
            let added = state.add_keys(candidates);
            Ok(if added == 0 {
                Staged::unchanged(0)
            } else {
                Staged::changed(added, Persist::Pool, LedgerAction::KeysAdded { count: added })
            })
        })?;

        if added > 0 {
            info!(added, "Added keys to pool");
        } else {
            debug!("No new keys to add");
        }
        Ok(added)
    }

    /// Binds the head of the pool to `identity`.
    ///
    /// Idempotent: an identity that already holds a claim gets
    /// [`ClaimOutcome::AlreadyClaimed`] and no key leaves the pool.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidIdentity`](crate::LedgerError::InvalidIdentity)
    /// for a blank identity, or
    /// [`LedgerError::Persistence`](crate::LedgerError::Persistence) if the
    /// claim cannot be saved.
    pub fn claim(&self, identity: &Identity) -> Result<ClaimOutcome> {
        let identity = normalize_identity(identity)?;
        let outcome = self.mutate(|state| {
            Ok(match state.claim(&identity) {
                ClaimOutcome::Claimed(key) => Staged::changed(
                    ClaimOutcome::Claimed(key),
                    Persist::ClaimsThenPool,
                    LedgerAction::KeyClaimed { identity: identity.clone() },
                ),
                other => Staged::unchanged(other),
            })
        })?;

        match &outcome {
            ClaimOutcome::Claimed(_) => info!(%identity, "Key claimed"),
            ClaimOutcome::AlreadyClaimed { .. } => debug!(%identity, "Identity already holds a key"),
            ClaimOutcome::PoolExhausted => info!(%identity, "Claim refused, pool is empty"),
        }
        Ok(outcome)
    }

    /// Removes `identity`'s claim and returns the revoked key.
    ///
    /// With `return_to_pool` the key goes to the pool *head* so it is handed
    /// out next; otherwise it is purged.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidIdentity`](crate::LedgerError::InvalidIdentity)
    /// for a blank identity, or
    /// [`LedgerError::Persistence`](crate::LedgerError::Persistence) if the
    /// change cannot be saved; the claim is kept in that case.
    pub fn revoke_claim(&self, identity: &Identity, return_to_pool: bool) -> Result<Option<Key>> {
        let identity = normalize_identity(identity)?;
        // A purged key touches only the claims document.
        let persist = if return_to_pool { Persist::PoolThenClaims } else { Persist::Claims };

        let revoked = self.mutate(|state| {
            Ok(match state.revoke(&identity, return_to_pool) {
                Some(key) => Staged::changed(
                    Some(key.clone()),
                    persist,
                    LedgerAction::ClaimRevoked {
                        identity: identity.clone(),
                        key,
                        returned_to_pool: return_to_pool,
                    },
                ),
                None => Staged::unchanged(None),
            })
        })?;

        if revoked.is_some() {
            info!(%identity, return_to_pool, "Claim revoked");
        } else {
            debug!(%identity, "No claim to revoke");
        }
        Ok(revoked)
    }

    /// Binds `key` to `identity` directly.
    ///
    /// The uniqueness checks and the binding happen in one exclusion window,
    /// so two racing assigns of the same key cannot both succeed. With
    /// `remove_from_pool` a pooled key is taken out of the pool; without it a
    /// pooled key is refused with [`AssignOutcome::KeyPooled`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidKey`](crate::LedgerError::InvalidKey) or
    /// [`LedgerError::InvalidIdentity`](crate::LedgerError::InvalidIdentity)
    /// for blank arguments, or
    /// [`LedgerError::Persistence`](crate::LedgerError::Persistence) if the
    /// assignment cannot be saved.
    pub fn assign_key_to_user(
        &self,
        identity: &Identity,
        key: Key,
        remove_from_pool: bool,
    ) -> Result<AssignOutcome> {
        let identity = normalize_identity(identity)?;
        let Some(key) = Key::normalized(key.as_str()) else {
            return InvalidKeySnafu { message: "key must not be empty" }.fail();
        };

        let outcome = self.mutate(|state| {
            Ok(match state.assign(&identity, key.clone(), remove_from_pool) {
                AssignOutcome::Assigned => Staged::changed(
                    AssignOutcome::Assigned,
                    Persist::ClaimsThenPool,
                    LedgerAction::KeyAssigned { identity: identity.clone(), key: key.clone() },
                ),
                other => Staged::unchanged(other),
            })
        })?;

        match &outcome {
            AssignOutcome::Assigned => info!(%identity, remove_from_pool, "Key assigned"),
            other => debug!(%identity, outcome = ?other, "Assignment refused"),
        }
        Ok(outcome)
    }

    /// Purges `key` wherever it is held.
    ///
    /// A pooled key is dropped from the pool. Otherwise, if a claim holds it,
    /// the claim is deleted and the key is *not* returned to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`](crate::LedgerError::Persistence)
    /// if the change cannot be saved.
    pub fn remove_key_from_pool(&self, key: &Key) -> Result<RemoveOutcome> {
        let Some(key) = Key::normalized(key.as_str()) else {
            return Ok(RemoveOutcome::NotFound);
        };

        let outcome = self.mutate(|state| {
            Ok(match state.remove(&key) {
                RemoveOutcome::FromPool => Staged::changed(
                    RemoveOutcome::FromPool,
                    Persist::Pool,
                    LedgerAction::KeyRemoved { key: key.clone(), from: RemovedFrom::Pool },
                ),
                RemoveOutcome::FromClaim { identity } => Staged::changed(
                    RemoveOutcome::FromClaim { identity: identity.clone() },
                    Persist::Claims,
                    LedgerAction::KeyRemoved {
                        key: key.clone(),
                        from: RemovedFrom::Claim { identity },
                    },
                ),
                RemoveOutcome::NotFound => Staged::unchanged(RemoveOutcome::NotFound),
            })
        })?;

        match &outcome {
            RemoveOutcome::FromPool => info!("Key removed from pool"),
            RemoveOutcome::FromClaim { identity } => info!(%identity, "Claimed key purged"),
            RemoveOutcome::NotFound => debug!("Key to remove not found"),
        }
        Ok(outcome)
    }

    /// Applies the provided policy fields and returns the resulting policy.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidConfig`](crate::LedgerError::InvalidConfig)
    /// if a value is out of range (state unchanged), or
    /// [`LedgerError::Persistence`](crate::LedgerError::Persistence) if the
    /// pool document cannot be saved.
    pub fn set_config(&self, update: PolicyUpdate) -> Result<EligibilityPolicy> {
        let policy = self.mutate(|state| {
            let current = state.config();
            let next = current.apply(&update).context(InvalidConfigSnafu)?;
            if next == current {
                return Ok(Staged::unchanged(current));
            }
            state.set_config(next);
            Ok(Staged::changed(
                next,
                Persist::Pool,
                LedgerAction::ConfigChanged { min_days: next.min_days, mode: next.mode },
            ))
        })?;

        info!(min_days = policy.min_days, mode = %policy.mode, "Eligibility policy set");
        Ok(policy)
    }

    /// Rewrites both documents from the committed state.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`](crate::LedgerError::Persistence)
    /// if either document cannot be saved.
    pub fn flush(&self) -> Result<()> {
        let state = self.state.upgradable_read();
        self.save(Document::Claims, &state)?;
        self.save(Document::Pool, &state)?;
        debug!("Flushed ledger state");
        Ok(())
    }

    // ============================================
    // Internals
    // ============================================

    /// Runs one mutation under the exclusion described in the module docs.
    fn mutate<T>(&self, apply: impl FnOnce(&mut LedgerState) -> Result<Staged<T>>) -> Result<T> {
        let committed = self.state.upgradable_read();
        let mut staged = committed.clone();
        let Staged { value, persist, action } = apply(&mut staged)?;

        if persist == Persist::Nothing {
            return Ok(value);
        }
        self.persist(persist, &committed, &staged)?;

        let mut write = RwLockUpgradableReadGuard::upgrade(committed);
        *write = staged;
        drop(write);

        if let Some(action) = action {
            self.notify(action);
        }
        Ok(value)
    }

    fn persist(&self, plan: Persist, committed: &LedgerState, staged: &LedgerState) -> Result<()> {
        match plan {
            Persist::Nothing => Ok(()),
            Persist::Pool => self.save(Document::Pool, staged),
            Persist::Claims => self.save(Document::Claims, staged),
            Persist::ClaimsThenPool => {
                self.save_pair(Document::Claims, Document::Pool, committed, staged)
            },
            Persist::PoolThenClaims => {
                self.save_pair(Document::Pool, Document::Claims, committed, staged)
            },
        }
    }

    /// Saves `first` then `second` from `staged`. If `second` fails, `first`
    /// is rewritten from `committed` so the disk matches memory again.
    fn save_pair(
        &self,
        first: Document,
        second: Document,
        committed: &LedgerState,
        staged: &LedgerState,
    ) -> Result<()> {
        self.save(first, staged)?;
        let Err(err) = self.save(second, staged) else {
            return Ok(());
        };

        if let Err(rollback) = self.save(first, committed) {
            error!(
                document = first.name(),
                error = %rollback,
                "Failed to roll back document after partial save, reconciliation will repair it on next open"
            );
        }
        Err(err)
    }

    fn save(&self, document: Document, state: &LedgerState) -> Result<()> {
        let result = match document {
            Document::Pool => self.repository.save_pool(&state.pool_document()),
            Document::Claims => self.repository.save_claims(&state.claims_document()),
        };
        if let Err(e) = &result {
            error!(document = document.name(), error = %e, "Failed to persist document");
        }
        result.context(PersistenceSnafu { document: document.name() })
    }

    fn notify(&self, action: LedgerAction) {
        let event = LedgerEvent::now(action);
        if let Err(e) = self.notifier.notify(&event) {
            warn!(error = %e, event = %event.summary(), "Admin notification failed");
        }
    }
}

fn normalize_identity(identity: &Identity) -> Result<Identity> {
    match Identity::normalized(identity.as_str()) {
        Some(identity) => Ok(identity),
        None => InvalidIdentitySnafu { message: "identity must not be empty" }.fail(),
    }
}
