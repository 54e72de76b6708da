// ledger.rs - The consent ledger.
//
// Tracks, per subject, which consent-required sub-capabilities have been
// explicitly authorized. This is the only mutable shared state in the
// gateway.
//
// Ordering rules:
// - Writes for a pair are serialized by `writes`, so grant/revoke/is_granted
//   are linearizable per (subject, sub-capability).
// - Conflicts resolve last-writer-wins on the caller-supplied timestamp,
//   never on arrival order. A write older than the stored state is a no-op
//   reported as `Superseded`. Equal timestamps go to the incoming write.
// - Every grant/revoke call is sent to the audit sink after the store write
//   succeeds, tagged with its outcome. A failed write emits no event; a
//   failed audit rolls the write back and fails the call.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tg_audit::{AuditSink, ConsentAction, ConsentEvent};
use tg_ontology::CapabilitiesOntology;

use crate::error::{LedgerError, StoreError};
use crate::store::{ConsentRecord, ConsentState, ConsentStore, MemoryConsentStore};

/// An active grant, as reported by [`ConsentLedger::grants_for`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConsentGrant {
    pub subject_id: String,
    pub sub_capability_key: String,
    pub granted_at: DateTime<Utc>,
}

/// What a `grant` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// A new grant now exists.
    Granted,
    /// A grant already existed; its timestamp was updated.
    Refreshed,
    /// The sub-capability does not require consent; nothing stored.
    NotRequired,
    /// The stored state is newer than this call; nothing changed.
    Superseded,
}

impl GrantOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantOutcome::Granted => "granted",
            GrantOutcome::Refreshed => "refreshed",
            GrantOutcome::NotRequired => "not_required",
            GrantOutcome::Superseded => "superseded",
        }
    }
}

/// What a `revoke` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// An active grant was withdrawn.
    Revoked,
    /// There was no active grant; a tombstone was recorded anyway.
    NotGranted,
    /// The stored state is newer than this call; nothing changed.
    Superseded,
}

impl RevokeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevokeOutcome::Revoked => "revoked",
            RevokeOutcome::NotGranted => "not_granted",
            RevokeOutcome::Superseded => "superseded",
        }
    }
}

/// Per-subject consent state over one loaded ontology.
pub struct ConsentLedger {
    ontology: Arc<CapabilitiesOntology>,
    store: Box<dyn ConsentStore>,
    audit: Option<Arc<dyn AuditSink>>,
    grant_ttl: Option<Duration>,
    writes: Mutex<()>,
}

impl ConsentLedger {
    /// Build a ledger over `store`.
    ///
    /// Records left over from an earlier ontology whose sub-capability no
    /// longer exists, or no longer requires consent, are pruned.
    pub fn new(
        ontology: Arc<CapabilitiesOntology>,
        store: impl ConsentStore + 'static,
    ) -> Result<Self, LedgerError> {
        let ledger = Self {
            ontology,
            store: Box::new(store),
            audit: None,
            grant_ttl: None,
            writes: Mutex::new(()),
        };
        ledger.prune_stale()?;
        Ok(ledger)
    }

    /// A session-lifetime ledger.
    pub fn in_memory(ontology: Arc<CapabilitiesOntology>) -> Self {
        Self {
            ontology,
            store: Box::new(MemoryConsentStore::new()),
            audit: None,
            grant_ttl: None,
            writes: Mutex::new(()),
        }
    }

    /// Send every grant/revoke event to `sink` (builder pattern).
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Treat grants older than `ttl` as absent.
    pub fn with_grant_ttl(mut self, ttl: Duration) -> Self {
        self.grant_ttl = Some(ttl);
        self
    }

    pub fn ontology(&self) -> &Arc<CapabilitiesOntology> {
        &self.ontology
    }

    /// Whether a live, non-expired grant exists right now.
    pub fn is_granted(&self, subject_id: &str, sub_capability_key: &str) -> Result<bool, LedgerError> {
        self.is_granted_at(subject_id, sub_capability_key, Utc::now())
    }

    /// Whether a live grant exists that has not expired as of `now`.
    ///
    /// Unknown keys are `NotFound`. Keys that do not require consent never
    /// have a grant, so this is `false` for them.
    pub fn is_granted_at(
        &self,
        subject_id: &str,
        sub_capability_key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        self.ontology.requires_consent(sub_capability_key)?;
        let record = self.store.get(subject_id, sub_capability_key)?;
        Ok(record.is_some_and(|r| self.is_live(&r.state, now)))
    }

    /// Record consent for `(subject_id, sub_capability_key)` at time `at`.
    ///
    /// Idempotent: granting twice leaves one grant with the newer timestamp.
    pub fn grant(
        &self,
        subject_id: &str,
        sub_capability_key: &str,
        at: DateTime<Utc>,
    ) -> Result<GrantOutcome, LedgerError> {
        if !self.ontology.requires_consent(sub_capability_key)? {
            tracing::debug!(
                subject = subject_id,
                sub_capability = sub_capability_key,
                "consent not required, grant ignored"
            );
            let outcome = GrantOutcome::NotRequired;
            let event = self.event(
                subject_id,
                sub_capability_key,
                ConsentAction::Grant,
                at,
                outcome.as_str(),
            );
            self.audit(&event)?;
            return Ok(outcome);
        }

        let _guard = self.writes.lock().map_err(|_| StoreError::Poisoned)?;
        let current = self.store.get(subject_id, sub_capability_key)?;

        let outcome = match &current {
            Some(record) if record.state.at() > at => GrantOutcome::Superseded,
            Some(record) if self.is_live(&record.state, at) => GrantOutcome::Refreshed,
            _ => GrantOutcome::Granted,
        };

        let applied = (outcome != GrantOutcome::Superseded)
            .then(|| self.stored_record(subject_id, sub_capability_key, ConsentState::Granted { at }));
        let event = self.event(
            subject_id,
            sub_capability_key,
            ConsentAction::Grant,
            at,
            outcome.as_str(),
        );
        self.commit(applied, current, &event)?;

        tracing::info!(
            subject = subject_id,
            sub_capability = sub_capability_key,
            at = %at,
            outcome = ?outcome,
            "consent granted"
        );
        Ok(outcome)
    }

    /// Withdraw consent now.
    pub fn revoke(
        &self,
        subject_id: &str,
        sub_capability_key: &str,
    ) -> Result<RevokeOutcome, LedgerError> {
        self.revoke_at(subject_id, sub_capability_key, Utc::now())
    }

    /// Withdraw consent as of `at`.
    ///
    /// Idempotent: revoking a pair with no grant succeeds. A tombstone is
    /// still written so that a grant carrying an older timestamp, arriving
    /// later, does not take effect.
    pub fn revoke_at(
        &self,
        subject_id: &str,
        sub_capability_key: &str,
        at: DateTime<Utc>,
    ) -> Result<RevokeOutcome, LedgerError> {
        if !self.ontology.requires_consent(sub_capability_key)? {
            let outcome = RevokeOutcome::NotGranted;
            let event = self.event(
                subject_id,
                sub_capability_key,
                ConsentAction::Revoke,
                at,
                outcome.as_str(),
            );
            self.audit(&event)?;
            return Ok(outcome);
        }

        let _guard = self.writes.lock().map_err(|_| StoreError::Poisoned)?;
        let current = self.store.get(subject_id, sub_capability_key)?;

        let outcome = match &current {
            Some(record) if record.state.at() > at => RevokeOutcome::Superseded,
            Some(record) if self.is_live(&record.state, at) => RevokeOutcome::Revoked,
            _ => RevokeOutcome::NotGranted,
        };

        let applied = (outcome != RevokeOutcome::Superseded)
            .then(|| self.stored_record(subject_id, sub_capability_key, ConsentState::Revoked { at }));
        let event = self.event(
            subject_id,
            sub_capability_key,
            ConsentAction::Revoke,
            at,
            outcome.as_str(),
        );
        self.commit(applied, current, &event)?;

        tracing::info!(
            subject = subject_id,
            sub_capability = sub_capability_key,
            at = %at,
            outcome = ?outcome,
            "consent revoked"
        );
        Ok(outcome)
    }

    /// Active grants for a subject, sorted by sub-capability key.
    pub fn grants_for(&self, subject_id: &str) -> Result<Vec<ConsentGrant>, LedgerError> {
        let now = Utc::now();
        let mut grants: Vec<ConsentGrant> = self
            .store
            .list()?
            .into_iter()
            .filter(|r| r.subject_id == subject_id && self.is_live(&r.state, now))
            .map(|r| ConsentGrant {
                granted_at: r.state.at(),
                subject_id: r.subject_id,
                sub_capability_key: r.sub_capability_key,
            })
            .collect();
        grants.sort_by(|a, b| a.sub_capability_key.cmp(&b.sub_capability_key));
        Ok(grants)
    }

    /// Toolkit-level view of a subject's consent: every toolkit used by at
    /// least one granted sub-capability.
    ///
    /// Derived from the per-sub-capability grants; the ledger key does not
    /// change.
    pub fn granted_toolkits(&self, subject_id: &str) -> Result<BTreeSet<String>, LedgerError> {
        let keys: Vec<String> = self
            .grants_for(subject_id)?
            .into_iter()
            .map(|g| g.sub_capability_key)
            .collect();
        Ok(self.ontology.resolve_toolkits(keys)?)
    }

    fn is_live(&self, state: &ConsentState, now: DateTime<Utc>) -> bool {
        match state {
            ConsentState::Revoked { .. } => false,
            ConsentState::Granted { at } => match self.grant_ttl {
                Some(ttl) => now.signed_duration_since(*at) < ttl,
                None => true,
            },
        }
    }

    fn stored_record(
        &self,
        subject_id: &str,
        sub_capability_key: &str,
        state: ConsentState,
    ) -> ConsentRecord {
        ConsentRecord {
            subject_id: subject_id.to_string(),
            sub_capability_key: sub_capability_key.to_string(),
            state,
            ontology_version: self.ontology.version().to_string(),
        }
    }

    fn event(
        &self,
        subject_id: &str,
        sub_capability_key: &str,
        action: ConsentAction,
        at: DateTime<Utc>,
        outcome: &str,
    ) -> ConsentEvent {
        ConsentEvent::new(subject_id, sub_capability_key, action, at)
            .with_ontology_version(self.ontology.version())
            .with_outcome(outcome)
    }

    /// Write `applied` (if any), then audit. A failed write emits no event;
    /// a failed audit puts `previous` back.
    fn commit(
        &self,
        applied: Option<ConsentRecord>,
        previous: Option<ConsentRecord>,
        event: &ConsentEvent,
    ) -> Result<(), LedgerError> {
        if let Some(record) = &applied {
            self.store.put(record.clone())?;
        }

        let Err(e) = self.audit(event) else {
            return Ok(());
        };
        if let Some(record) = &applied {
            if let Err(undo) = self.store.restore(record, previous) {
                tracing::error!(
                    subject = %event.subject_id,
                    sub_capability = %event.sub_capability_key,
                    error = %undo,
                    "audit failed and the consent change could not be rolled back"
                );
            }
        }
        Err(e)
    }

    /// Every grant/revoke call is reported, including no-op ones; the event
    /// carries the outcome.
    fn audit(&self, event: &ConsentEvent) -> Result<(), LedgerError> {
        if let Some(sink) = &self.audit {
            sink.record(event)?;
        }
        Ok(())
    }

    fn prune_stale(&self) -> Result<(), LedgerError> {
        let mut pruned = 0;
        for record in self.store.list()? {
            let still_valid = matches!(
                self.ontology.requires_consent(&record.sub_capability_key),
                Ok(true)
            );
            if !still_valid {
                self.store
                    .remove(&record.subject_id, &record.sub_capability_key)?;
                pruned += 1;
            }
        }
        if pruned > 0 {
            tracing::warn!(
                pruned,
                version = %self.ontology.version(),
                "pruned consent records not valid for the loaded ontology"
            );
        }
        Ok(())
    }
}
