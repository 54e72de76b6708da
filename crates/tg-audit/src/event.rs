// event.rs - Consent audit event data model.
//
// Every grant and revoke call on the consent ledger is recorded as a
// ConsentEvent. When written to an AuditLog, events are chained by
// `previous_hash` so tampering can be detected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to the consent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsentAction {
    /// The subject granted consent for a sub-capability.
    Grant,
    /// Consent was withdrawn.
    Revoke,
}

impl std::fmt::Display for ConsentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsentAction::Grant => write!(f, "grant"),
            ConsentAction::Revoke => write!(f, "revoke"),
        }
    }
}

/// One grant or revoke call, as seen by the audit sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsentEvent {
    pub event_id: Uuid,

    /// Identity scope of the grant (user id, session id).
    pub subject_id: String,

    pub sub_capability_key: String,

    pub action: ConsentAction,

    /// The logical time of the grant/revoke. Ledger ordering uses this,
    /// not arrival order.
    pub timestamp: DateTime<Utc>,

    /// When the event reached the sink.
    pub recorded_at: DateTime<Utc>,

    /// Version of the ontology the write was checked against.
    #[serde(default)]
    pub ontology_version: Option<String>,

    /// What the call did (e.g. "granted", "superseded", "not_required").
    #[serde(default)]
    pub outcome: Option<String>,

    /// Hash of the previous line in the audit log. None for the first
    /// event and for events never written to a chained log.
    #[serde(default)]
    pub previous_hash: Option<String>,
}

impl ConsentEvent {
    pub fn new(
        subject_id: impl Into<String>,
        sub_capability_key: impl Into<String>,
        action: ConsentAction,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            sub_capability_key: sub_capability_key.into(),
            action,
            timestamp,
            recorded_at: Utc::now(),
            ontology_version: None,
            outcome: None,
            previous_hash: None,
        }
    }

    /// Set the ontology version and return self (builder pattern).
    pub fn with_ontology_version(mut self, version: impl Into<String>) -> Self {
        self.ontology_version = Some(version.into());
        self
    }

    /// Set the outcome and return self (builder pattern).
    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }
}
