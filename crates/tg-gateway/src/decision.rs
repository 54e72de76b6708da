// decision.rs - Authorization decisions and evaluation traces.

use serde::{Deserialize, Serialize};

/// The outcome of an authorization check.
///
/// Three-way on purpose: callers must handle the pending-consent path
/// explicitly instead of collapsing it into "allowed" or "error".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
#[must_use]
pub enum AuthorizationDecision {
    /// Proceed with the tool call.
    Allowed,
    /// A deployment policy layer refused the call.
    Denied { reason: String },
    /// The subject must consent first. Surface `authorize_url`, suspend the
    /// step, record the grant once the user completes it, then retry.
    ConsentRequired {
        authorize_url: String,
        sub_capability_key: String,
        /// Toolkit the URL was issued for; `None` for sub-capabilities that
        /// declare no toolkit.
        toolkit: Option<String>,
    },
}

impl AuthorizationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthorizationDecision::Allowed)
    }

    pub fn is_consent_required(&self) -> bool {
        matches!(self, AuthorizationDecision::ConsentRequired { .. })
    }

    /// The URL to show the subject, if consent is pending.
    pub fn authorize_url(&self) -> Option<&str> {
        match self {
            AuthorizationDecision::ConsentRequired { authorize_url, .. } => Some(authorize_url),
            _ => None,
        }
    }
}

/// One check the gateway performed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationStep {
    /// Which check ran (e.g. "ontology_lookup", "consent_ledger").
    pub check: String,
    /// What it found (e.g. "passed", "granted", "not granted").
    pub outcome: String,
    /// Whether this step produced the decision.
    pub terminal: bool,
}

impl EvaluationStep {
    pub(crate) fn new(check: &str, outcome: impl Into<String>, terminal: bool) -> Self {
        Self {
            check: check.to_string(),
            outcome: outcome.into(),
            terminal,
        }
    }
}

/// A decision together with the ordered steps that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationTrace {
    pub decision: AuthorizationDecision,
    pub steps: Vec<EvaluationStep>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_serializes_with_tag() {
        let decision = AuthorizationDecision::ConsentRequired {
            authorize_url: "http://localhost:8787/authorize/github".to_string(),
            sub_capability_key: "create_repo".to_string(),
            toolkit: Some("github".to_string()),
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["decision"], "consent_required");
        assert_eq!(json["sub_capability_key"], "create_repo");

        let allowed = serde_json::to_value(AuthorizationDecision::Allowed).unwrap();
        assert_eq!(allowed["decision"], "allowed");
    }

    #[test]
    fn helpers_distinguish_all_three() {
        let denied = AuthorizationDecision::Denied {
            reason: "deny-listed".to_string(),
        };
        assert!(!denied.is_allowed());
        assert!(!denied.is_consent_required());
        assert!(denied.authorize_url().is_none());
        assert!(AuthorizationDecision::Allowed.is_allowed());
    }
}
