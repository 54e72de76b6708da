// gateway.rs - The authorization gateway.
//
// The façade the agent executor calls before invoking any tool:
//
// 1. Resolve the sub-capability in the ontology. Unknown keys → NotFound
//    error (a caller bug, never a denial).
// 2. Run deployment policy layers. First denial → Denied.
// 3. Sub-capability does not require consent → Allowed.
// 4. Ledger has a live grant for (subject, sub-capability) → Allowed.
// 5. Otherwise → ConsentRequired with a URL from the issuer.
//
// No retries and no waiting: ConsentRequired is terminal for the call. The
// executor suspends its own step, surfaces the URL, records the grant via
// `record_consent` once the user confirms, and calls `authorize` again.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tg_consent::{ConsentLedger, GrantOutcome, RevokeOutcome};
use tg_ontology::CapabilitiesOntology;

use crate::decision::{AuthorizationDecision, AuthorizationTrace, EvaluationStep};
use crate::error::GatewayError;
use crate::issuer::AuthorizationUrlIssuer;
use crate::policy::PolicyLayer;

/// What the executor wants to do, on whose behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequest<'a> {
    pub subject_id: &'a str,
    pub capability_key: &'a str,
    pub sub_capability_key: &'a str,
}

/// Gates tool execution on the ontology, policy layers and consent ledger.
///
/// `Send + Sync`; share one instance across executor tasks.
pub struct AuthorizationGateway {
    ledger: Arc<ConsentLedger>,
    issuer: Box<dyn AuthorizationUrlIssuer>,
    layers: Vec<Box<dyn PolicyLayer>>,
}

impl AuthorizationGateway {
    /// A gateway with the minimal policy: never denies on its own.
    pub fn new(ledger: Arc<ConsentLedger>, issuer: impl AuthorizationUrlIssuer + 'static) -> Self {
        Self {
            ledger,
            issuer: Box::new(issuer),
            layers: Vec::new(),
        }
    }

    /// Add a policy layer (builder pattern). Layers run in insertion order.
    pub fn with_layer(mut self, layer: impl PolicyLayer + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn ontology(&self) -> &Arc<CapabilitiesOntology> {
        self.ledger.ontology()
    }

    pub fn ledger(&self) -> &Arc<ConsentLedger> {
        &self.ledger
    }

    /// May `subject_id` use `capability_key.sub_capability_key` now?
    pub fn authorize(
        &self,
        subject_id: &str,
        capability_key: &str,
        sub_capability_key: &str,
    ) -> Result<AuthorizationDecision, GatewayError> {
        self.authorize_with_trace(subject_id, capability_key, sub_capability_key)
            .map(|trace| trace.decision)
    }

    /// Same as [`authorize`](Self::authorize), with every step recorded.
    pub fn authorize_with_trace(
        &self,
        subject_id: &str,
        capability_key: &str,
        sub_capability_key: &str,
    ) -> Result<AuthorizationTrace, GatewayError> {
        let request = AccessRequest {
            subject_id,
            capability_key,
            sub_capability_key,
        };
        let mut steps = Vec::new();

        // Step 1: ontology lookup. Errors propagate as NotFound.
        let sub = self
            .ontology()
            .sub_capability(capability_key, sub_capability_key)?;
        steps.push(EvaluationStep::new(
            "ontology_lookup",
            format!(
                "found {}.{} (requires consent: {})",
                capability_key, sub_capability_key, sub.requires_consent
            ),
            false,
        ));

        // Step 2: deployment policy layers.
        for layer in &self.layers {
            if let Some(reason) = layer.check(&request, sub) {
                steps.push(EvaluationStep::new(
                    layer.name(),
                    format!("denied: {}", reason),
                    true,
                ));
                return Ok(self.finish(&request, AuthorizationDecision::Denied { reason }, steps));
            }
            steps.push(EvaluationStep::new(layer.name(), "passed", false));
        }

        // Step 3: consent not required.
        if !sub.requires_consent {
            steps.push(EvaluationStep::new(
                "requires_consent",
                "allowed: consent not required",
                true,
            ));
            return Ok(self.finish(&request, AuthorizationDecision::Allowed, steps));
        }

        // Step 4: consent ledger.
        if self.ledger.is_granted(subject_id, sub_capability_key)? {
            steps.push(EvaluationStep::new(
                "consent_ledger",
                "allowed: consent granted",
                true,
            ));
            return Ok(self.finish(&request, AuthorizationDecision::Allowed, steps));
        }

        // Step 5: ask for consent.
        let toolkit = sub.primary_toolkit();
        let authorize_url = self.issuer.authorize_url(&request, toolkit)?;
        steps.push(EvaluationStep::new(
            "consent_ledger",
            format!(
                "consent required: no grant, authorize via {}",
                toolkit.unwrap_or(crate::issuer::INTERNAL_TOOLKIT)
            ),
            true,
        ));
        let decision = AuthorizationDecision::ConsentRequired {
            authorize_url,
            sub_capability_key: sub_capability_key.to_string(),
            toolkit: toolkit.map(str::to_string),
        };
        Ok(self.finish(&request, decision, steps))
    }

    /// Authorize every step of a plan and return only the pending consents,
    /// one per sub-capability, in request order.
    ///
    /// Lets the executor collect all authorization URLs up front instead of
    /// discovering them one suspended step at a time.
    pub fn pending_consents(
        &self,
        subject_id: &str,
        requests: &[(&str, &str)],
    ) -> Result<Vec<AuthorizationDecision>, GatewayError> {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for (capability_key, sub_capability_key) in requests {
            let decision = self.authorize(subject_id, capability_key, sub_capability_key)?;
            if decision.is_consent_required() && seen.insert(*sub_capability_key) {
                pending.push(decision);
            }
        }
        Ok(pending)
    }

    /// Grant-recording callback: the subject completed the external consent
    /// step for `sub_capability_key`.
    pub fn record_consent(
        &self,
        subject_id: &str,
        sub_capability_key: &str,
    ) -> Result<GrantOutcome, GatewayError> {
        Ok(self.ledger.grant(subject_id, sub_capability_key, Utc::now())?)
    }

    /// Withdraw a subject's consent.
    pub fn revoke_consent(
        &self,
        subject_id: &str,
        sub_capability_key: &str,
    ) -> Result<RevokeOutcome, GatewayError> {
        Ok(self.ledger.revoke(subject_id, sub_capability_key)?)
    }

    fn finish(
        &self,
        request: &AccessRequest<'_>,
        decision: AuthorizationDecision,
        steps: Vec<EvaluationStep>,
    ) -> AuthorizationTrace {
        tracing::debug!(
            subject = request.subject_id,
            capability = request.capability_key,
            sub_capability = request.sub_capability_key,
            decision = ?decision,
            "authorization decision"
        );
        AuthorizationTrace { decision, steps }
    }
}
