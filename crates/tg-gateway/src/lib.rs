//! # tg-gateway
//!
//! Authorization gateway for Toolgate.
//!
//! The agent executor calls [`AuthorizationGateway::authorize`] before every
//! tool invocation. The gateway resolves the requested sub-capability in the
//! ontology, runs any deployment [`PolicyLayer`]s, and consults the consent
//! ledger. The answer is one of three [`AuthorizationDecision`]s: Allowed,
//! Denied, or ConsentRequired with a URL the subject can visit to grant
//! access.
//!
//! ## Key invariants
//!
//! - **No consent, no call**: a sub-capability marked `requiresConsent` is
//!   never Allowed without a live grant for that exact subject and
//!   sub-capability.
//! - **Unknown is an error**: a capability or sub-capability missing from
//!   the ontology is [`GatewayError::NotFound`], never a silent denial.
//! - **Non-blocking**: `authorize` never waits for a user. ConsentRequired is
//!   returned immediately; the executor records the grant via
//!   [`AuthorizationGateway::record_consent`] and retries.
//!
//! ```rust
//! use std::sync::Arc;
//! use tg_consent::ConsentLedger;
//! use tg_gateway::{AuthorizationGateway, TemplateUrlIssuer};
//!
//! let ontology = Arc::new(tg_ontology::load(None).unwrap());
//! let ledger = Arc::new(ConsentLedger::in_memory(ontology));
//! let gateway = AuthorizationGateway::new(
//!     ledger,
//!     TemplateUrlIssuer::new("http://localhost:8787/").unwrap(),
//! );
//!
//! let decision = gateway.authorize("u1", "repo_ci", "create_repo").unwrap();
//! assert!(decision.is_consent_required());
//! gateway.record_consent("u1", "create_repo").unwrap();
//! assert!(gateway.authorize("u1", "repo_ci", "create_repo").unwrap().is_allowed());
//! ```

pub mod config;
pub mod decision;
pub mod error;
pub mod gateway;
pub mod issuer;
pub mod policy;

pub use config::GatewayConfig;
pub use decision::{AuthorizationDecision, AuthorizationTrace, EvaluationStep};
pub use error::{GatewayError, IssuerError};
pub use gateway::{AccessRequest, AuthorizationGateway};
pub use issuer::{AuthorizationUrlIssuer, TemplateUrlIssuer, INTERNAL_TOOLKIT};
pub use policy::{
    default_role_approvals, default_role_toolkits, ApprovalGate, DenyList, PolicyLayer,
    RoleToolPolicy, SensitiveAction,
};
