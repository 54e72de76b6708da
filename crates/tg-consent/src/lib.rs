//! # tg-consent
//!
//! The consent ledger for Toolgate.
//!
//! Records which consent-required sub-capabilities each subject (user or
//! session) has explicitly authorized. The [`ConsentLedger`] checks every
//! write against the loaded ontology, orders conflicting grant/revoke calls
//! by timestamp (last writer wins), and reports each call to an optional
//! [`tg_audit::AuditSink`].
//!
//! Storage is pluggable through [`ConsentStore`]: [`MemoryConsentStore`] for
//! session-scoped consent, [`FileConsentStore`] when the deployment wants
//! grants to outlive the process.

pub mod error;
pub mod ledger;
pub mod store;

pub use error::{LedgerError, StoreError};
pub use ledger::{ConsentGrant, ConsentLedger, GrantOutcome, RevokeOutcome};
pub use store::{ConsentRecord, ConsentState, ConsentStore, FileConsentStore, MemoryConsentStore};
