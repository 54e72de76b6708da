// error.rs - Error types for the authorization gateway.

use std::path::PathBuf;

use thiserror::Error;
use tg_consent::LedgerError;
use tg_ontology::OntologyError;

/// The authorization-URL issuer could not produce a URL.
#[derive(Debug, Error)]
#[error("cannot issue authorization URL: {0}")]
pub struct IssuerError(pub String);

/// Errors that can occur during gateway operations.
///
/// `ConsentRequired` is not here: it is a decision, not a failure.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Unknown capability or sub-capability. A caller bug, never a denial.
    #[error(transparent)]
    NotFound(OntologyError),

    /// The ontology could not be loaded or is invalid.
    #[error("ontology error: {0}")]
    Ontology(OntologyError),

    /// The consent ledger failed (store or audit sink).
    #[error("consent ledger error: {0}")]
    Ledger(LedgerError),

    #[error(transparent)]
    Issuer(#[from] IssuerError),

    /// Deployment configuration is malformed or inconsistent.
    #[error("invalid configuration in {path}: {reason}")]
    Config { path: PathBuf, reason: String },
}

/// Lookup failures surface as `NotFound`; everything else is a load problem.
impl From<OntologyError> for GatewayError {
    fn from(e: OntologyError) -> Self {
        if e.is_not_found() {
            GatewayError::NotFound(e)
        } else {
            GatewayError::Ontology(e)
        }
    }
}

/// Keep `NotFound` from the ledger unchanged so callers match one variant.
impl From<LedgerError> for GatewayError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(inner) => GatewayError::from(inner),
            other => GatewayError::Ledger(other),
        }
    }
}
