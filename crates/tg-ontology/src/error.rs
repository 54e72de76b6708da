// error.rs - Error types for ontology loading and lookup.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or querying the capabilities ontology.
#[derive(Debug, Error)]
pub enum OntologyError {
    /// The source is structurally invalid: unparseable, missing a required
    /// field, duplicate key, or a toolkit the registry does not recognize.
    #[error("invalid capabilities ontology from {source_name}: {reason}")]
    Validation { source_name: String, reason: String },

    /// An explicitly named source could not be read.
    #[error("capabilities source not readable at {path}: {source}")]
    SourceNotFound {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No capability with this key exists.
    #[error("unknown capability '{key}'")]
    CapabilityNotFound { key: String },

    /// The capability exists but has no sub-capability with this key.
    #[error("unknown sub-capability '{sub_capability_key}' in capability '{capability_key}'")]
    SubCapabilityNotFound {
        capability_key: String,
        sub_capability_key: String,
    },

    /// No capability in the ontology declares a sub-capability with this key.
    #[error("unknown sub-capability '{key}'")]
    UnknownSubCapability { key: String },
}

impl OntologyError {
    /// True for the lookup failures (unknown capability or sub-capability).
    ///
    /// These are caller bugs, never policy decisions, and are propagated
    /// unchanged through the ledger and gateway.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OntologyError::CapabilityNotFound { .. }
                | OntologyError::SubCapabilityNotFound { .. }
                | OntologyError::UnknownSubCapability { .. }
        )
    }

    pub(crate) fn validation(source_name: &str, reason: impl Into<String>) -> Self {
        OntologyError::Validation {
            source_name: source_name.to_string(),
            reason: reason.into(),
        }
    }
}
