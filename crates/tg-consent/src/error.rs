// error.rs - Error types for the consent ledger.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from a consent store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("consent store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The backing file is not valid JSON.
    #[error("consent store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another writer held the store's lock file for too long.
    #[error("consent store is locked by another writer: {path}")]
    Locked { path: PathBuf },

    /// A writer panicked while holding the store lock.
    #[error("consent store lock poisoned")]
    Poisoned,
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The sub-capability key is not in the loaded ontology.
    #[error(transparent)]
    NotFound(#[from] tg_ontology::OntologyError),

    /// The audit sink refused the event; the change was not applied.
    #[error("audit sink rejected consent event: {0}")]
    Audit(#[from] tg_audit::AuditError),

    /// The store backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
