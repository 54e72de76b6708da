// sink.rs - The audit sink seam the consent ledger writes through.

use std::sync::Mutex;

use crate::error::AuditError;
use crate::event::ConsentEvent;
use crate::log::AuditLog;

/// Receives every grant and revoke event from the consent ledger.
///
/// Implementations must be shareable across threads; the ledger calls
/// `record` before it applies the state change, and a failure aborts the
/// change.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &ConsentEvent) -> Result<(), AuditError>;
}

/// A durable sink: the hash-chained JSONL log behind a mutex.
impl AuditSink for Mutex<AuditLog> {
    fn record(&self, event: &ConsentEvent) -> Result<(), AuditError> {
        let mut log = self
            .lock()
            .map_err(|e| AuditError::Unavailable(e.to_string()))?;
        let mut event = event.clone();
        log.append(&mut event)
    }
}

/// Keeps events in memory. Useful for tests and for deployments that only
/// want to inspect recent activity.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<ConsentEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub fn events(&self) -> Vec<ConsentEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &ConsentEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .map_err(|e| AuditError::Unavailable(e.to_string()))?
            .push(event.clone());
        Ok(())
    }
}
