//! # tg-audit
//!
//! Audit trail for consent changes in Toolgate.
//!
//! Every grant and revoke on the consent ledger is handed to an
//! [`AuditSink`] as a [`ConsentEvent`] carrying
//! `(subject_id, sub_capability_key, action, timestamp)`. The durable sink
//! is an [`AuditLog`]: a JSONL file where each line links to the previous
//! one by SHA-256, so tampering is detectable.
//!
//! ```rust,no_run
//! use std::sync::Mutex;
//! use chrono::Utc;
//! use tg_audit::{AuditLog, AuditSink, ConsentAction, ConsentEvent};
//!
//! let sink = Mutex::new(AuditLog::open("/tmp/consent-audit.jsonl").unwrap());
//! sink.record(&ConsentEvent::new("u1", "create_repo", ConsentAction::Grant, Utc::now()))
//!     .unwrap();
//! ```

pub mod error;
pub mod event;
pub mod hasher;
pub mod log;
pub mod sink;

pub use error::AuditError;
pub use event::{ConsentAction, ConsentEvent};
pub use log::AuditLog;
pub use sink::{AuditSink, MemoryAuditSink};
