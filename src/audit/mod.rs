//! Audit reporting for vaultkeep
//!
//! Key generation, rotation, revocation, cleanup and data migration are
//! reported as [`AuditEvent`]s to an [`AuditSink`].
//!
//! # Architecture
//!
//! - `AuditEvent`: a single event with timestamp, action, severity and
//!   structured details.
//! - `AuditSink`: fire-and-forget destination. Implementations shipped here
//!   are `AuditLogger` (JSONL file), `MemoryAuditSink` and `NoopAuditSink`.
//!
//! # Example
//!
//! ```rust,ignore
//! use vaultkeep::audit::{AuditAction, AuditEvent, AuditLogger, AuditSink, Severity};
//! use serde_json::json;
//!
//! let logger = AuditLogger::new(audit_log_path);
//! logger.log(AuditEvent::new(
//!     AuditAction::KeyRotated,
//!     Severity::Info,
//!     json!({"old_key_id": old_id, "new_key_id": new_id}),
//! ));
//! ```

mod entry;
mod logger;

pub use entry::{AuditAction, AuditEvent, Severity};
pub use logger::{AuditLogger, AuditSink, MemoryAuditSink, NoopAuditSink};
