//! Audit event data structures
//!
//! Defines the actions and severities reported to the audit sink and the
//! event record itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Security-relevant actions performed by the key manager and storage facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A new key was generated for a purpose
    KeyGenerated,
    /// A key was superseded by a new version
    KeyRotated,
    /// A scheduled rotation of one key failed
    KeyRotationFailed,
    /// A key was revoked
    KeyRevoked,
    /// A retired key was deleted by cleanup
    KeyDeleted,
    /// Deleting a retired key failed
    KeyCleanupFailed,
    /// Stored values were moved to the current envelope format
    DataMigrated,
    /// Stored envelopes were re-encrypted under the active key
    DataReencrypted,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::KeyGenerated => write!(f, "KEY_GENERATED"),
            AuditAction::KeyRotated => write!(f, "KEY_ROTATED"),
            AuditAction::KeyRotationFailed => write!(f, "KEY_ROTATION_FAILED"),
            AuditAction::KeyRevoked => write!(f, "KEY_REVOKED"),
            AuditAction::KeyDeleted => write!(f, "KEY_DELETED"),
            AuditAction::KeyCleanupFailed => write!(f, "KEY_CLEANUP_FAILED"),
            AuditAction::DataMigrated => write!(f, "DATA_MIGRATED"),
            AuditAction::DataReencrypted => write!(f, "DATA_REENCRYPTED"),
        }
    }
}

/// How much attention an audit event deserves
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A single audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the action occurred (UTC)
    pub timestamp: DateTime<Utc>,

    /// What happened
    pub action: AuditAction,

    /// How important it is
    pub severity: Severity,

    /// Free-form structured context (key ids, counts, error text)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl AuditEvent {
    /// Create an event stamped with the current time
    pub fn new(action: AuditAction, severity: Severity, details: serde_json::Value) -> Self {
        Self::at(Utc::now(), action, severity, details)
    }

    /// Create an event with an explicit timestamp
    pub fn at(
        timestamp: DateTime<Utc>,
        action: AuditAction,
        severity: Severity,
        details: serde_json::Value,
    ) -> Self {
        Self {
            timestamp,
            action,
            severity,
            details,
        }
    }

    /// Format the event for human-readable output
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} ({})",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.action,
            self.severity
        );

        if !self.details.is_null() {
            output.push_str(&format!(" {}", self.details));
        }

        output
    }
}
