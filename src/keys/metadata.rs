//! Key metadata and report types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::SecureBytes;

/// Lifecycle status of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// Used for new encryptions; exactly one per purpose
    Active,
    /// Superseded; kept only to decrypt older data until retention expires
    Deprecated,
    /// Withdrawn; never used again
    Revoked,
}

impl KeyStatus {
    /// Whether data encrypted under a key in this state may still be decrypted
    pub fn can_decrypt(&self) -> bool {
        matches!(self, KeyStatus::Active | KeyStatus::Deprecated)
    }
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyStatus::Active => write!(f, "active"),
            KeyStatus::Deprecated => write!(f, "deprecated"),
            KeyStatus::Revoked => write!(f, "revoked"),
        }
    }
}

/// Everything known about a key except its material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetadata {
    pub id: String,
    /// Monotonic per purpose, starting at 1
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub rotation_due: DateTime<Utc>,
    pub algorithm: String,
    pub purpose: String,
    pub status: KeyStatus,
}

impl KeyMetadata {
    /// Whether `now` has reached the scheduled rotation time
    pub fn is_rotation_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.rotation_due
    }
}

/// A key handed out to readers: a metadata snapshot plus the material
#[derive(Debug, Clone)]
pub struct KeyHandle {
    pub metadata: KeyMetadata,
    material: SecureBytes,
}

impl KeyHandle {
    pub(crate) fn new(metadata: KeyMetadata, material: SecureBytes) -> Self {
        Self { metadata, material }
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn version(&self) -> u32 {
        self.metadata.version
    }

    /// Raw key material
    pub fn material(&self) -> &[u8] {
        self.material.as_bytes()
    }
}

/// Aggregate view over all keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyHealthStatus {
    pub total_keys: usize,
    pub active_keys: usize,
    pub deprecated_keys: usize,
    pub revoked_keys: usize,
    /// Active keys whose rotation time has passed
    pub rotation_due: usize,
    /// Keys older than the maximum key age
    pub old_keys: usize,
}

/// One key that an isolated sweep step could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFailure {
    pub key_id: String,
    pub error: String,
}

/// A completed rotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotatedKey {
    pub purpose: String,
    pub old_key_id: String,
    pub new_key_id: String,
}

/// Outcome of [`KeyLifecycleManager::perform_auto_rotation`](super::KeyLifecycleManager::perform_auto_rotation)
#[derive(Debug, Clone, Default, Serialize)]
pub struct RotationReport {
    pub rotated: Vec<RotatedKey>,
    pub failed: Vec<KeyFailure>,
}

impl RotationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of [`KeyLifecycleManager::cleanup_old_keys`](super::KeyLifecycleManager::cleanup_old_keys)
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub removed: Vec<String>,
    pub failed: Vec<KeyFailure>,
}
