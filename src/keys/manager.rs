//! Key lifecycle manager
//!
//! Generates, persists, rotates, revokes and retires named keys. The manager
//! is the only writer of key metadata. Every state change is written to the
//! key registry store before it is committed in memory, so a failed write
//! leaves the previous state intact.
//!
//! Per purpose there is exactly one `Active` key once any operation returns.
//! Rotation persists the new key first and the demoted one second; if the
//! process dies in between, [`KeyLifecycleManager::load`] resolves the
//! duplicate in favour of the highest version.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEvent, AuditSink, Severity};
use crate::clock::Clock;
use crate::config::settings::KeyPolicy;
use crate::crypto::{random_bytes, SecureBytes, ALGORITHM, KEY_SIZE};
use crate::error::{VaultError, VaultResult};
use crate::storage::KeyValueStore;

use super::metadata::{
    CleanupReport, KeyFailure, KeyHandle, KeyHealthStatus, KeyMetadata, KeyStatus, RotatedKey,
    RotationReport,
};

/// Prefix of every key record in the registry store
pub const RECORD_PREFIX: &str = "vaultkeep.key.";

/// Persisted form of a key
#[derive(Serialize, Deserialize)]
struct KeyRecord {
    metadata: KeyMetadata,
    /// base64 key material
    material: String,
}

struct StoredKey {
    metadata: KeyMetadata,
    material: SecureBytes,
}

impl StoredKey {
    fn handle(&self) -> KeyHandle {
        KeyHandle::new(self.metadata.clone(), self.material.clone())
    }
}

fn record_key(key_id: &str) -> String {
    format!("{}{}", RECORD_PREFIX, key_id)
}

fn new_key_id() -> String {
    format!("key-{}", Uuid::new_v4().simple())
}

/// Owner of all key material and metadata
pub struct KeyLifecycleManager {
    keys: RwLock<HashMap<String, StoredKey>>,
    registry: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    policy: KeyPolicy,
}

impl KeyLifecycleManager {
    /// Create a manager with no keys
    pub fn new(
        registry: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        policy: KeyPolicy,
    ) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            registry,
            clock,
            audit,
            policy,
        }
    }

    /// Create a manager and populate it from the registry store
    pub fn load(
        registry: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        policy: KeyPolicy,
    ) -> VaultResult<Self> {
        let manager = Self::new(registry, clock, audit, policy);
        manager.reload()?;
        Ok(manager)
    }

    /// Replace in-memory state with what the registry store holds
    pub fn reload(&self) -> VaultResult<usize> {
        let mut loaded = HashMap::new();

        for name in self.registry.list_keys()? {
            let Some(key_id) = name.strip_prefix(RECORD_PREFIX) else {
                continue;
            };
            let Some(raw) = self.registry.get(&name)? else {
                continue;
            };

            match decode_record(&raw) {
                Ok(stored) if stored.metadata.id == key_id => {
                    loaded.insert(stored.metadata.id.clone(), stored);
                }
                Ok(stored) => {
                    tracing::warn!(
                        record = %name,
                        embedded_id = %stored.metadata.id,
                        "skipping key record whose id does not match its name"
                    );
                }
                Err(e) => {
                    tracing::warn!(record = %name, error = %e, "skipping unreadable key record");
                }
            }
        }

        let count = loaded.len();
        let mut keys = self.write_keys()?;
        *keys = loaded;
        self.resolve_duplicate_actives(&mut keys);

        tracing::debug!(keys = count, "loaded key registry");
        Ok(count)
    }

    /// Generate a new active key for `purpose`
    ///
    /// An existing active key for the same purpose is deprecated in the same
    /// operation.
    pub fn generate_master_key(&self, purpose: &str) -> VaultResult<String> {
        if purpose.trim().is_empty() {
            return Err(VaultError::Validation("Key purpose cannot be empty".into()));
        }

        let mut keys = self.write_keys()?;
        let superseded = active_id(&keys, purpose);
        let version = next_version(&keys, purpose);
        let new_id = self.install_key(
            &mut keys,
            purpose,
            version,
            superseded.as_deref(),
            KeyStatus::Deprecated,
        )?;
        drop(keys);

        tracing::info!(
            purpose,
            key_id = %new_id,
            version,
            superseded = ?superseded,
            "generated master key"
        );
        self.audit(
            AuditAction::KeyGenerated,
            Severity::Info,
            json!({
                "key_id": new_id,
                "purpose": purpose,
                "version": version,
                "superseded_key_id": superseded,
            }),
        );

        Ok(new_id)
    }

    /// Replace `key_id` with a new version for the same purpose
    pub fn rotate_key(&self, key_id: &str) -> VaultResult<String> {
        let rotated = self.rotate_inner(key_id, "manual", false)?;
        rotated
            .map(|r| r.new_key_id)
            .ok_or_else(|| VaultError::key_not_found(key_id))
    }

    /// Rotate one key; `scheduled` rotations skip keys that are no longer
    /// active or due, which makes back-to-back sweeps idempotent
    fn rotate_inner(
        &self,
        key_id: &str,
        reason: &str,
        scheduled: bool,
    ) -> VaultResult<Option<RotatedKey>> {
        let now = self.clock.now();
        let mut keys = self.write_keys()?;

        let (purpose, status, due) = {
            let stored = keys
                .get(key_id)
                .ok_or_else(|| VaultError::key_not_found(key_id))?;
            (
                stored.metadata.purpose.clone(),
                stored.metadata.status,
                stored.metadata.is_rotation_due(now),
            )
        };

        if scheduled && (status != KeyStatus::Active || !due) {
            return Ok(None);
        }

        if status == KeyStatus::Revoked {
            return Err(VaultError::Validation(format!(
                "Key {} is revoked and cannot be rotated",
                key_id
            )));
        }

        let superseded = active_id(&keys, &purpose);
        let version = next_version(&keys, &purpose);
        let new_id = self.install_key(
            &mut keys,
            &purpose,
            version,
            superseded.as_deref(),
            KeyStatus::Deprecated,
        )?;
        drop(keys);

        tracing::info!(
            purpose = %purpose,
            old_key_id = key_id,
            new_key_id = %new_id,
            version,
            reason,
            "rotated key"
        );
        self.audit(
            AuditAction::KeyRotated,
            Severity::Info,
            json!({
                "old_key_id": key_id,
                "new_key_id": new_id,
                "purpose": purpose,
                "version": version,
                "reason": reason,
            }),
        );

        Ok(Some(RotatedKey {
            purpose,
            old_key_id: key_id.to_string(),
            new_key_id: new_id,
        }))
    }

    /// Revoke a key so it is never used again
    ///
    /// Revoking the active key provisions its replacement in the same
    /// operation; the id of the replacement is returned.
    pub fn revoke_key(&self, key_id: &str) -> VaultResult<Option<String>> {
        let mut keys = self.write_keys()?;

        let (purpose, status) = match keys.get(key_id) {
            Some(stored) => (stored.metadata.purpose.clone(), stored.metadata.status),
            None => return Err(VaultError::key_not_found(key_id)),
        };

        if status == KeyStatus::Revoked {
            return Ok(None);
        }

        let replacement = if status == KeyStatus::Active {
            // the old key is written as revoked together with its replacement
            let version = next_version(&keys, &purpose);
            Some(self.install_key(
                &mut keys,
                &purpose,
                version,
                Some(key_id),
                KeyStatus::Revoked,
            )?)
        } else {
            let revoked = match keys.get(key_id) {
                Some(stored) => {
                    let mut metadata = stored.metadata.clone();
                    metadata.status = KeyStatus::Revoked;
                    metadata
                }
                None => return Err(VaultError::key_not_found(key_id)),
            };
            self.persist(&revoked, &keys)?;
            if let Some(stored) = keys.get_mut(key_id) {
                stored.metadata = revoked;
            }
            None
        };
        drop(keys);

        tracing::warn!(key_id, purpose = %purpose, replacement = ?replacement, "revoked key");
        self.audit(
            AuditAction::KeyRevoked,
            Severity::High,
            json!({
                "key_id": key_id,
                "purpose": purpose,
                "replacement_key_id": replacement,
            }),
        );

        Ok(replacement)
    }

    /// The sole active key for `purpose`, refreshing its `last_used`
    ///
    /// `None` when the purpose has no key yet; callers provision one.
    pub fn get_active_key(&self, purpose: &str) -> VaultResult<Option<KeyHandle>> {
        let now = self.clock.now();
        let mut keys = self.write_keys()?;

        let handle = keys
            .values_mut()
            .find(|k| k.metadata.purpose == purpose && k.metadata.status == KeyStatus::Active)
            .map(|stored| {
                // last_used is tracked in memory and persisted with the next write
                stored.metadata.last_used = now;
                stored.handle()
            });

        Ok(handle)
    }

    /// Keys that may decrypt data for `purpose`, newest version first
    pub fn decryption_candidates(&self, purpose: &str) -> VaultResult<Vec<KeyHandle>> {
        let keys = self.read_keys()?;

        let mut candidates: Vec<KeyHandle> = keys
            .values()
            .filter(|k| k.metadata.purpose == purpose && k.metadata.status.can_decrypt())
            .map(StoredKey::handle)
            .collect();
        candidates.sort_by(|a, b| b.version().cmp(&a.version()));

        Ok(candidates)
    }

    /// Whether the key's rotation time has been reached; `false` for unknown ids
    pub fn is_rotation_due(&self, key_id: &str) -> bool {
        let now = self.clock.now();
        self.read_keys()
            .ok()
            .and_then(|keys| keys.get(key_id).map(|k| k.metadata.is_rotation_due(now)))
            .unwrap_or(false)
    }

    /// Rotate every active key whose rotation is due
    ///
    /// Each rotation is isolated: a failure is logged, audited and reported,
    /// and the sweep carries on with the remaining keys.
    pub fn perform_auto_rotation(&self) -> RotationReport {
        let now = self.clock.now();
        let mut report = RotationReport::default();

        let due: Vec<String> = match self.read_keys() {
            Ok(keys) => keys
                .values()
                .filter(|k| k.metadata.status == KeyStatus::Active)
                .filter(|k| k.metadata.is_rotation_due(now))
                .map(|k| k.metadata.id.clone())
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "auto-rotation could not read keys");
                return report;
            }
        };

        for key_id in due {
            match self.rotate_inner(&key_id, "scheduled", true) {
                Ok(Some(rotated)) => report.rotated.push(rotated),
                Ok(None) => {
                    tracing::debug!(key_id = %key_id, "key no longer due, skipping");
                }
                Err(e) => {
                    tracing::error!(key_id = %key_id, error = %e, "scheduled rotation failed");
                    self.audit(
                        AuditAction::KeyRotationFailed,
                        Severity::High,
                        json!({"key_id": key_id, "error": e.to_string()}),
                    );
                    report.failed.push(KeyFailure {
                        key_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !report.rotated.is_empty() || !report.failed.is_empty() {
            tracing::info!(
                rotated = report.rotated.len(),
                failed = report.failed.len(),
                "auto-rotation sweep finished"
            );
        }

        report
    }

    /// Delete deprecated and revoked keys older than the maximum key age
    ///
    /// Active keys are never deleted, whatever their age.
    pub fn cleanup_old_keys(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let cutoff = match days_before(self.clock.now(), self.policy.max_key_age_days) {
            Ok(cutoff) => cutoff,
            Err(e) => {
                tracing::error!(error = %e, "key cleanup skipped");
                return report;
            }
        };

        let mut keys = match self.write_keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(error = %e, "key cleanup could not lock keys");
                return report;
            }
        };

        let stale: Vec<String> = keys
            .values()
            .filter(|k| k.metadata.status != KeyStatus::Active)
            .filter(|k| k.metadata.created_at < cutoff)
            .map(|k| k.metadata.id.clone())
            .collect();

        for key_id in stale {
            match self.registry.remove(&record_key(&key_id)) {
                Ok(()) => {
                    let purpose = keys
                        .remove(&key_id)
                        .map(|k| k.metadata.purpose.clone())
                        .unwrap_or_default();
                    tracing::info!(key_id = %key_id, purpose = %purpose, "deleted retired key");
                    self.audit(
                        AuditAction::KeyDeleted,
                        Severity::Info,
                        json!({"key_id": key_id, "purpose": purpose}),
                    );
                    report.removed.push(key_id);
                }
                Err(e) => {
                    tracing::error!(key_id = %key_id, error = %e, "failed to delete retired key");
                    self.audit(
                        AuditAction::KeyCleanupFailed,
                        Severity::Warning,
                        json!({"key_id": key_id, "error": e.to_string()}),
                    );
                    report.failed.push(KeyFailure {
                        key_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Counts by status plus rotation and age indicators
    pub fn get_key_health_status(&self) -> KeyHealthStatus {
        let now = self.clock.now();
        let cutoff = days_before(now, self.policy.max_key_age_days).ok();
        let mut status = KeyHealthStatus::default();

        let Ok(keys) = self.read_keys() else {
            return status;
        };

        for stored in keys.values() {
            let meta = &stored.metadata;
            status.total_keys += 1;
            match meta.status {
                KeyStatus::Active => {
                    status.active_keys += 1;
                    if meta.is_rotation_due(now) {
                        status.rotation_due += 1;
                    }
                }
                KeyStatus::Deprecated => status.deprecated_keys += 1,
                KeyStatus::Revoked => status.revoked_keys += 1,
            }
            if cutoff.map_or(false, |cutoff| meta.created_at < cutoff) {
                status.old_keys += 1;
            }
        }

        status
    }

    /// Metadata for one key
    pub fn key_metadata(&self, key_id: &str) -> Option<KeyMetadata> {
        self.read_keys()
            .ok()
            .and_then(|keys| keys.get(key_id).map(|k| k.metadata.clone()))
    }

    /// Metadata for every key, grouped by purpose, newest version first
    pub fn list_keys(&self) -> Vec<KeyMetadata> {
        let Ok(keys) = self.read_keys() else {
            return Vec::new();
        };

        let mut all: Vec<KeyMetadata> = keys.values().map(|k| k.metadata.clone()).collect();
        all.sort_by(|a, b| {
            a.purpose
                .cmp(&b.purpose)
                .then_with(|| b.version.cmp(&a.version))
        });
        all
    }

    /// The configured lifecycle policy
    pub fn policy(&self) -> &KeyPolicy {
        &self.policy
    }

    /// Current time according to the manager's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create, persist and commit a new active key, moving `superseded` to `demote_to`
    fn install_key(
        &self,
        keys: &mut HashMap<String, StoredKey>,
        purpose: &str,
        version: u32,
        superseded: Option<&str>,
        demote_to: KeyStatus,
    ) -> VaultResult<String> {
        let now = self.clock.now();
        let rotation_due = days_after(now, self.policy.rotation_interval_days)?;
        let material = SecureBytes::new(random_bytes(KEY_SIZE)?);
        let metadata = KeyMetadata {
            id: new_key_id(),
            version,
            created_at: now,
            last_used: now,
            rotation_due,
            algorithm: ALGORITHM.to_string(),
            purpose: purpose.to_string(),
            status: KeyStatus::Active,
        };

        self.write_record(&metadata, &material)?;

        let demoted = match superseded.and_then(|id| keys.get(id)) {
            Some(old) => {
                let mut meta = old.metadata.clone();
                meta.status = demote_to;
                if let Err(e) = self.write_record(&meta, &old.material) {
                    if let Err(undo) = self.registry.remove(&record_key(&metadata.id)) {
                        tracing::error!(
                            key_id = %metadata.id,
                            error = %undo,
                            "failed to roll back new key record"
                        );
                    }
                    return Err(e);
                }
                Some(meta)
            }
            None => None,
        };

        if let Some(meta) = demoted {
            if let Some(old) = keys.get_mut(&meta.id) {
                old.metadata = meta;
            }
        }

        let id = metadata.id.clone();
        keys.insert(id.clone(), StoredKey { metadata, material });
        Ok(id)
    }

    /// Persist metadata for a key that already has material in `keys`
    fn persist(
        &self,
        metadata: &KeyMetadata,
        keys: &HashMap<String, StoredKey>,
    ) -> VaultResult<()> {
        let stored = keys
            .get(&metadata.id)
            .ok_or_else(|| VaultError::key_not_found(&metadata.id))?;
        self.write_record(metadata, &stored.material)
    }

    fn write_record(&self, metadata: &KeyMetadata, material: &SecureBytes) -> VaultResult<()> {
        let record = KeyRecord {
            metadata: metadata.clone(),
            material: STANDARD.encode(material.as_bytes()),
        };
        let json = serde_json::to_string(&record)?;
        self.registry.set(&record_key(&metadata.id), &json)
    }

    /// Demote all but the highest-version active key of each purpose
    fn resolve_duplicate_actives(&self, keys: &mut HashMap<String, StoredKey>) {
        let mut winners: HashMap<String, (u32, String)> = HashMap::new();
        for stored in keys.values() {
            let meta = &stored.metadata;
            if meta.status != KeyStatus::Active {
                continue;
            }
            let entry = winners
                .entry(meta.purpose.clone())
                .or_insert((meta.version, meta.id.clone()));
            if meta.version > entry.0 {
                *entry = (meta.version, meta.id.clone());
            }
        }

        let losers: Vec<String> = keys
            .values()
            .filter(|k| k.metadata.status == KeyStatus::Active)
            .filter(|k| {
                winners
                    .get(&k.metadata.purpose)
                    .map_or(false, |(_, id)| *id != k.metadata.id)
            })
            .map(|k| k.metadata.id.clone())
            .collect();

        for key_id in losers {
            if let Some(stored) = keys.get_mut(&key_id) {
                stored.metadata.status = KeyStatus::Deprecated;
                tracing::warn!(
                    key_id = %key_id,
                    purpose = %stored.metadata.purpose,
                    "demoted duplicate active key left by an interrupted rotation"
                );
                if let Err(e) = self.write_record(&stored.metadata, &stored.material) {
                    tracing::warn!(key_id = %key_id, error = %e, "failed to persist demotion");
                }
            }
        }
    }

    fn audit(&self, action: AuditAction, severity: Severity, details: serde_json::Value) {
        self.audit
            .log(AuditEvent::at(self.clock.now(), action, severity, details));
    }

    fn read_keys(&self) -> VaultResult<RwLockReadGuard<'_, HashMap<String, StoredKey>>> {
        self.keys
            .read()
            .map_err(|_| VaultError::lock_poisoned("key registry read"))
    }

    fn write_keys(&self) -> VaultResult<RwLockWriteGuard<'_, HashMap<String, StoredKey>>> {
        self.keys
            .write()
            .map_err(|_| VaultError::lock_poisoned("key registry write"))
    }
}

fn active_id(keys: &HashMap<String, StoredKey>, purpose: &str) -> Option<String> {
    keys.values()
        .find(|k| k.metadata.purpose == purpose && k.metadata.status == KeyStatus::Active)
        .map(|k| k.metadata.id.clone())
}

fn next_version(keys: &HashMap<String, StoredKey>, purpose: &str) -> u32 {
    keys.values()
        .filter(|k| k.metadata.purpose == purpose)
        .map(|k| k.metadata.version)
        .max()
        .unwrap_or(0)
        + 1
}

fn decode_record(raw: &str) -> VaultResult<StoredKey> {
    let record: KeyRecord = serde_json::from_str(raw)?;
    let material = STANDARD
        .decode(&record.material)
        .map_err(|e| VaultError::Storage(format!("Invalid key material encoding: {}", e)))?;

    if material.len() != KEY_SIZE {
        return Err(VaultError::Storage(format!(
            "Invalid key material size: expected {}, got {}",
            KEY_SIZE,
            material.len()
        )));
    }

    Ok(StoredKey {
        metadata: record.metadata,
        material: SecureBytes::new(material),
    })
}

fn days_after(at: DateTime<Utc>, days: i64) -> VaultResult<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|span| at.checked_add_signed(span))
        .ok_or_else(|| VaultError::Config(format!("{} days after {} is out of range", days, at)))
}

fn days_before(at: DateTime<Utc>, days: i64) -> VaultResult<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|span| at.checked_sub_signed(span))
        .ok_or_else(|| VaultError::Config(format!("{} days before {} is out of range", days, at)))
}

/// Age of a key at `now`
pub fn key_age(metadata: &KeyMetadata, now: DateTime<Utc>) -> Duration {
    now - metadata.created_at
}
