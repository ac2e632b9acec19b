//! Secure storage facade
//!
//! A key-value store that encrypts the values of sensitive keys before they
//! reach the underlying [`KeyValueStore`] and decrypts them on the way out.
//! Keys are classified by name through a [`SensitiveKeySet`]; call sites that
//! know better can override the classification per call.
//!
//! Reads are fail-closed and fail-silent: a value that cannot be decrypted
//! is reported as absent by [`SecureStorage::get`] and logged, never
//! returned as ciphertext. [`SecureStorage::read`] tells corruption apart
//! from absence.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tokio::runtime::Handle;

use crate::audit::{AuditAction, AuditEvent, AuditSink, Severity};
use crate::crypto::EnvelopeEncryptionService;
use crate::error::{VaultError, VaultResult};

use super::classify::SensitiveKeySet;
use super::expiry::ExpiryTimers;
use super::formats::{FormatChain, StoredFormat};
use super::store::KeyValueStore;

/// How a single call should treat its key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Classification {
    /// Ask the sensitive key set
    #[default]
    ByPattern,
    /// Always encrypt
    Sensitive,
    /// Never encrypt
    Plain,
}

/// Result of [`SecureStorage::read`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Value(String),
    Missing,
    /// Present but could not be decrypted or decoded
    Corrupted,
}

impl ReadOutcome {
    pub fn into_option(self) -> Option<String> {
        match self {
            ReadOutcome::Value(value) => Some(value),
            ReadOutcome::Missing | ReadOutcome::Corrupted => None,
        }
    }
}

/// A stored key a migration could not convert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationFailure {
    pub key: String,
    pub error: String,
}

/// Outcome of a migration or re-encryption pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    /// Sensitive keys inspected
    pub scanned: usize,
    /// Keys rewritten as current envelopes
    pub migrated: Vec<String>,
    /// Keys already in the target state
    pub skipped: usize,
    pub failed: Vec<MigrationFailure>,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct SecureStorage {
    store: Arc<dyn KeyValueStore>,
    crypto: Arc<EnvelopeEncryptionService>,
    sensitive: RwLock<SensitiveKeySet>,
    formats: FormatChain,
    audit: Arc<dyn AuditSink>,
    expiry: ExpiryTimers,
}

impl SecureStorage {
    /// Facade with the default sensitive key set and format chain
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        crypto: Arc<EnvelopeEncryptionService>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            crypto,
            sensitive: RwLock::new(SensitiveKeySet::with_defaults()),
            formats: FormatChain::standard(),
            audit,
            expiry: ExpiryTimers::new(),
        }
    }

    /// Replace the sensitive key set
    pub fn with_sensitive_keys(mut self, keys: SensitiveKeySet) -> Self {
        self.sensitive = RwLock::new(keys);
        self
    }

    /// Replace the format chain used for reads and migrations
    pub fn with_formats(mut self, formats: FormatChain) -> Self {
        self.formats = formats;
        self
    }

    pub fn encryption(&self) -> &Arc<EnvelopeEncryptionService> {
        &self.crypto
    }

    // ------------------------------------------------------------------
    // Classification
    // ------------------------------------------------------------------

    /// Whether `key` would be encrypted by a plain `set`
    pub fn is_sensitive(&self, key: &str) -> bool {
        match self.sensitive.read() {
            Ok(set) => set.matches(key),
            Err(_) => {
                // fail closed
                tracing::warn!(key, "sensitive key set lock poisoned, treating key as sensitive");
                true
            }
        }
    }

    pub fn add_sensitive_pattern(&self, pattern: &str) -> VaultResult<()> {
        self.sensitive
            .write()
            .map_err(|_| VaultError::lock_poisoned("sensitive key set"))?
            .add(pattern)
    }

    pub fn remove_sensitive_pattern(&self, pattern: &str) -> VaultResult<bool> {
        Ok(self
            .sensitive
            .write()
            .map_err(|_| VaultError::lock_poisoned("sensitive key set"))?
            .remove(pattern))
    }

    /// Current sensitive names and patterns
    pub fn sensitive_patterns(&self) -> Vec<String> {
        self.sensitive
            .read()
            .map(|set| set.entries())
            .unwrap_or_default()
    }

    fn resolve(&self, key: &str, classification: Classification) -> bool {
        match classification {
            Classification::ByPattern => self.is_sensitive(key),
            Classification::Sensitive => true,
            Classification::Plain => false,
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub fn set(&self, key: &str, value: &str) -> VaultResult<()> {
        self.set_as(key, value, Classification::ByPattern)
    }

    /// Store a value, encrypting it first when the key is sensitive
    ///
    /// An encryption failure is returned before anything is written. Any
    /// pending expiry for the key is cancelled.
    pub fn set_as(&self, key: &str, value: &str, classification: Classification) -> VaultResult<()> {
        let stored = if self.resolve(key, classification) {
            self.crypto.encrypt_to_string(value)?
        } else {
            value.to_string()
        };

        self.expiry.cancel(key);
        self.store.set(key, &stored).map_err(into_storage)
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> VaultResult<()> {
        let json = serde_json::to_string(value)?;
        self.set(key, &json)
    }

    /// Store a value that deletes itself after `ttl`
    ///
    /// Must be called from within a tokio runtime. Overwriting or removing
    /// the key before then cancels the expiry.
    pub fn set_transient(&self, key: &str, value: &str, ttl: Duration) -> VaultResult<()> {
        let runtime = Handle::try_current().map_err(|_| {
            VaultError::Config("transient values need a running tokio runtime".into())
        })?;

        self.set(key, value)?;
        self.expiry
            .schedule(&runtime, Arc::clone(&self.store), key, ttl)
    }

    /// Cancel a pending expiry; returns whether one was pending
    pub fn cancel_expiry(&self, key: &str) -> bool {
        self.expiry.cancel(key)
    }

    pub fn has_pending_expiry(&self, key: &str) -> bool {
        self.expiry.is_pending(key)
    }

    /// Best effort; failures are logged
    pub fn remove(&self, key: &str) {
        self.expiry.cancel(key);
        if let Err(e) = self.store.remove(key) {
            tracing::warn!(key, error = %e, "failed to remove value");
        }
    }

    /// Best effort; failures are logged
    pub fn clear(&self) {
        self.expiry.cancel_all();
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "failed to clear storage");
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_as(key, Classification::ByPattern)
    }

    pub fn get_as(&self, key: &str, classification: Classification) -> Option<String> {
        self.read_as(key, classification).into_option()
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key, error = %e, "stored value is not the requested JSON type");
                None
            }
        }
    }

    pub fn read(&self, key: &str) -> ReadOutcome {
        self.read_as(key, Classification::ByPattern)
    }

    /// Read a value, telling corrupted data apart from absent data
    pub fn read_as(&self, key: &str, classification: Classification) -> ReadOutcome {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return ReadOutcome::Missing,
            Err(e) => {
                tracing::error!(key, error = %e, "failed to read from underlying store");
                return ReadOutcome::Missing;
            }
        };

        if !self.resolve(key, classification) {
            return ReadOutcome::Value(raw);
        }

        match self.formats.decode(&raw, &self.crypto) {
            Ok((format, plaintext)) => {
                if format != StoredFormat::Envelope {
                    tracing::debug!(key, %format, "sensitive value is not yet migrated");
                }
                ReadOutcome::Value(plaintext)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to decrypt stored value");
                ReadOutcome::Corrupted
            }
        }
    }

    /// All keys in the underlying store
    pub fn keys(&self) -> VaultResult<Vec<String>> {
        self.store.list_keys()
    }

    // ------------------------------------------------------------------
    // Migrations
    // ------------------------------------------------------------------

    /// Encrypt every sensitive value not yet stored as an envelope
    ///
    /// Plaintext and legacy values are rewritten; current envelopes are
    /// skipped, so running this twice changes nothing the second time.
    pub fn migrate_existing_data(&self) -> VaultResult<MigrationReport> {
        self.migrate(
            "migrate_existing_data",
            AuditAction::DataMigrated,
            |format| format != StoredFormat::Envelope,
        )
    }

    /// Upgrade legacy base64 values to envelopes; plaintext is left alone
    pub fn migrate_to_advanced_encryption(&self) -> VaultResult<MigrationReport> {
        self.migrate(
            "migrate_to_advanced_encryption",
            AuditAction::DataMigrated,
            |format| format == StoredFormat::LegacyBase64,
        )
    }

    /// Re-encrypt every sensitive envelope under the current active key
    ///
    /// Run after a master key rotation so old keys can be retired.
    pub fn reencrypt_sensitive_data(&self) -> VaultResult<MigrationReport> {
        self.migrate(
            "reencrypt_sensitive_data",
            AuditAction::DataReencrypted,
            |format| format == StoredFormat::Envelope,
        )
    }

    fn migrate(
        &self,
        operation: &str,
        action: AuditAction,
        selects: impl Fn(StoredFormat) -> bool,
    ) -> VaultResult<MigrationReport> {
        let mut report = MigrationReport::default();

        for key in self.store.list_keys()? {
            if !self.is_sensitive(&key) {
                continue;
            }
            report.scanned += 1;

            let raw = match self.store.get(&key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    report.failed.push(MigrationFailure {
                        key,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            match self.formats.detect(&raw) {
                Some(format) if selects(format) => {}
                _ => {
                    report.skipped += 1;
                    continue;
                }
            }

            match self.rewrite(&key, &raw) {
                Ok(()) => report.migrated.push(key),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, operation, "failed to migrate value");
                    report.failed.push(MigrationFailure {
                        key,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            operation,
            scanned = report.scanned,
            migrated = report.migrated.len(),
            skipped = report.skipped,
            failed = report.failed.len(),
            "migration finished"
        );

        let severity = if report.is_clean() {
            Severity::Info
        } else {
            Severity::Warning
        };
        self.audit.log(AuditEvent::new(
            action,
            severity,
            json!({
                "operation": operation,
                "scanned": report.scanned,
                "migrated": report.migrated.len(),
                "skipped": report.skipped,
                "failed": report.failed.len(),
            }),
        ));

        Ok(report)
    }

    fn rewrite(&self, key: &str, raw: &str) -> VaultResult<()> {
        let (_, plaintext) = self.formats.decode(raw, &self.crypto)?;
        let envelope = self.crypto.encrypt_to_string(&plaintext)?;
        self.store.set(key, &envelope).map_err(into_storage)
    }
}

fn into_storage(err: VaultError) -> VaultError {
    match err {
        VaultError::Storage(_) => err,
        other => VaultError::Storage(other.to_string()),
    }
}
