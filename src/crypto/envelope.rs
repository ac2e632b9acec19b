//! Envelope encryption
//!
//! Turns a plaintext string into a self-describing [`EncryptedEnvelope`]
//! (ciphertext, iv, salt, tag, version) and back. Each envelope gets a fresh
//! salt and iv; the AES key is derived with PBKDF2 from the master password
//! combined with the active key material of the service's purpose.
//!
//! Wire format (JSON, all binary fields standard base64):
//!
//! ```json
//! {"encryptedData":"...","iv":"...","salt":"...","tag":"...","version":"1.0"}
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CryptoError, VaultError, VaultResult};
use crate::keys::{KeyHandle, KeyLifecycleManager};

use super::encryption::{aead_decrypt, aead_encrypt, random_bytes, random_nonce, NONCE_SIZE, TAG_SIZE};
use super::key_derivation::{derive_key, DerivedKey, MIN_ITERATIONS, SALT_SIZE};
use super::secure_memory::SecureString;

/// Envelope format produced by this build
pub const ENVELOPE_VERSION: &str = "1.0";

const ENVELOPE_FIELDS: [&str; 5] = ["encryptedData", "iv", "salt", "tag", "version"];

/// Serde adapter storing bytes as standard base64 strings
mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// A self-describing encrypted record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedEnvelope {
    #[serde(rename = "encryptedData", with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    #[serde(with = "b64")]
    pub tag: Vec<u8>,
    pub version: String,
}

impl EncryptedEnvelope {
    /// Serialize to the JSON transport form
    pub fn to_json(&self) -> VaultResult<String> {
        serde_json::to_string(self).map_err(|e| {
            VaultError::Encryption(CryptoError::MalformedEnvelope(format!(
                "Failed to serialize envelope: {}",
                e
            )))
        })
    }

    /// Parse the JSON transport form
    pub fn from_json(data: &str) -> VaultResult<Self> {
        serde_json::from_str(data)
            .map_err(|e| VaultError::Decryption(CryptoError::MalformedEnvelope(e.to_string())))
    }

    fn check_sizes(&self) -> Result<(), CryptoError> {
        let checks = [
            ("iv", self.iv.len(), NONCE_SIZE),
            ("salt", self.salt.len(), SALT_SIZE),
            ("tag", self.tag.len(), TAG_SIZE),
        ];
        for (field, actual, expected) in checks {
            if actual != expected {
                return Err(CryptoError::MalformedEnvelope(format!(
                    "{} must be {} bytes, got {}",
                    field, expected, actual
                )));
            }
        }
        Ok(())
    }
}

/// Structural check: does `data` look like a serialized envelope?
///
/// Only field presence is checked; nothing is decoded or decrypted.
pub fn is_encrypted(data: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(serde_json::Value::Object(map)) => ENVELOPE_FIELDS
            .iter()
            .all(|field| map.get(*field).map_or(false, |v| v.is_string())),
        _ => false,
    }
}

/// Lenient check: was `data` written as an envelope, even if now damaged?
///
/// True for a JSON object carrying any binary envelope field, and for text
/// that begins like a serialized envelope but no longer parses. Used to
/// keep damaged envelopes from being mistaken for plaintext.
pub fn looks_like_envelope(data: &str) -> bool {
    let trimmed = data.trim_start();
    if trimmed.starts_with(r#"{"encryptedData""#) {
        return true;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => ENVELOPE_FIELDS[..4]
            .iter()
            .any(|field| map.contains_key(*field)),
        _ => false,
    }
}

/// Encrypts strings into envelopes under the active key of one purpose
pub struct EnvelopeEncryptionService {
    master: SecureString,
    keys: Arc<KeyLifecycleManager>,
    purpose: String,
    iterations: u32,
}

impl EnvelopeEncryptionService {
    pub fn new(
        master: SecureString,
        keys: Arc<KeyLifecycleManager>,
        purpose: impl Into<String>,
        iterations: u32,
    ) -> VaultResult<Self> {
        if iterations < MIN_ITERATIONS {
            return Err(VaultError::Config(format!(
                "PBKDF2 iterations must be at least {}",
                MIN_ITERATIONS
            )));
        }
        if master.is_empty() {
            return Err(VaultError::Config("Master password cannot be empty".into()));
        }

        Ok(Self {
            master,
            keys,
            purpose: purpose.into(),
            iterations,
        })
    }

    /// Key purpose this service encrypts under
    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    /// The key manager consulted for key material
    pub fn key_manager(&self) -> &Arc<KeyLifecycleManager> {
        &self.keys
    }

    /// Encrypt a string into a fresh envelope
    pub fn encrypt(&self, plaintext: &str) -> VaultResult<EncryptedEnvelope> {
        let key = self.active_key()?;

        let salt = random_bytes(SALT_SIZE)?;
        let iv = random_nonce()?;
        let derived = self.derive(&key, &salt)?;

        let (ciphertext, tag) =
            aead_encrypt(&derived, &iv, plaintext.as_bytes()).map_err(VaultError::Encryption)?;

        Ok(EncryptedEnvelope {
            ciphertext,
            iv: iv.to_vec(),
            salt,
            tag: tag.to_vec(),
            version: ENVELOPE_VERSION.to_string(),
        })
    }

    /// Decrypt an envelope back into its string
    ///
    /// Fails with `KeyNotFound` when the purpose has no usable key at all,
    /// and with `Decryption(Authentication)` when no key verifies the tag.
    pub fn decrypt(&self, envelope: &EncryptedEnvelope) -> VaultResult<String> {
        match envelope.version.as_str() {
            ENVELOPE_VERSION => self.decrypt_v1(envelope),
            other => Err(VaultError::Decryption(CryptoError::UnsupportedVersion(
                other.to_string(),
            ))),
        }
    }

    fn decrypt_v1(&self, envelope: &EncryptedEnvelope) -> VaultResult<String> {
        envelope.check_sizes().map_err(VaultError::Decryption)?;

        let candidates = self.keys.decryption_candidates(&self.purpose)?;
        if candidates.is_empty() {
            return Err(VaultError::key_not_found(format!(
                "no decryption key for purpose '{}'",
                self.purpose
            )));
        }

        for key in &candidates {
            let derived = self.derive(key, &envelope.salt).map_err(as_decryption)?;

            match aead_decrypt(&derived, &envelope.iv, &envelope.ciphertext, &envelope.tag) {
                Ok(plaintext) => {
                    tracing::trace!(key_id = key.id(), "envelope decrypted");
                    return String::from_utf8(plaintext).map_err(|_| {
                        VaultError::Decryption(CryptoError::MalformedEnvelope(
                            "plaintext is not valid UTF-8".into(),
                        ))
                    });
                }
                Err(CryptoError::Authentication) => continue,
                Err(e) => return Err(VaultError::Decryption(e)),
            }
        }

        Err(VaultError::Decryption(CryptoError::Authentication))
    }

    /// Encrypt and serialize in one step
    pub fn encrypt_to_string(&self, plaintext: &str) -> VaultResult<String> {
        self.encrypt(plaintext)?.to_json()
    }

    /// Parse and decrypt in one step
    pub fn decrypt_str(&self, data: &str) -> VaultResult<String> {
        self.decrypt(&EncryptedEnvelope::from_json(data)?)
    }

    /// See [`is_encrypted`]
    pub fn is_encrypted(&self, data: &str) -> bool {
        is_encrypted(data)
    }

    /// Switch new encryptions to freshly provisioned key material
    ///
    /// Existing envelopes stay as they are and remain decryptable while the
    /// superseded key is retained.
    pub fn rotate_master_key(&self) -> VaultResult<String> {
        let new_id = match self.keys.get_active_key(&self.purpose)? {
            Some(active) => self.keys.rotate_key(active.id())?,
            None => self.keys.generate_master_key(&self.purpose)?,
        };
        tracing::info!(purpose = %self.purpose, key_id = %new_id, "master key rotated");
        Ok(new_id)
    }

    /// The active key, provisioned on first use
    fn active_key(&self) -> VaultResult<KeyHandle> {
        if let Some(key) = self.keys.get_active_key(&self.purpose)? {
            return Ok(key);
        }

        tracing::info!(purpose = %self.purpose, "no active key, provisioning one");
        self.keys.generate_master_key(&self.purpose)?;
        self.keys
            .get_active_key(&self.purpose)?
            .ok_or_else(|| VaultError::key_not_found(format!("active key for '{}'", self.purpose)))
    }

    fn derive(&self, key: &KeyHandle, salt: &[u8]) -> VaultResult<DerivedKey> {
        let mut password = Zeroizing::new(Vec::with_capacity(
            self.master.len() + key.material().len(),
        ));
        password.extend_from_slice(self.master.as_bytes());
        password.extend_from_slice(key.material());

        derive_key(&password, salt, self.iterations)
    }
}

fn as_decryption(err: VaultError) -> VaultError {
    match err {
        VaultError::Encryption(inner) => VaultError::Decryption(inner),
        other => other,
    }
}
