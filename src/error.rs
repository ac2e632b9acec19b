//! Custom error types for vaultkeep
//!
//! This module defines the error hierarchy for the library using thiserror.
//! Low-level cryptographic failures are described by [`CryptoError`] and are
//! wrapped by [`VaultError::Encryption`] or [`VaultError::Decryption`] at the
//! envelope layer so callers can tell which direction failed.

use thiserror::Error;

/// Failures raised by the cryptographic primitives and envelope codec
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD tag verification failed: data was tampered with or the key is wrong
    #[error("authentication failed: data tampered or wrong key")]
    Authentication,

    /// Envelope carries a version this build does not understand
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(String),

    /// Envelope is structurally invalid (bad base64, wrong field sizes, ...)
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Key derivation rejected its inputs
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// The operating system random source is unavailable
    #[error("secure random source unavailable: {0}")]
    RandomSource(String),

    /// Cipher construction or encryption failure
    #[error("cipher failure: {0}")]
    Cipher(String),
}

/// The main error type for vaultkeep operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Validation errors (bad arguments, illegal state transitions)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A key id or purpose has no key behind it
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Encrypting a value failed
    #[error("Encryption error: {0}")]
    Encryption(#[source] CryptoError),

    /// Decrypting a value failed
    #[error("Decryption error: {0}")]
    Decryption(#[source] CryptoError),

    /// The underlying key-value store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl VaultError {
    /// Create a "key not found" error for a key id
    pub fn key_not_found(key_id: impl Into<String>) -> Self {
        Self::KeyNotFound(key_id.into())
    }

    /// Create a storage error from a poisoned lock
    pub fn lock_poisoned(what: &str) -> Self {
        Self::Storage(format!("Failed to acquire {} lock: poisoned", what))
    }

    /// Check if this is a "key not found" error
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }

    /// Check if this error means the data was tampered with or the key is wrong
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::Decryption(CryptoError::Authentication)
                | Self::Encryption(CryptoError::Authentication)
        )
    }

    /// Check if this error comes from an unknown envelope version
    pub fn is_unsupported_version(&self) -> bool {
        matches!(self, Self::Decryption(CryptoError::UnsupportedVersion(_)))
    }

    /// Check if this is a storage error
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Result type alias for vaultkeep operations
pub type VaultResult<T> = Result<T, VaultError>;
