//! Storage layer for vaultkeep
//!
//! - [`KeyValueStore`] implementations: in-memory and a single JSON file
//!   written atomically.
//! - [`SecureStorage`]: the facade that encrypts sensitive values before they
//!   reach a store.
//! - Sensitive key classification, stored format detection and transient
//!   value expiry used by the facade.

pub mod classify;
pub mod expiry;
pub mod facade;
pub mod file_store;
pub mod formats;
pub mod store;

pub use classify::{SensitiveKeySet, DEFAULT_SENSITIVE_KEYS, DEFAULT_SENSITIVE_PATTERNS};
pub use facade::{Classification, MigrationFailure, MigrationReport, ReadOutcome, SecureStorage};
pub use file_store::FileStore;
pub use formats::{
    EnvelopeFormat, FormatChain, FormatDetector, LegacyBase64Format, PlaintextFormat,
    StoredFormat, LEGACY_PREFIX,
};
pub use store::{KeyValueStore, MemoryStore};
