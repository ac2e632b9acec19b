//! Cryptographic functions for vaultkeep
//!
//! AES-256-GCM authenticated encryption with PBKDF2-HMAC-SHA256 key
//! derivation, wrapped into versioned JSON envelopes.

pub mod encryption;
pub mod envelope;
pub mod key_derivation;
pub mod secure_memory;

pub use encryption::{
    aead_decrypt, aead_encrypt, random_bytes, random_nonce, ALGORITHM, NONCE_SIZE, TAG_SIZE,
};
pub use envelope::{
    is_encrypted, looks_like_envelope, EncryptedEnvelope, EnvelopeEncryptionService,
    ENVELOPE_VERSION,
};
pub use key_derivation::{derive_key, DerivedKey, KDF_HASH, KEY_SIZE, MIN_ITERATIONS, SALT_SIZE};
pub use secure_memory::{SecureBytes, SecureString};
