//! Key derivation using PBKDF2-HMAC-SHA256
//!
//! Derives AES-256 keys from a password and a per-envelope salt. The same
//! (password, salt, iterations) always yields the same key; a different salt
//! yields an unrelated key.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, VaultError, VaultResult};

/// Size of a derived AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the salt mixed into every derivation
pub const SALT_SIZE: usize = 32;

/// Lowest iteration count accepted by [`derive_key`]
pub const MIN_ITERATIONS: u32 = 100_000;

/// Hash function name recorded alongside derivation parameters
pub const KDF_HASH: &str = "SHA-256";

/// A derived encryption key
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    /// The 32-byte key for AES-256
    key: [u8; KEY_SIZE],
}

impl DerivedKey {
    /// Wrap raw key bytes
    pub fn from_bytes(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Derive an encryption key from a password and salt
pub fn derive_key(password: &[u8], salt: &[u8], iterations: u32) -> VaultResult<DerivedKey> {
    if iterations < MIN_ITERATIONS {
        return Err(VaultError::Encryption(CryptoError::KeyDerivation(format!(
            "iteration count {} is below the minimum of {}",
            iterations, MIN_ITERATIONS
        ))));
    }

    if salt.len() != SALT_SIZE {
        return Err(VaultError::Encryption(CryptoError::KeyDerivation(format!(
            "salt must be {} bytes, got {}",
            SALT_SIZE,
            salt.len()
        ))));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key);

    Ok(DerivedKey { key })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT_A: [u8; SALT_SIZE] = [7u8; SALT_SIZE];
    const SALT_B: [u8; SALT_SIZE] = [9u8; SALT_SIZE];

    #[test]
    fn test_derive_key() {
        let key = derive_key(b"test_password", &SALT_A, MIN_ITERATIONS).unwrap();
        assert_eq!(key.as_bytes().len(), KEY_SIZE);
    }

    #[test]
    fn test_same_password_same_key() {
        let key1 = derive_key(b"test_password", &SALT_A, MIN_ITERATIONS).unwrap();
        let key2 = derive_key(b"test_password", &SALT_A, MIN_ITERATIONS).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_password_different_key() {
        let key1 = derive_key(b"password1", &SALT_A, MIN_ITERATIONS).unwrap();
        let key2 = derive_key(b"password2", &SALT_A, MIN_ITERATIONS).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_salt_different_key() {
        let key1 = derive_key(b"same_password", &SALT_A, MIN_ITERATIONS).unwrap();
        let key2 = derive_key(b"same_password", &SALT_B, MIN_ITERATIONS).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_low_iteration_count_rejected() {
        let result = derive_key(b"password", &SALT_A, 1_000);
        assert!(matches!(
            result,
            Err(VaultError::Encryption(CryptoError::KeyDerivation(_)))
        ));
    }

    #[test]
    fn test_short_salt_rejected() {
        let result = derive_key(b"password", &[1u8; 16], MIN_ITERATIONS);
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = DerivedKey::from_bytes([0x42; KEY_SIZE]);
        assert_eq!(format!("{:?}", key), "DerivedKey([REDACTED])");
    }
}
