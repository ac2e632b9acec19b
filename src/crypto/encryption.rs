//! AES-256-GCM encryption/decryption and secure randomness
//!
//! Thin wrappers over `aes-gcm` that keep the 16-byte authentication tag
//! detached from the ciphertext, as the envelope format stores them in
//! separate fields.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{AeadInPlace, KeyInit, OsRng},
    Aes256Gcm, Nonce, Tag,
};
use zeroize::Zeroizing;

use crate::error::{CryptoError, VaultError, VaultResult};

use super::DerivedKey;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Name recorded in key metadata for this cipher
pub const ALGORITHM: &str = "AES-256-GCM";

/// Fill a fresh buffer with `n` bytes from the operating system CSPRNG
///
/// There is no fallback generator: if the OS source fails, so does this.
pub fn random_bytes(n: usize) -> VaultResult<Vec<u8>> {
    let mut buf = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| VaultError::Encryption(CryptoError::RandomSource(e.to_string())))?;
    Ok(buf)
}

/// Generate a random AES-GCM nonce
pub fn random_nonce() -> VaultResult<[u8; NONCE_SIZE]> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| VaultError::Encryption(CryptoError::RandomSource(e.to_string())))?;
    Ok(nonce)
}

/// Encrypt plaintext, returning the ciphertext and its detached tag
pub fn aead_encrypt(
    key: &DerivedKey,
    iv: &[u8; NONCE_SIZE],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; TAG_SIZE]), CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Cipher(format!("Failed to create cipher: {}", e)))?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(iv), b"", &mut buffer)
        .map_err(|e| CryptoError::Cipher(format!("Encryption failed: {}", e)))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok((buffer, tag_bytes))
}

/// Decrypt ciphertext after verifying its detached tag
///
/// On tag mismatch nothing is returned and the working buffer is wiped.
pub fn aead_decrypt(
    key: &DerivedKey,
    iv: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if iv.len() != NONCE_SIZE {
        return Err(CryptoError::MalformedEnvelope(format!(
            "Invalid iv size: expected {}, got {}",
            NONCE_SIZE,
            iv.len()
        )));
    }
    if tag.len() != TAG_SIZE {
        return Err(CryptoError::MalformedEnvelope(format!(
            "Invalid tag size: expected {}, got {}",
            TAG_SIZE,
            tag.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Cipher(format!("Failed to create cipher: {}", e)))?;

    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(iv),
            b"",
            &mut *buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| CryptoError::Authentication)?;

    Ok(std::mem::take(&mut *buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_derivation::{derive_key, MIN_ITERATIONS, SALT_SIZE};

    fn test_key(password: &[u8]) -> DerivedKey {
        derive_key(password, &[3u8; SALT_SIZE], MIN_ITERATIONS).unwrap()
    }

    #[test]
    fn test_random_bytes_length_and_freshness() {
        let a = random_bytes(32).unwrap();
        let b = random_bytes(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert!(random_bytes(0).unwrap().is_empty());
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = test_key(b"pw");
        let iv = random_nonce().unwrap();
        let plaintext = b"Hello, World!";

        let (ciphertext, tag) = aead_encrypt(&key, &iv, plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len());
        assert_ne!(ciphertext.as_slice(), plaintext);

        let decrypted = aead_decrypt(&key, &iv, &ciphertext, &tag).unwrap();
        assert_eq!(decrypted.as_slice(), plaintext);
    }

    #[test]
    fn test_empty_plaintext() {
        let key = test_key(b"pw");
        let iv = random_nonce().unwrap();

        let (ciphertext, tag) = aead_encrypt(&key, &iv, b"").unwrap();
        assert!(ciphertext.is_empty());
        assert!(aead_decrypt(&key, &iv, &ciphertext, &tag).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = test_key(b"first");
        let key2 = test_key(b"second");
        let iv = random_nonce().unwrap();

        let (ciphertext, tag) = aead_encrypt(&key1, &iv, b"secret").unwrap();
        let result = aead_decrypt(&key2, &iv, &ciphertext, &tag);
        assert_eq!(result, Err(CryptoError::Authentication));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = test_key(b"pw");
        let iv = random_nonce().unwrap();

        let (mut ciphertext, tag) = aead_encrypt(&key, &iv, b"Hello, World!").unwrap();
        ciphertext[0] ^= 0x01;

        assert_eq!(
            aead_decrypt(&key, &iv, &ciphertext, &tag),
            Err(CryptoError::Authentication)
        );
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = test_key(b"pw");
        let iv = random_nonce().unwrap();

        let (ciphertext, mut tag) = aead_encrypt(&key, &iv, b"Hello, World!").unwrap();
        tag[TAG_SIZE - 1] ^= 0x80;

        assert_eq!(
            aead_decrypt(&key, &iv, &ciphertext, &tag),
            Err(CryptoError::Authentication)
        );
    }

    #[test]
    fn test_bad_sizes_are_malformed() {
        let key = test_key(b"pw");
        assert!(matches!(
            aead_decrypt(&key, &[0u8; 8], b"x", &[0u8; TAG_SIZE]),
            Err(CryptoError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            aead_decrypt(&key, &[0u8; NONCE_SIZE], b"x", &[0u8; 4]),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }
}
