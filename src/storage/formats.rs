//! Stored value formats
//!
//! A value found under a sensitive key may have been written by any
//! generation of the storage layer. [`FormatChain`] asks each
//! [`FormatDetector`] in order whether it claims the raw value; the first
//! claimant decodes it. Formats are tried newest first and plaintext last.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::crypto::{looks_like_envelope, EnvelopeEncryptionService};
use crate::error::{CryptoError, VaultError, VaultResult};

/// Marker prefix of the legacy base64 encoding
pub const LEGACY_PREFIX: &str = "b64:";

/// Which generation of the storage layer wrote a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoredFormat {
    /// Current authenticated envelope
    Envelope,
    /// `b64:` prefixed base64, obfuscation only
    LegacyBase64,
    /// Written before encryption was enabled for the key
    Plaintext,
}

impl std::fmt::Display for StoredFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoredFormat::Envelope => write!(f, "envelope"),
            StoredFormat::LegacyBase64 => write!(f, "legacy-base64"),
            StoredFormat::Plaintext => write!(f, "plaintext"),
        }
    }
}

/// One recognisable stored format
pub trait FormatDetector: Send + Sync {
    fn format(&self) -> StoredFormat;

    /// Structural check; must not decrypt
    fn claims(&self, raw: &str) -> bool;

    /// Recover the plaintext of a value this detector claims
    fn decode(&self, raw: &str, crypto: &EnvelopeEncryptionService) -> VaultResult<String>;
}

/// The current envelope format
///
/// Claims damaged envelopes too, so they decode to an error instead of
/// falling through to plaintext.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeFormat;

impl FormatDetector for EnvelopeFormat {
    fn format(&self) -> StoredFormat {
        StoredFormat::Envelope
    }

    fn claims(&self, raw: &str) -> bool {
        looks_like_envelope(raw)
    }

    fn decode(&self, raw: &str, crypto: &EnvelopeEncryptionService) -> VaultResult<String> {
        crypto.decrypt_str(raw)
    }
}

/// `b64:` followed by the base64 of the UTF-8 plaintext
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyBase64Format;

impl LegacyBase64Format {
    /// Produce a legacy value; only used to fabricate old data
    pub fn encode(plaintext: &str) -> String {
        format!("{}{}", LEGACY_PREFIX, STANDARD.encode(plaintext.as_bytes()))
    }
}

impl FormatDetector for LegacyBase64Format {
    fn format(&self) -> StoredFormat {
        StoredFormat::LegacyBase64
    }

    fn claims(&self, raw: &str) -> bool {
        raw.starts_with(LEGACY_PREFIX)
    }

    fn decode(&self, raw: &str, _crypto: &EnvelopeEncryptionService) -> VaultResult<String> {
        let encoded = raw.strip_prefix(LEGACY_PREFIX).unwrap_or(raw);
        let bytes = STANDARD.decode(encoded).map_err(|e| {
            VaultError::Decryption(CryptoError::MalformedEnvelope(format!(
                "legacy value is not base64: {}",
                e
            )))
        })?;
        String::from_utf8(bytes).map_err(|_| {
            VaultError::Decryption(CryptoError::MalformedEnvelope(
                "legacy value is not UTF-8".into(),
            ))
        })
    }
}

/// Anything else is taken verbatim
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextFormat;

impl FormatDetector for PlaintextFormat {
    fn format(&self) -> StoredFormat {
        StoredFormat::Plaintext
    }

    fn claims(&self, _raw: &str) -> bool {
        true
    }

    fn decode(&self, raw: &str, _crypto: &EnvelopeEncryptionService) -> VaultResult<String> {
        Ok(raw.to_string())
    }
}

/// Ordered list of detectors
pub struct FormatChain {
    detectors: Vec<Box<dyn FormatDetector>>,
}

impl FormatChain {
    pub fn new(detectors: Vec<Box<dyn FormatDetector>>) -> Self {
        Self { detectors }
    }

    /// Envelope, then legacy base64, then plaintext
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(EnvelopeFormat),
            Box::new(LegacyBase64Format),
            Box::new(PlaintextFormat),
        ])
    }

    /// Format of the first detector claiming `raw`
    pub fn detect(&self, raw: &str) -> Option<StoredFormat> {
        self.claimant(raw).map(|d| d.format())
    }

    /// Decode `raw` with the first detector claiming it
    pub fn decode(
        &self,
        raw: &str,
        crypto: &EnvelopeEncryptionService,
    ) -> VaultResult<(StoredFormat, String)> {
        let detector = self.claimant(raw).ok_or_else(|| {
            VaultError::Decryption(CryptoError::MalformedEnvelope(
                "no format recognises the stored value".into(),
            ))
        })?;
        let plaintext = detector.decode(raw, crypto)?;
        Ok((detector.format(), plaintext))
    }

    fn claimant(&self, raw: &str) -> Option<&dyn FormatDetector> {
        self.detectors
            .iter()
            .find(|d| d.claims(raw))
            .map(|d| d.as_ref())
    }
}

impl Default for FormatChain {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::audit::NoopAuditSink;
    use crate::clock::SystemClock;
    use crate::config::KeyPolicy;
    use crate::crypto::{SecureString, MIN_ITERATIONS};
    use crate::keys::KeyLifecycleManager;
    use crate::storage::MemoryStore;

    fn crypto() -> EnvelopeEncryptionService {
        let keys = Arc::new(KeyLifecycleManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            Arc::new(NoopAuditSink),
            KeyPolicy::default(),
        ));
        EnvelopeEncryptionService::new(SecureString::new("pw"), keys, "encryption", MIN_ITERATIONS)
            .unwrap()
    }

    #[test]
    fn test_detect_order() {
        let chain = FormatChain::standard();
        let crypto = crypto();
        let envelope = crypto.encrypt_to_string("x").unwrap();

        assert_eq!(chain.detect(&envelope), Some(StoredFormat::Envelope));
        assert_eq!(
            chain.detect(&LegacyBase64Format::encode("x")),
            Some(StoredFormat::LegacyBase64)
        );
        assert_eq!(chain.detect("hello"), Some(StoredFormat::Plaintext));
        assert_eq!(chain.detect(""), Some(StoredFormat::Plaintext));
    }

    #[test]
    fn test_decode_each_format() {
        let chain = FormatChain::standard();
        let crypto = crypto();

        let envelope = crypto.encrypt_to_string("from envelope").unwrap();
        assert_eq!(
            chain.decode(&envelope, &crypto).unwrap(),
            (StoredFormat::Envelope, "from envelope".to_string())
        );

        let legacy = LegacyBase64Format::encode("from legacy");
        assert_eq!(
            chain.decode(&legacy, &crypto).unwrap(),
            (StoredFormat::LegacyBase64, "from legacy".to_string())
        );

        assert_eq!(
            chain.decode("from plaintext", &crypto).unwrap(),
            (StoredFormat::Plaintext, "from plaintext".to_string())
        );
    }

    #[test]
    fn test_claimed_but_broken_legacy_is_an_error() {
        let chain = FormatChain::standard();
        let err = chain.decode("b64:!!!not base64!!!", &crypto()).unwrap_err();
        assert!(matches!(
            err,
            VaultError::Decryption(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_tampered_envelope_is_not_plaintext() {
        let chain = FormatChain::standard();
        let crypto = crypto();
        let mut envelope = crypto.encrypt("x").unwrap();
        envelope.tag[0] ^= 0x01;
        let raw = envelope.to_json().unwrap();

        assert!(chain.decode(&raw, &crypto).unwrap_err().is_authentication_failure());
    }

    #[test]
    fn test_damaged_envelope_is_not_plaintext() {
        let chain = FormatChain::standard();
        let crypto = crypto();
        let raw = crypto.encrypt_to_string("x").unwrap();

        let truncated = &raw[..raw.len() - 5];
        assert_eq!(chain.detect(truncated), Some(StoredFormat::Envelope));
        assert!(chain.decode(truncated, &crypto).is_err());

        let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value.as_object_mut().unwrap().remove("tag");
        let missing_tag = value.to_string();
        assert_eq!(chain.detect(&missing_tag), Some(StoredFormat::Envelope));
        assert!(matches!(
            chain.decode(&missing_tag, &crypto).unwrap_err(),
            VaultError::Decryption(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_retired_format_falls_through() {
        let chain = FormatChain::new(vec![Box::new(EnvelopeFormat), Box::new(PlaintextFormat)]);
        let legacy = LegacyBase64Format::encode("x");
        assert_eq!(chain.detect(&legacy), Some(StoredFormat::Plaintext));
    }

    #[test]
    fn test_empty_chain_claims_nothing() {
        let chain = FormatChain::new(Vec::new());
        assert_eq!(chain.detect("x"), None);
        assert!(chain.decode("x", &crypto()).is_err());
    }
}
