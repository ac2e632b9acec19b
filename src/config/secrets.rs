//! Master secret resolution
//!
//! The master password is read once at start-up from `VAULTKEEP_MASTER_KEY`.
//! In production its absence is fatal; in development an insecure default is
//! used and a warning is logged.

use super::settings::Environment;
use crate::crypto::SecureString;
use crate::error::{VaultError, VaultResult};

/// Environment variable holding the master password
pub const MASTER_KEY_ENV: &str = "VAULTKEEP_MASTER_KEY";

const INSECURE_DEVELOPMENT_SECRET: &str = "vaultkeep-insecure-development-master-key";

/// Read the master secret from the process environment
pub fn master_secret_from_env(environment: Environment) -> VaultResult<SecureString> {
    resolve_master_secret(std::env::var(MASTER_KEY_ENV).ok(), environment)
}

/// Decide which master secret to use given the raw variable value
pub fn resolve_master_secret(
    value: Option<String>,
    environment: Environment,
) -> VaultResult<SecureString> {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(secret) => Ok(SecureString::new(secret)),
        None if environment.is_production() => Err(VaultError::Config(format!(
            "{} must be set in production",
            MASTER_KEY_ENV
        ))),
        None => {
            tracing::warn!(
                variable = MASTER_KEY_ENV,
                "master key not set; using an INSECURE development default, data is NOT protected"
            );
            Ok(SecureString::new(INSECURE_DEVELOPMENT_SECRET))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_is_used() {
        let secret =
            resolve_master_secret(Some("s3cret".into()), Environment::Production).unwrap();
        assert_eq!(secret.as_str(), "s3cret");
    }

    #[test]
    fn test_missing_in_production_is_fatal() {
        let err = resolve_master_secret(None, Environment::Production).unwrap_err();
        assert!(matches!(err, VaultError::Config(_)));
        assert!(err.to_string().contains(MASTER_KEY_ENV));
    }

    #[test]
    fn test_blank_counts_as_missing() {
        assert!(resolve_master_secret(Some("   ".into()), Environment::Production).is_err());
    }

    #[test]
    fn test_missing_in_development_uses_default() {
        let secret = resolve_master_secret(None, Environment::Development).unwrap();
        assert_eq!(secret.as_str(), INSECURE_DEVELOPMENT_SECRET);
    }
}
