//! Settings for vaultkeep
//!
//! Key lifecycle policy, key derivation cost, runtime environment and
//! classification overrides, persisted as `config.json`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::paths::VaultPaths;
use crate::crypto::MIN_ITERATIONS;
use crate::error::VaultError;

/// Which kind of build/deployment we are running in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Missing secrets are fatal
    Production,
    /// Missing secrets fall back to an insecure default with a warning
    #[default]
    Development,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            other => Err(VaultError::Config(format!("Unknown environment: {}", other))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
        }
    }
}

/// Upper bound for policy day counts, roughly a hundred years
pub const MAX_POLICY_DAYS: i64 = 36_500;

/// Key rotation and retention policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPolicy {
    /// Days between a key's creation and its scheduled rotation
    pub rotation_interval_days: i64,
    /// Retired keys older than this many days are deleted by cleanup
    pub max_key_age_days: i64,
}

impl KeyPolicy {
    /// Both day counts must lie in `1..=MAX_POLICY_DAYS`
    pub fn validate(&self) -> Result<(), VaultError> {
        let fields = [
            ("rotation_interval_days", self.rotation_interval_days),
            ("max_key_age_days", self.max_key_age_days),
        ];
        for (name, days) in fields {
            if !(1..=MAX_POLICY_DAYS).contains(&days) {
                return Err(VaultError::Config(format!(
                    "{} must be between 1 and {}, got {}",
                    name, MAX_POLICY_DAYS, days
                )));
            }
        }
        Ok(())
    }
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            rotation_interval_days: 90,
            max_key_age_days: 365,
        }
    }
}

/// User settings for vaultkeep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Runtime environment; `VAULTKEEP_ENV` overrides it
    #[serde(default)]
    pub environment: Environment,

    /// Key rotation and retention policy
    #[serde(default)]
    pub key_policy: KeyPolicy,

    /// PBKDF2 iterations per envelope
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Purpose of the key used by the storage facade
    #[serde(default = "default_purpose")]
    pub default_purpose: String,

    /// Extra sensitive-key patterns on top of the built-in set
    #[serde(default)]
    pub sensitive_patterns: Vec<String>,

    /// Seconds between background rotation sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_schema_version() -> u32 {
    1
}

fn default_kdf_iterations() -> u32 {
    MIN_ITERATIONS
}

fn default_purpose() -> String {
    "encryption".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            environment: Environment::default(),
            key_policy: KeyPolicy::default(),
            kdf_iterations: default_kdf_iterations(),
            default_purpose: default_purpose(),
            sensitive_patterns: Vec::new(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &VaultPaths) -> Result<Self, VaultError> {
        let settings_path = paths.settings_file();

        let settings = if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| VaultError::Io(format!("Failed to read settings file: {}", e)))?;

            serde_json::from_str(&contents)
                .map_err(|e| VaultError::Config(format!("Failed to parse settings file: {}", e)))?
        } else {
            // Don't save yet - let caller decide when to persist
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self, paths: &VaultPaths) -> Result<(), VaultError> {
        paths.ensure_directories()?;

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| VaultError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(paths.settings_file(), contents)
            .map_err(|e| VaultError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }

    /// Apply `VAULTKEEP_ENV` if set
    pub fn with_env_overrides(mut self) -> Result<Self, VaultError> {
        if let Ok(env) = std::env::var("VAULTKEEP_ENV") {
            self.environment = env.parse()?;
        }
        Ok(self)
    }

    /// Reject settings that would weaken or break the key lifecycle
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.kdf_iterations < MIN_ITERATIONS {
            return Err(VaultError::Config(format!(
                "kdf_iterations must be at least {}",
                MIN_ITERATIONS
            )));
        }
        self.key_policy.validate()?;
        if self.default_purpose.trim().is_empty() {
            return Err(VaultError::Config("default_purpose cannot be empty".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(VaultError::Config("sweep_interval_secs must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.environment, Environment::Development);
        assert_eq!(settings.key_policy.rotation_interval_days, 90);
        assert_eq!(settings.key_policy.max_key_age_days, 365);
        assert_eq!(settings.kdf_iterations, 100_000);
        assert_eq!(settings.default_purpose, "encryption");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());

        let mut settings = Settings::default();
        settings.environment = Environment::Production;
        settings.key_policy.rotation_interval_days = 30;
        settings.sensitive_patterns.push("*iban*".into());

        settings.save(&paths).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.environment, Environment::Production);
        assert_eq!(loaded.key_policy.rotation_interval_days, 30);
        assert_eq!(loaded.sensitive_patterns, vec!["*iban*"]);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"environment": "production"}"#).unwrap();
        assert_eq!(settings.environment, Environment::Production);
        assert_eq!(settings.kdf_iterations, 100_000);
        assert_eq!(settings.key_policy, KeyPolicy::default());
    }

    #[test]
    fn test_weak_iterations_rejected() {
        let settings = Settings {
            kdf_iterations: 10_000,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_policy_days_are_bounded() {
        let mut settings = Settings::default();
        settings.key_policy.rotation_interval_days = 200_000_000;
        assert!(matches!(settings.validate(), Err(VaultError::Config(_))));

        settings.key_policy.rotation_interval_days = MAX_POLICY_DAYS;
        assert!(settings.validate().is_ok());

        settings.key_policy.max_key_age_days = 0;
        assert!(matches!(settings.validate(), Err(VaultError::Config(_))));

        settings.key_policy.max_key_age_days = MAX_POLICY_DAYS + 1;
        assert!(matches!(settings.validate(), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!(
            "Development".parse::<Environment>().unwrap(),
            Environment::Development
        );
        assert!("staging".parse::<Environment>().is_err());
    }
}
