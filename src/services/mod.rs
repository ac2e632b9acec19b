//! Service container for vaultkeep
//!
//! Builds the key manager, envelope encryption service, secure storage and
//! rotation scheduler once, wired to the files under one data directory, and
//! hands them out behind `Arc` so they can be shared across threads.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::audit::AuditLogger;
use crate::clock::{Clock, SystemClock};
use crate::config::{master_secret_from_env, Settings, VaultPaths};
use crate::crypto::{EnvelopeEncryptionService, SecureString};
use crate::error::{VaultError, VaultResult};
use crate::keys::{KeyLifecycleManager, RotationScheduler};
use crate::storage::{FileStore, KeyValueStore, SecureStorage, SensitiveKeySet};

/// Every long-lived service of one vault
pub struct VaultServices {
    pub paths: VaultPaths,
    pub settings: Settings,
    pub audit: Arc<AuditLogger>,
    pub keys: Arc<KeyLifecycleManager>,
    pub encryption: Arc<EnvelopeEncryptionService>,
    pub storage: Arc<SecureStorage>,
    pub scheduler: Arc<RotationScheduler>,
}

impl VaultServices {
    /// Resolve paths, settings and the master secret from the environment
    pub fn open() -> VaultResult<Self> {
        let paths = VaultPaths::new()?;
        Self::open_at(paths)
    }

    /// Like [`open`](Self::open) with an explicit data directory
    pub fn open_at(paths: VaultPaths) -> VaultResult<Self> {
        let settings = Settings::load_or_create(&paths)?.with_env_overrides()?;
        let master = master_secret_from_env(settings.environment)?;
        Self::build(paths, settings, master, Arc::new(SystemClock))
    }

    /// Wire all services together
    pub fn build(
        paths: VaultPaths,
        settings: Settings,
        master: SecureString,
        clock: Arc<dyn Clock>,
    ) -> VaultResult<Self> {
        settings.validate()?;
        paths.ensure_directories()?;

        let audit = Arc::new(AuditLogger::new(paths.audit_log()));

        let registry: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(paths.keys_file())?);
        let keys = Arc::new(KeyLifecycleManager::load(
            registry,
            clock,
            audit.clone(),
            settings.key_policy.clone(),
        )?);

        let encryption = Arc::new(EnvelopeEncryptionService::new(
            master,
            keys.clone(),
            settings.default_purpose.clone(),
            settings.kdf_iterations,
        )?);

        let mut sensitive = SensitiveKeySet::with_defaults();
        for pattern in &settings.sensitive_patterns {
            sensitive.add(pattern)?;
        }

        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(paths.store_file())?);
        let storage = Arc::new(
            SecureStorage::new(store, encryption.clone(), audit.clone())
                .with_sensitive_keys(sensitive),
        );

        let scheduler = Arc::new(RotationScheduler::new(keys.clone()));

        tracing::debug!(
            base_dir = %paths.base_dir().display(),
            environment = %settings.environment,
            keys = keys.list_keys().len(),
            "vault services ready"
        );

        Ok(Self {
            paths,
            settings,
            audit,
            keys,
            encryption,
            storage,
            scheduler,
        })
    }

    /// Start periodic rotation sweeps on the current tokio runtime
    pub fn start_background_sweeps(&self) -> JoinHandle<()> {
        Arc::clone(&self.scheduler).spawn(Duration::from_secs(self.settings.sweep_interval_secs))
    }

    /// Run sweeps until the task ends; it only ends by panic or cancellation
    pub async fn run_background_sweeps(&self) -> VaultResult<()> {
        supervise_sweeps(self.start_background_sweeps()).await
    }
}

async fn supervise_sweeps(task: JoinHandle<()>) -> VaultResult<()> {
    task.await.map_err(|e| {
        tracing::error!(error = %e, "key sweep task stopped");
        VaultError::from(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tempfile::TempDir;

    fn build(dir: &TempDir, settings: Settings) -> VaultResult<VaultServices> {
        VaultServices::build(
            VaultPaths::with_base_dir(dir.path().to_path_buf()),
            settings,
            SecureString::new("test-master"),
            Arc::new(ManualClock::starting_now()),
        )
    }

    #[test]
    fn test_build_and_round_trip() {
        let dir = TempDir::new().unwrap();
        let services = build(&dir, Settings::default()).unwrap();

        services.storage.set("auth_token", "abc").unwrap();
        assert_eq!(services.storage.get("auth_token").as_deref(), Some("abc"));
        assert!(dir.path().join("store.json").exists());
        assert!(dir.path().join("keys.json").exists());
    }

    #[test]
    fn test_state_survives_rebuild() {
        let dir = TempDir::new().unwrap();
        {
            let services = build(&dir, Settings::default()).unwrap();
            services.storage.set("auth_token", "abc").unwrap();
        }

        let services = build(&dir, Settings::default()).unwrap();
        assert_eq!(services.keys.list_keys().len(), 1);
        assert_eq!(services.storage.get("auth_token").as_deref(), Some("abc"));
    }

    #[test]
    fn test_configured_patterns_are_applied() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            sensitive_patterns: vec!["*email*".into()],
            ..Settings::default()
        };
        let services = build(&dir, settings).unwrap();
        assert!(services.storage.is_sensitive("contact_email"));
    }

    #[tokio::test]
    async fn test_stopped_sweep_task_is_an_error() {
        let task = tokio::spawn(std::future::pending::<()>());
        task.abort();

        let err = supervise_sweeps(task).await.unwrap_err();
        assert!(matches!(err, VaultError::Task(_)));
    }

    #[test]
    fn test_out_of_range_policy_rejected() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.key_policy.rotation_interval_days = 200_000_000;
        assert!(matches!(build(&dir, settings), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            kdf_iterations: 1,
            ..Settings::default()
        };
        assert!(build(&dir, settings).is_err());
    }
}
