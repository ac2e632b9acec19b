//! Key rotation across the whole vault, driven by a manual clock

use std::sync::Arc;

use chrono::Duration;
use tempfile::TempDir;

use vaultkeep::clock::ManualClock;
use vaultkeep::config::{Settings, VaultPaths};
use vaultkeep::crypto::SecureString;
use vaultkeep::keys::KeyStatus;
use vaultkeep::services::VaultServices;

fn open(dir: &TempDir, clock: Arc<ManualClock>) -> VaultServices {
    VaultServices::build(
        VaultPaths::with_base_dir(dir.path().to_path_buf()),
        Settings::default(),
        SecureString::new("integration-master"),
        clock,
    )
    .unwrap()
}

#[test]
fn scheduled_rotation_keeps_data_readable() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let vault = open(&dir, clock.clone());

    vault.storage.set("auth_token", "tok-1").unwrap();
    let first = vault.keys.list_keys();
    assert_eq!(first.len(), 1);
    let first_id = first[0].id.clone();

    // nothing due yet
    let report = vault.scheduler.run_sweep().unwrap();
    assert!(report.rotation.rotated.is_empty());

    clock.advance(Duration::days(91));
    assert!(vault.keys.is_rotation_due(&first_id));

    let report = vault.scheduler.run_sweep().unwrap();
    assert_eq!(report.rotation.rotated.len(), 1);
    assert_eq!(report.rotation.rotated[0].old_key_id, first_id);
    assert_eq!(
        vault.keys.key_metadata(&first_id).unwrap().status,
        KeyStatus::Deprecated
    );

    // a second sweep right away is a no-op
    let again = vault.scheduler.run_sweep().unwrap();
    assert!(again.rotation.rotated.is_empty());
    assert!(again.cleanup.removed.is_empty());

    // old envelope still decrypts through the deprecated key
    assert_eq!(vault.storage.get("auth_token").as_deref(), Some("tok-1"));

    let health = vault.keys.get_key_health_status();
    assert_eq!(health.active_keys, 1);
    assert_eq!(health.deprecated_keys, 1);
    assert_eq!(health.rotation_due, 0);
}

#[test]
fn cleanup_after_reencryption_retires_the_old_key() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let vault = open(&dir, clock.clone());

    vault.storage.set("refresh_token", "tok-2").unwrap();
    let first_id = vault.keys.list_keys()[0].id.clone();

    clock.advance(Duration::days(91));
    vault.scheduler.run_sweep().unwrap();

    let report = vault.storage.reencrypt_sensitive_data().unwrap();
    assert_eq!(report.migrated, vec!["refresh_token"]);

    // day 366: the first key is past the maximum age
    clock.advance(Duration::days(275));
    let sweep = vault.scheduler.run_sweep().unwrap();
    assert_eq!(sweep.cleanup.removed, vec![first_id.clone()]);
    assert!(vault.keys.key_metadata(&first_id).is_none());

    assert_eq!(vault.storage.get("refresh_token").as_deref(), Some("tok-2"));
}

#[test]
fn registry_survives_restart() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::starting_now());

    let rotated_to = {
        let vault = open(&dir, clock.clone());
        vault.storage.set("api_key", "k-123").unwrap();
        vault.encryption.rotate_master_key().unwrap()
    };

    let vault = open(&dir, clock);
    let active = vault.keys.get_active_key("encryption").unwrap().unwrap();
    assert_eq!(active.id(), rotated_to);
    assert_eq!(active.version(), 2);
    assert_eq!(vault.storage.get("api_key").as_deref(), Some("k-123"));
}

#[test]
fn one_active_key_per_purpose() {
    let dir = TempDir::new().unwrap();
    let vault = open(&dir, Arc::new(ManualClock::starting_now()));

    let mut last = vault.keys.generate_master_key("signing").unwrap();
    for _ in 0..3 {
        last = vault.keys.rotate_key(&last).unwrap();
        vault.keys.generate_master_key("signing").unwrap();
        last = vault.keys.get_active_key("signing").unwrap().unwrap().id().to_string();
    }

    let active: Vec<_> = vault
        .keys
        .list_keys()
        .into_iter()
        .filter(|k| k.purpose == "signing" && k.status == KeyStatus::Active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, last);
    assert_eq!(active[0].version, 7);
}
