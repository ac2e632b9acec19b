//! Key display formatting
//!
//! Formats key metadata and health for terminal output.

use chrono::{DateTime, Utc};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::keys::{key_age, CleanupReport, KeyHealthStatus, KeyMetadata, RotationReport};

#[derive(Tabled)]
struct KeyRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Purpose")]
    purpose: String,
    #[tabled(rename = "Ver")]
    version: u32,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Rotation Due")]
    rotation_due: String,
}

/// Format keys as a table
pub fn format_key_list(keys: &[KeyMetadata], now: DateTime<Utc>) -> String {
    if keys.is_empty() {
        return "No keys found.".to_string();
    }

    let rows: Vec<KeyRow> = keys
        .iter()
        .map(|key| KeyRow {
            id: key.id.clone(),
            purpose: key.purpose.clone(),
            version: key.version,
            status: key.status.to_string(),
            age: format!("{}d", key_age(key, now).num_days()),
            rotation_due: if key.is_rotation_due(now) {
                "overdue".to_string()
            } else {
                key.rotation_due.format("%Y-%m-%d").to_string()
            },
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::sharp());
    table.to_string()
}

/// Format a single key's metadata
pub fn format_key_details(key: &KeyMetadata, now: DateTime<Utc>) -> String {
    let mut output = String::new();

    output.push_str(&format!("Key: {}\n", key.id));
    output.push_str(&format!("  Purpose:      {}\n", key.purpose));
    output.push_str(&format!("  Version:      {}\n", key.version));
    output.push_str(&format!("  Status:       {}\n", key.status));
    output.push_str(&format!("  Algorithm:    {}\n", key.algorithm));
    output.push_str(&format!(
        "  Created:      {}\n",
        key.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!(
        "  Last used:    {}\n",
        key.last_used.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!(
        "  Rotation due: {}{}\n",
        key.rotation_due.format("%Y-%m-%d %H:%M:%S UTC"),
        if key.is_rotation_due(now) { " (overdue)" } else { "" }
    ));
    output.push_str(&format!("  Age:          {} days\n", key_age(key, now).num_days()));

    output
}

pub fn format_health(health: &KeyHealthStatus) -> String {
    let mut output = String::new();
    output.push_str("Key Health\n");
    output.push_str("==========\n");
    output.push_str(&format!("  Total:        {}\n", health.total_keys));
    output.push_str(&format!("  Active:       {}\n", health.active_keys));
    output.push_str(&format!("  Deprecated:   {}\n", health.deprecated_keys));
    output.push_str(&format!("  Revoked:      {}\n", health.revoked_keys));
    output.push_str(&format!("  Rotation due: {}\n", health.rotation_due));
    output.push_str(&format!("  Past max age: {}\n", health.old_keys));
    output
}

/// Summarise one rotation and cleanup sweep
pub fn format_sweep(rotation: &RotationReport, cleanup: &CleanupReport) -> String {
    let mut output = String::new();

    if rotation.rotated.is_empty() {
        output.push_str("No keys were due for rotation.\n");
    }
    for rotated in &rotation.rotated {
        output.push_str(&format!(
            "Rotated {} key: {} -> {}\n",
            rotated.purpose, rotated.old_key_id, rotated.new_key_id
        ));
    }
    for failure in &rotation.failed {
        output.push_str(&format!(
            "Rotation failed for {}: {}\n",
            failure.key_id, failure.error
        ));
    }

    for removed in &cleanup.removed {
        output.push_str(&format!("Deleted retired key {}\n", removed));
    }
    for failure in &cleanup.failed {
        output.push_str(&format!(
            "Cleanup failed for {}: {}\n",
            failure.key_id, failure.error
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyFailure, KeyStatus, RotatedKey};
    use chrono::Duration;

    fn key(now: DateTime<Utc>, age_days: i64) -> KeyMetadata {
        let created = now - Duration::days(age_days);
        KeyMetadata {
            id: "key-abc".into(),
            version: 2,
            created_at: created,
            last_used: created,
            rotation_due: created + Duration::days(90),
            algorithm: "AES-256-GCM".into(),
            purpose: "encryption".into(),
            status: KeyStatus::Active,
        }
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(format_key_list(&[], Utc::now()), "No keys found.");
    }

    #[test]
    fn test_list_contains_rows() {
        let now = Utc::now();
        let output = format_key_list(&[key(now, 10)], now);

        assert!(output.contains("key-abc"));
        assert!(output.contains("encryption"));
        assert!(output.contains("active"));
        assert!(output.contains("10d"));
    }

    #[test]
    fn test_overdue_marked() {
        let now = Utc::now();
        assert!(format_key_list(&[key(now, 120)], now).contains("overdue"));
        assert!(format_key_details(&key(now, 120), now).contains("(overdue)"));
        assert!(!format_key_details(&key(now, 1), now).contains("(overdue)"));
    }

    #[test]
    fn test_sweep_summary() {
        let rotation = RotationReport {
            rotated: vec![RotatedKey {
                purpose: "encryption".into(),
                old_key_id: "key-old".into(),
                new_key_id: "key-new".into(),
            }],
            failed: vec![KeyFailure {
                key_id: "key-bad".into(),
                error: "disk full".into(),
            }],
        };
        let output = format_sweep(&rotation, &CleanupReport::default());

        assert!(output.contains("key-old -> key-new"));
        assert!(output.contains("key-bad: disk full"));
    }
}
