//! Storage display formatting

use crate::audit::AuditEvent;
use crate::storage::MigrationReport;

/// Summarise a migration or re-encryption pass
pub fn format_migration_report(title: &str, report: &MigrationReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("{}\n", title));
    output.push_str(&format!("{}\n", "=".repeat(title.len())));
    output.push_str(&format!("  Sensitive keys scanned: {}\n", report.scanned));
    output.push_str(&format!("  Rewritten:              {}\n", report.migrated.len()));
    output.push_str(&format!("  Already up to date:     {}\n", report.skipped));
    output.push_str(&format!("  Failed:                 {}\n", report.failed.len()));

    for key in &report.migrated {
        output.push_str(&format!("    + {}\n", key));
    }
    for failure in &report.failed {
        output.push_str(&format!("    ! {}: {}\n", failure.key, failure.error));
    }

    output
}

/// One storage key per line with its classification
pub fn format_key_listing(keys: &[(String, bool)]) -> String {
    if keys.is_empty() {
        return "Store is empty.".to_string();
    }

    let width = keys.iter().map(|(k, _)| k.len()).max().unwrap_or(3).max(3);
    let mut output = String::new();
    for (key, sensitive) in keys {
        output.push_str(&format!(
            "{:<width$}  {}\n",
            key,
            if *sensitive { "encrypted" } else { "plain" },
            width = width,
        ));
    }
    output
}

pub fn format_audit_events(events: &[AuditEvent]) -> String {
    if events.is_empty() {
        return "No audit events recorded.".to_string();
    }

    events
        .iter()
        .map(|event| event.format_human_readable())
        .collect::<Vec<_>>()
        .join("\n")
}
