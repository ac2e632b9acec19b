//! Display formatting for terminal output
//!
//! Formats keys, sweep results, migration reports and audit events for the
//! command-line front end.

pub mod keys;
pub mod storage;

pub use keys::{format_health, format_key_details, format_key_list, format_sweep};
pub use storage::{format_audit_events, format_key_listing, format_migration_report};
