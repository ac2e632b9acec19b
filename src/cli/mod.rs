//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the vault services.

pub mod config;
pub mod keys;
pub mod store;

pub use config::{handle_audit_command, handle_config_command, ConfigCommands};
pub use keys::{handle_key_command, KeyCommands};
pub use store::{handle_store_command, StoreCommands};
