//! Configuration module for vaultkeep
//!
//! This module provides configuration management including:
//! - Data directory resolution
//! - Settings persistence (key policy, KDF cost, environment)
//! - Master secret loading from the environment

pub mod paths;
pub mod secrets;
pub mod settings;

pub use paths::VaultPaths;
pub use secrets::{master_secret_from_env, resolve_master_secret, MASTER_KEY_ENV};
pub use settings::{Environment, KeyPolicy, Settings, MAX_POLICY_DAYS};
