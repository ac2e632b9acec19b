//! vaultkeep - envelope encryption and key lifecycle for key-value storage
//!
//! This library encrypts sensitive values before they are persisted to a
//! key-value store. Values are sealed with AES-256-GCM into versioned JSON
//! envelopes; the AES key of each envelope is derived with PBKDF2 from a
//! master password and the material of a managed, rotating key.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `crypto`: AEAD primitives, key derivation and the envelope service
//! - `keys`: Key lifecycle manager and rotation scheduler
//! - `storage`: Key-value stores and the secure storage facade
//! - `audit`: Audit events and sinks
//! - `config`: Paths, settings and the master secret
//! - `services`: Builds and wires all of the above
//! - `cli`, `display`: Command-line front end
//!
//! # Example
//!
//! ```rust,ignore
//! use vaultkeep::services::VaultServices;
//!
//! let services = VaultServices::open()?;
//! services.storage.set("auth_token", "abc123")?;
//! assert_eq!(services.storage.get("auth_token").as_deref(), Some("abc123"));
//! ```

pub mod audit;
pub mod cli;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod display;
pub mod error;
pub mod keys;
pub mod services;
pub mod storage;

pub use error::{CryptoError, VaultError, VaultResult};
