//! Store CLI commands
//!
//! Read and write values through the secure storage facade.

use clap::Subcommand;

use crate::display::{format_key_listing, format_migration_report};
use crate::error::{VaultError, VaultResult};
use crate::services::VaultServices;
use crate::storage::{Classification, ReadOutcome};

/// Store subcommands
#[derive(Subcommand)]
pub enum StoreCommands {
    /// Store a value (encrypted when the key is sensitive)
    Set {
        key: String,
        value: String,
        /// Encrypt regardless of the key name
        #[arg(long, conflicts_with = "plain")]
        sensitive: bool,
        /// Never encrypt
        #[arg(long)]
        plain: bool,
    },
    /// Print a stored value
    Get {
        key: String,
        /// Treat the key as sensitive regardless of its name
        #[arg(long, conflicts_with = "plain")]
        sensitive: bool,
        /// Print the raw stored value
        #[arg(long)]
        plain: bool,
    },
    /// Delete a value
    #[command(alias = "rm")]
    Remove { key: String },
    /// List stored keys
    #[command(alias = "ls")]
    List,
    /// Delete every value
    Clear {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Check whether a key name is classified as sensitive
    Classify { key: String },
    /// Encrypt plaintext and legacy values of sensitive keys
    Migrate {
        /// Only upgrade legacy base64 values
        #[arg(long)]
        legacy_only: bool,
    },
    /// Re-encrypt every sensitive value under the active key
    Reencrypt,
}

fn classification(sensitive: bool, plain: bool) -> Classification {
    if sensitive {
        Classification::Sensitive
    } else if plain {
        Classification::Plain
    } else {
        Classification::ByPattern
    }
}

/// Handle a store command
pub fn handle_store_command(services: &VaultServices, cmd: StoreCommands) -> VaultResult<()> {
    let storage = &services.storage;

    match cmd {
        StoreCommands::Set {
            key,
            value,
            sensitive,
            plain,
        } => {
            let classification = classification(sensitive, plain);
            storage.set_as(&key, &value, classification)?;

            let encrypted = match classification {
                Classification::ByPattern => storage.is_sensitive(&key),
                Classification::Sensitive => true,
                Classification::Plain => false,
            };
            println!(
                "Stored '{}'{}",
                key,
                if encrypted { " (encrypted)" } else { "" }
            );
        }
        StoreCommands::Get {
            key,
            sensitive,
            plain,
        } => match storage.read_as(&key, classification(sensitive, plain)) {
            ReadOutcome::Value(value) => println!("{}", value),
            ReadOutcome::Missing => {
                return Err(VaultError::Validation(format!("No value stored under '{}'", key)))
            }
            ReadOutcome::Corrupted => {
                return Err(VaultError::Validation(format!(
                    "Value under '{}' could not be decrypted",
                    key
                )))
            }
        },
        StoreCommands::Remove { key } => {
            storage.remove(&key);
            println!("Removed '{}'", key);
        }
        StoreCommands::List => {
            let mut keys = storage.keys()?;
            keys.sort();
            let listing: Vec<(String, bool)> = keys
                .into_iter()
                .map(|key| {
                    let sensitive = storage.is_sensitive(&key);
                    (key, sensitive)
                })
                .collect();
            print!("{}", format_key_listing(&listing));
            if listing.is_empty() {
                println!();
            }
        }
        StoreCommands::Clear { yes } => {
            if !yes {
                return Err(VaultError::Validation(
                    "Refusing to clear the store without --yes".into(),
                ));
            }
            storage.clear();
            println!("Store cleared.");
        }
        StoreCommands::Classify { key } => {
            println!(
                "{}: {}",
                key,
                if storage.is_sensitive(&key) {
                    "sensitive"
                } else {
                    "not sensitive"
                }
            );
        }
        StoreCommands::Migrate { legacy_only } => {
            let report = if legacy_only {
                storage.migrate_to_advanced_encryption()?
            } else {
                storage.migrate_existing_data()?
            };
            print!("{}", format_migration_report("Migration", &report));
        }
        StoreCommands::Reencrypt => {
            let report = storage.reencrypt_sensitive_data()?;
            print!("{}", format_migration_report("Re-encryption", &report));
        }
    }

    Ok(())
}
