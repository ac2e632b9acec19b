//! Key management CLI commands

use clap::Subcommand;

use crate::display::{format_health, format_key_details, format_key_list, format_sweep};
use crate::error::{VaultError, VaultResult};
use crate::services::VaultServices;

/// Key subcommands
#[derive(Subcommand)]
pub enum KeyCommands {
    /// List all keys
    #[command(alias = "ls")]
    List,
    /// Show one key's metadata
    Show { key_id: String },
    /// Generate a new active key for a purpose
    Generate {
        #[arg(default_value = "encryption")]
        purpose: String,
    },
    /// Rotate a key (the storage key when no id is given)
    Rotate { key_id: Option<String> },
    /// Revoke a key; an active key is replaced immediately
    Revoke { key_id: String },
    /// Key counts by status
    Health,
    /// Run one rotation and cleanup sweep now
    Sweep,
}

/// Handle a key command
pub fn handle_key_command(services: &VaultServices, cmd: KeyCommands) -> VaultResult<()> {
    let keys = &services.keys;

    match cmd {
        KeyCommands::List => {
            println!("{}", format_key_list(&keys.list_keys(), keys.now()));
        }
        KeyCommands::Show { key_id } => {
            let metadata = keys
                .key_metadata(&key_id)
                .ok_or_else(|| VaultError::key_not_found(key_id.clone()))?;
            print!("{}", format_key_details(&metadata, keys.now()));
        }
        KeyCommands::Generate { purpose } => {
            let id = keys.generate_master_key(&purpose)?;
            println!("Generated key {} for '{}'", id, purpose);
        }
        KeyCommands::Rotate { key_id } => {
            let new_id = match key_id {
                Some(id) => keys.rotate_key(&id)?,
                None => services.encryption.rotate_master_key()?,
            };
            println!("New active key: {}", new_id);
            println!("Run 'vaultkeep store reencrypt' to move existing data onto it.");
        }
        KeyCommands::Revoke { key_id } => {
            match keys.revoke_key(&key_id)? {
                Some(replacement) => {
                    println!("Revoked {}; replacement key {}", key_id, replacement)
                }
                None => println!("Revoked {}", key_id),
            }
            println!("Data encrypted only under a revoked key can no longer be read.");
        }
        KeyCommands::Health => {
            print!("{}", format_health(&keys.get_key_health_status()));
        }
        KeyCommands::Sweep => match services.scheduler.run_sweep() {
            Some(report) => print!("{}", format_sweep(&report.rotation, &report.cleanup)),
            None => println!("A sweep is already running."),
        },
    }

    Ok(())
}
