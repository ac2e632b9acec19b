//! Configuration and audit CLI commands

use clap::Subcommand;

use crate::config::{Settings, VaultPaths, MASTER_KEY_ENV};
use crate::display::format_audit_events;
use crate::error::VaultResult;
use crate::services::VaultServices;

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show paths and settings
    Show,
    /// Write the current settings to disk
    Init,
    /// List sensitive key names and patterns
    Patterns,
}

/// Handle a config command
///
/// `init` and `show` only need paths and settings, so they do not open the
/// vault.
pub fn handle_config_command(paths: &VaultPaths, cmd: ConfigCommands) -> VaultResult<()> {
    match cmd {
        ConfigCommands::Show => {
            let settings = Settings::load_or_create(paths)?.with_env_overrides()?;
            let master_set = std::env::var(MASTER_KEY_ENV)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false);

            println!("vaultkeep Configuration");
            println!("=======================");
            println!("Data directory: {}", paths.base_dir().display());
            println!("Settings file:  {}", paths.settings_file().display());
            println!("Store file:     {}", paths.store_file().display());
            println!("Key registry:   {}", paths.keys_file().display());
            println!("Audit log:      {}", paths.audit_log().display());
            println!();
            println!("Settings:");
            println!("  Environment:        {}", settings.environment);
            println!("  Master key set:     {}", if master_set { "yes" } else { "no" });
            println!("  Default purpose:    {}", settings.default_purpose);
            println!("  KDF iterations:     {}", settings.kdf_iterations);
            println!(
                "  Rotation interval:  {} days",
                settings.key_policy.rotation_interval_days
            );
            println!("  Max key age:        {} days", settings.key_policy.max_key_age_days);
            println!("  Sweep interval:     {} s", settings.sweep_interval_secs);
            if !settings.sensitive_patterns.is_empty() {
                println!(
                    "  Extra patterns:     {}",
                    settings.sensitive_patterns.join(", ")
                );
            }
        }
        ConfigCommands::Init => {
            let settings = Settings::load_or_create(paths)?;
            settings.save(paths)?;
            println!("Settings written to {}", paths.settings_file().display());
        }
        ConfigCommands::Patterns => {
            let services = VaultServices::open_at(paths.clone())?;
            for entry in services.storage.sensitive_patterns() {
                println!("{}", entry);
            }
        }
    }

    Ok(())
}

/// Print the most recent audit events
pub fn handle_audit_command(services: &VaultServices, limit: usize) -> VaultResult<()> {
    let events = services.audit.read_recent(limit)?;
    println!("{}", format_audit_events(&events));
    Ok(())
}
