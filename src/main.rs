use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vaultkeep::cli::{
    handle_audit_command, handle_config_command, handle_key_command, handle_store_command,
    ConfigCommands, KeyCommands, StoreCommands,
};
use vaultkeep::config::VaultPaths;
use vaultkeep::services::VaultServices;

#[derive(Parser)]
#[command(
    name = "vaultkeep",
    author = "Kaylee Beyene",
    version,
    about = "Envelope encryption and key rotation for a local key-value vault",
    long_about = "vaultkeep stores values in a local key-value file, encrypting the \
                  values of sensitive keys with AES-256-GCM under keys that are \
                  rotated and retired on a schedule. The master password is read \
                  from VAULTKEEP_MASTER_KEY."
)]
struct Cli {
    /// Vault directory (defaults to VAULTKEEP_DATA_DIR or the platform data dir)
    #[arg(long, global = true, env = "VAULTKEEP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log to stderr (RUST_LOG refines the filter)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read and write values
    #[command(subcommand)]
    Store(StoreCommands),

    /// Manage encryption keys
    #[command(subcommand, alias = "key")]
    Keys(KeyCommands),

    /// Show or initialise configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Show recent audit events
    Audit {
        /// Number of events to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Run rotation sweeps in the foreground until interrupted
    Watch,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        init_logging();
    }

    let paths = match cli.data_dir {
        Some(dir) => VaultPaths::with_base_dir(dir),
        None => VaultPaths::new()?,
    };

    match cli.command {
        Some(Commands::Store(cmd)) => {
            let services = VaultServices::open_at(paths)?;
            handle_store_command(&services, cmd)?;
        }
        Some(Commands::Keys(cmd)) => {
            let services = VaultServices::open_at(paths)?;
            handle_key_command(&services, cmd)?;
        }
        Some(Commands::Config(cmd)) => {
            handle_config_command(&paths, cmd)?;
        }
        Some(Commands::Audit { limit }) => {
            let services = VaultServices::open_at(paths)?;
            handle_audit_command(&services, limit)?;
        }
        Some(Commands::Watch) => {
            let services = VaultServices::open_at(paths)?;
            watch(&services)?;
        }
        None => {
            println!("vaultkeep - encrypted key-value vault");
            println!();
            println!("Run 'vaultkeep --help' for usage information.");
        }
    }

    Ok(())
}

fn watch(services: &VaultServices) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        println!(
            "Sweeping keys every {} seconds. Press Ctrl-C to stop.",
            services.settings.sweep_interval_secs
        );
        services.run_background_sweeps().await?;
        Ok::<(), anyhow::Error>(())
    })
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vaultkeep=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
