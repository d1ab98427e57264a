use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use clap::Parser;
use nodelink::cli::{App, Cli, Commands, Config, KeyCommand};
use nodelink::crypto::Identity;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_or_create(path),
        None => Config::load_or_create_default(),
    }
}

fn handle_key_command(command: KeyCommand, config: &Config) -> Result<()> {
    let key_path = config.identity_path()?;

    match command {
        KeyCommand::Path => {
            info!("Key storage path: {}", key_path.display());
            if key_path.exists() {
                info!("✓ Identity file exists");
            } else {
                info!("✗ Identity file does not exist");
                info!("Run 'nodelink key generate' to create a new identity");
            }
        }
        KeyCommand::Generate => {
            info!("Generating new identity...");

            if key_path.exists() {
                warn!("An identity already exists at: {}", key_path.display());
                warn!("This will overwrite the existing identity!");
            }

            let identity = Identity::generate()?;
            identity.save(&key_path)?;

            info!("Identity generated successfully!");
            info!("Node ID: {}", identity.node_id());
            info!(
                "Public Key: {}",
                general_purpose::STANDARD.encode(identity.verifying_key().to_bytes())
            );
            info!("Saved to: {}", key_path.display());
        }
        KeyCommand::Info => match Identity::load(&key_path) {
            Ok(identity) => {
                info!("Node ID: {}", identity.node_id());
                info!(
                    "Public Key: {}",
                    general_purpose::STANDARD.encode(identity.verifying_key().to_bytes())
                );
                info!("Storage location: {}", key_path.display());
            }
            Err(e) => {
                error!("No identity found: {}", e);
                info!("Run 'nodelink key generate' to create a new identity");
            }
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Key { command } => {
            let config = load_config(cli.config.as_ref())?;
            handle_key_command(command, &config)?;
        }
        Commands::Serve { bind } => {
            let app = App::new(cli.config.as_deref())?;
            info!("Loaded identity: {}", app.node_id());
            app.handle_serve(bind).await?;
        }
        Commands::Ping { address, count } => {
            let app = App::new(cli.config.as_deref())?;
            info!("Using identity: {}", app.node_id());
            app.handle_ping(&address, count).await?;
        }
    }

    Ok(())
}
