pub mod cli;
pub mod client;
pub mod core;
pub mod providers;
pub mod server;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::quote::QuotePair;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, info};

pub enum AppCommand {
    /// Run the quote server, optionally overriding the configured port and pair
    Serve {
        port: Option<u16>,
        pair: Option<QuotePair>,
    },
    /// Ask the server for a quote and write it to the output file
    Fetch { output: Option<PathBuf> },
}

pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let mut config = load_config(config_path)?;

    match command {
        AppCommand::Serve { port, pair } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(pair) = pair {
                config.pair = pair;
            }
            info!("Quote server starting...");
            server::serve(&config).await
        }
        AppCommand::Fetch { output } => {
            if let Some(output) = output {
                config.client.output_file = output;
            }
            let client = client::QuoteClient::new(&config.client)
                .context("Failed to create quote client")?;
            client.run().await.context("Failed to fetch quote")?;
            info!("Quote written to {}", client.output_file().display());
            Ok(())
        }
    }
}
