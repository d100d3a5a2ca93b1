use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use cotacao::cli::setup::setup;
use cotacao::core::log::init_logging;
use cotacao::core::quote::QuotePair;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Serve quotes on GET /cotacao
    Serve {
        /// Port to listen on, overrides the configuration
        #[arg(short, long)]
        port: Option<u16>,

        /// Currency pair as DEST-SRC (e.g. USD-BRL), overrides the configuration
        #[arg(long)]
        pair: Option<QuotePair>,
    },
    /// Fetch a quote from the server and write it to a file
    Fetch {
        /// Output file, overrides the configuration
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(Commands::Serve { port, pair }) => {
            cotacao::run_command(
                cotacao::AppCommand::Serve { port, pair },
                cli.config_path.as_deref(),
            )
            .await
        }
        Some(Commands::Fetch { output }) => {
            cotacao::run_command(
                cotacao::AppCommand::Fetch { output },
                cli.config_path.as_deref(),
            )
            .await
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        let message = format!("{e:#}");
        tracing::error!(error = %message, "Application failed");
    }
    result
}
