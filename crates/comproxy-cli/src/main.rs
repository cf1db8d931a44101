//! comproxy entrypoint.

use clap::Parser;
use std::path::PathBuf;

mod commands;
mod config;
mod handlers;
mod logging;

use commands::{Commands, ConfigCommands};

#[derive(Parser)]
#[command(name = "comproxy")]
#[command(author, version, about = "Caching proxy for Composer repositories", long_about = None)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, global = true, env = "COMPROXY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut settings = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                settings.server.bind = bind;
            }
            logging::init(&settings.logging);
            handlers::serve(&settings).await?
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&settings)?,
        },
        Commands::Check { path } => handlers::check(&settings, &path)?,
    }

    Ok(())
}
