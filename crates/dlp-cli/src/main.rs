mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use dlp_config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        cli::Commands::Run(args) => commands::run::handle(args, config).await,
        cli::Commands::Config(cmd) => commands::config::handle(cmd, &config, cli.config.as_deref()),
    }
}
