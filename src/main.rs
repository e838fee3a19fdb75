use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tickersync::config::SyncConfig;
use tickersync::sync::SyncEngine;

#[derive(Parser)]
#[command(name = "tickersync")]
#[command(about = "Sync market quotes into a Feishu Bitable")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "tickersync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show resolved configuration (secrets elided)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true),
        )
        .init();

    let cli = Cli::parse();

    let config = SyncConfig::load(&cli.config)
        .with_context(|| format!("failed to load config: {}", cli.config.display()))?;

    match cli.command {
        Some(Command::Config) => {
            println!("Config file: {}", cli.config.display());
            println!("API base: {}", config.api_base);
            println!("Quote base: {}", config.quote_base);
            println!("App token: {}", config.app_token);
            println!("Table: {}", config.table_id);
            println!(
                "Fields: symbol={} price={} updated_at={}",
                config.fields.symbol, config.fields.price, config.fields.updated_at
            );
            println!("Page size: {}", config.page_size);
        }
        None => {
            let engine = SyncEngine::new(config)?;
            let summary = engine.run().await?;
            println!("{summary}");
        }
    }

    Ok(())
}
