use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{ChannelCommand, ConfigCommand, DrawCommand, WatchCommand};
use config::Config;

#[derive(Parser)]
#[command(name = "odai")]
#[command(version)]
#[command(about = "Draw together on a shared canvas", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and inspect channel ids
    Channel(ChannelCommand),

    /// Join a channel and save every received canvas
    Watch(WatchCommand),

    /// Draw one stroke on a channel
    Draw(DrawCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "odai=info,odai_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.clone())?;

    match cli.command {
        Some(Commands::Channel(cmd)) => {
            cmd.run(&config)?;
        }
        Some(Commands::Watch(cmd)) => {
            cmd.run(&config).await?;
        }
        Some(Commands::Draw(cmd)) => {
            cmd.run(&config).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config, cli.config.as_deref())?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
