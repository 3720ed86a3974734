mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stylist::config::StylistConfig;

#[derive(Parser)]
#[command(name = "stylist", version, about = "Outfit recommendation service backed by CLIP")]
struct Cli {
    /// Config file (defaults to ~/.stylist/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Manage the scoring model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Pick the image that best matches a prompt
    Pick {
        /// What the outfit is for
        #[arg(long)]
        prompt: String,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Candidate image files
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the CLIP model to ~/.stylist/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => StylistConfig::load_from(path)?,
        None => StylistConfig::load()?,
    };

    // Log to stderr so `pick --json` output stays clean on stdout.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            stylist::server::serve(config).await?;
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config).await?;
            }
        },
        Command::Pick {
            prompt,
            json,
            images,
        } => {
            tokio::task::spawn_blocking(move || cli::pick::pick(&config, &prompt, &images, json))
                .await??;
        }
    }

    Ok(())
}
