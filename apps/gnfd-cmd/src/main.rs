//! gnfd-cmd entry point.

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Greenfield storage provider client
#[derive(Parser)]
#[command(name = "gnfd-cmd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/gnfd-cmd/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SP endpoint, overrides the config file
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Hex private key file, overrides the config file
    #[arg(long, global = true)]
    key_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute the piece-hash roots of a local file
    Hash {
        file: PathBuf,
    },

    /// Download an object into a local file
    Get {
        /// gnfd://bucket/object
        url: String,
        file: PathBuf,
        /// First byte of the range (inclusive)
        #[arg(long, default_value_t = 0)]
        start: u64,
        /// Last byte of the range (inclusive); 0 with start 0 reads everything
        #[arg(long, default_value_t = 0)]
        end: u64,
    },

    /// List objects in a bucket
    Ls {
        /// gnfd://bucket
        url: String,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        max_keys: Option<u64>,
    },

    /// Request an SP pre-signature for creating a bucket or object
    Approve {
        /// gnfd://bucket or gnfd://bucket/object
        url: String,
    },

    /// Write the effective configuration to the config file
    InitConfig,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::default_path);
    let mut config = config::Config::load(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(key_file) = cli.key_file {
        config.key_file = Some(key_file);
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("SIGINT received, cancelling");
                trigger.cancel();
            }
        });

        match cli.command {
            Command::Hash { file } => commands::hash(&config, file, &cancel).await,
            Command::Get {
                url,
                file,
                start,
                end,
            } => commands::get(&config, &url, &file, start, end, &cancel).await,
            Command::Ls {
                url,
                prefix,
                max_keys,
            } => commands::ls(&config, &url, prefix.as_deref(), max_keys, &cancel).await,
            Command::Approve { url } => commands::approve(&config, &url, &cancel).await,
            Command::InitConfig => {
                config.save(&config_path)?;
                println!("wrote {}", config_path.display());
                Ok(())
            }
        }
    })
}
