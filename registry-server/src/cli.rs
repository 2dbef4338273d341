//! Command-line interface for the registry server

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::Config;
use crate::revision_store::{LocalRevisionStore, RevisionStore};
use crate::server::run_server;

/// Command-line interface for the registry server
#[derive(Parser)]
#[command(name = "registry-server")]
#[command(about = "Private npm registry with admin unpublish")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the registry server
    Start {
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
        /// Data directory (overrides the config file)
        #[arg(long)]
        data: Option<PathBuf>,
        /// JSON config file; watched for unpublish policy changes
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
    /// List packages in a local data directory
    Status {
        /// Data directory for package storage
        #[arg(long, default_value = "./data")]
        data: PathBuf,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Start {
            host,
            port,
            data,
            config,
        } => {
            let mut settings = match &config {
                Some(path) => Config::load(path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => Config::default(),
            };
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            if let Some(data) = data {
                settings.storage.data_dir = data;
            }
            info!(host = %settings.server.host, port = settings.server.port, "Starting from CLI");
            run_server(settings, config).await
        }
        Commands::Status { data } => show_status(data).await,
    }
}

async fn show_status(data: PathBuf) -> Result<()> {
    let mut storage = Config::default().storage;
    storage.data_dir = data;
    let store = LocalRevisionStore::open(storage.metadata_dir())?;

    let names = store.list_names().await?;
    println!("📦 {} package(s) in {}", names.len(), storage.data_dir.display());
    for name in names {
        let doc = store.get(&name).await?;
        let latest = doc.dist_tags.get("latest").map(String::as_str).unwrap_or("-");
        println!(
            "   {}  rev {}  versions {}  latest {}",
            doc.name,
            doc.revision,
            doc.versions.len(),
            latest
        );
    }
    Ok(())
}
