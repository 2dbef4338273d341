//! Registry server binary

use anyhow::Result;
use clap::Parser;
use registry_server::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = registry_logging::init_subscriber();
    run(Cli::parse()).await
}
