//! kube-crd entry point

use anyhow::Result;
use clap::Parser;
use kube_crd_cli::{Cli, DemoManager};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let manager = DemoManager::new(cli.into_config()).await?;
    manager.run().await
}
