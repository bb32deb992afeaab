use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragbase::config::Config;
use ragbase::server::RagServer;

/// Knowledge-base RAG backend server
#[derive(Parser, Debug)]
#[command(name = "ragbase-server", version, about)]
struct Args {
    /// Path to a TOML config file; environment variables apply on top
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,

    /// Override the data directory holding the knowledge bases
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = std::env::var("RAGBASE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("ragbase=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env(),
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        data_dir = %config.storage.data_dir.display(),
        "Starting ragbase"
    );

    let server = RagServer::new(config).await?;
    server.start().await?;
    Ok(())
}
