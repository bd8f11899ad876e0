use anyhow::Result;
use axum::Router;
use boc_core::persist::load_json;
use boc_core::RankerConfig;
use boc_server::build_app;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Concept store directory
    #[arg(long, default_value = "./concepts")]
    store: PathBuf,
    /// Ranker settings (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config: RankerConfig = match &args.config {
        Some(path) => load_json(path)?,
        None => RankerConfig::default(),
    };
    let app: Router = build_app(&args.store, config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
