//! `gridfalld`: the Connect-Four server binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridfall_server::store::MemoryStore;
use gridfall_server::{App, config, net};

#[derive(Debug, Parser)]
#[command(name = "gridfalld", about = "Realtime Connect-Four server")]
struct Args {
    /// Path to a JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut settings = config::load(args.config.as_deref()).context("loading settings")?;
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let app = Arc::new(App::new(settings.clone(), Arc::new(MemoryStore::new())));
    let router = net::router(Arc::clone(&app));

    let listener = tokio::net::TcpListener::bind(settings.listen_addr())
        .await
        .with_context(|| format!("binding {}", settings.listen_addr()))?;
    info!(addr = %listener.local_addr()?, "listening");

    let shutdown = app.shutdown_token();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown.cancel();
        })
        .await
        .context("serving")?;
    Ok(())
}
