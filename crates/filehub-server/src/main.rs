use anyhow::Context;
use clap::Parser;
use filehub_core::{EditorSession, FsStorage, Storage, TrackReconciler};
use filehub_server::metrics::ServerMetrics;
use filehub_server::{AppState, Config, Server};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    let storage = FsStorage::new(&config.storage_path).with_context(|| {
        format!(
            "failed to open storage root {}",
            config.storage_path.display()
        )
    })?;

    let metrics = ServerMetrics::new();
    let initial = storage
        .total_size()
        .await
        .context("failed to calculate initial storage size")?;
    metrics.set_storage_bytes(initial as i64);
    info!(bytes = initial, "initial storage size calculated");

    let editor = EditorSession::new(
        &config.jwt_secret,
        config.base_url.as_str(),
        config.editor_lang.as_str(),
    );
    let reconciler = TrackReconciler::new(
        storage.clone(),
        config.doc_server_url_internal.clone(),
        Duration::from_secs(config.fetch_timeout_secs),
    )
    .context("failed to build document-fetch client")?;

    let storage_path = storage.root().display().to_string();
    let state = Arc::new(AppState {
        storage,
        editor,
        reconciler,
        metrics,
        api_key: config.api_key.clone(),
        doc_server_url: config.doc_server_url.clone(),
        storage_path,
        port: config.port,
    });

    let addr = SocketAddr::new(config.bind_address, config.port);
    let server = Server::start(state, addr).await.context("failed to start server")?;
    info!(addr = %server.addr, storage = %config.storage_path.display(), "server started");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, stopping server");
    server.stop().await;

    Ok(())
}
