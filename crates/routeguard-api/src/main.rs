//! # routeguard-demo: Binary Entry Point
//!
//! Serves the demo router with validation configured from the environment.
//! Binds to `PORT` (default 8080).

use anyhow::Context;
use routeguard_api::{demo, ValidationConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ValidationConfig::from_env().context("reading validation configuration")?;

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let module = demo::module(config).map_err(|e| {
        tracing::error!("Bootstrap failed: {e}");
        e
    })?;
    let app = demo::app(&module);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("routeguard demo listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
