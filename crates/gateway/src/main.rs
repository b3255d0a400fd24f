//! # Sharelink Gateway
//!
//! ## API endpoints
//! - `GET /`: upload form
//! - `POST /`: upload, then redirect to `/link`
//! - `GET /link`: signed link page
//! - `GET /files/{container}/{*name}`: verifying proxy
//! - `GET /healthz`: liveness

use sharelink_gateway::{build_state, router, GatewayConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env()?;
    let state = build_state(&config).await?;
    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!("Gateway listening on {}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
