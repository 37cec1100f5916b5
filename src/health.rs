use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tracing::info;

/// Liveness probe: 200/"OK" on every GET, independent of pipeline
/// health. Shares no state with the moderation path.
pub async fn serve(port: u16) -> Result<()> {
    let app = Router::new().route("/", get(ok)).fallback(ok);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind health check port {port}"))?;

    info!("Health check server running on port {}", port);

    axum::serve(listener, app)
        .await
        .context("Health check server failed")?;

    Ok(())
}

async fn ok() -> &'static str {
    "OK"
}
