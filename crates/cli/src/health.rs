//! Independent health endpoint, per spec §4.5: it never touches registry
//! state and runs as its own task so a registry hiccup can't take liveness
//! checks down with it. Grounded in `r3e-network-neo-rs`'s use of `axum`
//! for lightweight HTTP surfaces.

use axum::{Json, Router};
use serde_json::json;

pub async fn serve(port: u16) {
    // Spec §6: GET to any path returns 200, matching the original's
    // `HealthHandler.do_GET`, which responds unconditionally regardless of
    // path. A fallback rather than a fixed route covers every path.
    let app = Router::new().fallback(health);
    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, port, "health endpoint failed to bind");
            return;
        }
    };
    tracing::info!(port, "health endpoint listening");
    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(%err, "health endpoint exited");
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}
