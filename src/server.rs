//! Here we serve the webhook pipeline plus the version and metrics
//! endpoints.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Extension},
    handler::Handler,
    http::{header::CONTENT_TYPE, Response, StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use crate::{
    metrics::Metrics,
    relay::{Relay, RelayOutcome},
    settings::version_string,
};

/// Shared by all request handlers. Constructed once at startup; read-only
/// afterwards except for the counters and the admission gate.
pub struct AppState {
    pub relay: Relay,
    pub metrics: Metrics,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/version", get(version))
        .route("/metrics", get(metrics))
        .fallback(not_found.into_service())
        .layer(Extension(state))
}

pub async fn run(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    axum::Server::bind(&addr)
        .serve(router(state).into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("webhook receiver crashed")?;

    Ok(())
}

/// `POST /webhook`: admit, forward, classify.
async fn webhook(Extension(state): Extension<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let _slot = state.relay.admit().await;

    // intake is counted for every admitted request, not just successful ones
    state.metrics.received.inc();

    match state.relay.forward(&body).await {
        Ok(()) => (StatusCode::OK, String::new()),
        Err(err) => {
            match err.outcome() {
                RelayOutcome::Invalid => state.metrics.invalid.inc(),
                RelayOutcome::Errored => state.metrics.errored.inc(),
            }
            tracing::error!("{err}");

            (err.status_code(), err.to_string())
        }
    }
}

async fn version() -> &'static str {
    version_string()
}

async fn metrics(Extension(state): Extension<Arc<AppState>>) -> Response<Body> {
    let (format, buffer) = state.metrics.encode();

    #[allow(clippy::expect_used)]
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, format)
        .body(Body::from(buffer))
        .expect("metrics response cannot fail to build")
}

async fn not_found(uri: Uri, ConnectInfo(remote): ConnectInfo<SocketAddr>) -> impl IntoResponse {
    tracing::info!("404 when serving path: {uri} requested by {remote}");

    (StatusCode::NOT_FOUND, "404: Not found")
}
