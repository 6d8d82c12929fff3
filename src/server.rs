//! HTTP front for the query contract using Axum.
//!
//! Routes: `POST /embed`, `POST /search`, `GET /health`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ragline_core::config::ServerConfig;
use ragline_core::error::RaglineError;
use ragline_knowledge::service::status_for;
use ragline_knowledge::{EmbedRequest, RagService, SearchRequest};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

fn error_response(err: RaglineError) -> Response {
    let status = StatusCode::from_u16(status_for(&err)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!("Request failed: {err}");
    } else {
        tracing::debug!("Request rejected: {err}");
    }
    (
        status,
        Json(serde_json::json!({
            "error": status.canonical_reason().unwrap_or("error"),
            "message": err.to_string(),
        })),
    )
        .into_response()
}

async fn embed(State(service): State<Arc<RagService>>, Json(request): Json<EmbedRequest>) -> Response {
    match service.embed(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn search(State(service): State<Arc<RagService>>, Json(request): Json<SearchRequest>) -> Response {
    match service.search(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn health(State(service): State<Arc<RagService>>) -> Response {
    let report = service.health().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

/// Build the Axum router. Empty `cors_origins` allows any origin.
pub fn build_router(service: Arc<RagService>, cors_origins: &[String]) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));
    let cors = if cors_origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = cors_origins
            .iter()
            .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();
        cors.allow_origin(origins)
    };

    Router::new()
        .route("/embed", post(embed))
        .route("/search", post(search))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Start the HTTP server.
pub async fn start(service: RagService, config: &ServerConfig) -> anyhow::Result<()> {
    let collection = service.collection().to_string();
    let app = build_router(Arc::new(service), &config.cors_origins);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 Serving '{collection}' on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
