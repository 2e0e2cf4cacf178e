//! HTTP API for the document ingestion service.
//!
//! This module provides the REST API endpoints for:
//! - Health and metrics monitoring
//! - Document creation from URLs and research queries
//! - Document reads, retry, and the readiness barrier

use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{StatusCode, header, request::Parts},
    response::IntoResponse,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ServiceError;
use crate::service::{IngestionService, UserContext};

pub mod documents;
use documents::{
    await_documents_handler, create_research_document_handler, create_url_document_handler,
    get_document_content_handler, get_document_handler, retry_document_handler,
};

/// Header carrying the caller's user id
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's role; `admin` bypasses ownership checks
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Application state
pub struct AppState {
    pub service: Arc<IngestionService>,
    pub metrics: PrometheusHandle,
    pub start_time: Instant,
}

/// Build the API router
pub fn router(service: Arc<IngestionService>, metrics: PrometheusHandle) -> Router {
    let state = Arc::new(AppState {
        service,
        metrics,
        start_time: Instant::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/documents/url", post(create_url_document_handler))
        .route("/documents/research", post(create_research_document_handler))
        .route("/documents/await", post(await_documents_handler))
        .route("/documents/{id}", get(get_document_handler))
        .route("/documents/{id}/content", get(get_document_content_handler))
        .route("/documents/{id}/retry", post(retry_document_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl<S: Send + Sync> FromRequestParts<S> for UserContext {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ServiceError::Unauthenticated)?;

        let is_admin = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|role| role.eq_ignore_ascii_case("admin"));

        Ok(UserContext {
            user_id: user_id.to_string(),
            is_admin,
        })
    }
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
