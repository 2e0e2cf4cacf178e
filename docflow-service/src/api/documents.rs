//! Document API endpoints.
//!
//! Handlers for creating documents from URLs and research queries, reading them back,
//! retrying failures, and waiting for a set of documents to become ready.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use futures::future::try_join_all;
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{Document, DocumentStatus};
use crate::error::ServiceError;
use crate::service::{CreateFromResearchRequest, CreateFromUrlRequest, UserContext};

use super::AppState;

/// Request to wait for documents
#[derive(Deserialize)]
pub struct AwaitDocumentsRequest {
    pub document_ids: Vec<String>,
}

/// `202 Accepted` while the document is still being processed
fn created(document: Document) -> (StatusCode, Json<Document>) {
    let status = match document.status {
        DocumentStatus::Processing => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };
    (status, Json(document))
}

/// Create a document from a web page
pub async fn create_url_document_handler(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Json(request): Json<CreateFromUrlRequest>,
) -> Result<(StatusCode, Json<Document>), ServiceError> {
    let document = state.service.create_from_url(&user, request).await?;
    Ok(created(document))
}

/// Create a document from a deep research query
pub async fn create_research_document_handler(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Json(request): Json<CreateFromResearchRequest>,
) -> Result<(StatusCode, Json<Document>), ServiceError> {
    let document = state.service.create_from_research(&user, request).await?;
    Ok(created(document))
}

/// Get a document by ID
pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Path(id): Path<String>,
) -> Result<Json<Document>, ServiceError> {
    let document = state.service.get_document(&user, &id).await?;
    Ok(Json(document))
}

/// Get the extracted text of a ready document
pub async fn get_document_content_handler(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let text = state.service.get_document_content(&user, &id).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text,
    ))
}

/// Retry a failed document
pub async fn retry_document_handler(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Document>), ServiceError> {
    let document = state.service.retry_processing(&user, &id).await?;
    Ok(created(document))
}

/// Block until the listed documents are ready
pub async fn await_documents_handler(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Json(request): Json<AwaitDocumentsRequest>,
) -> Result<Json<Vec<Document>>, ServiceError> {
    // Ownership of every listed document is checked before waiting on any of them
    try_join_all(
        request
            .document_ids
            .iter()
            .map(|id| state.service.get_document(&user, id)),
    )
    .await?;

    let documents = state
        .service
        .await_documents_ready(&request.document_ids)
        .await?;
    Ok(Json(documents))
}
