use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),

    #[error("Document is already being processed: {document_id}")]
    DocumentAlreadyProcessing { document_id: String },

    #[error("Document not found: {document_id}")]
    DocumentNotFound { document_id: String },

    #[error("Documents did not become ready: {}", document_ids.join(", "))]
    DocumentsNotReadyTimeout { document_ids: Vec<String> },

    #[error("Research timed out for document {document_id} (interaction {interaction_id})")]
    ResearchTimeout {
        document_id: String,
        interaction_id: String,
    },

    #[error(
        "Research returned no content for document {document_id} (interaction {interaction_id})"
    )]
    ResearchEmptyContent {
        document_id: String,
        interaction_id: String,
    },

    #[error("Missing caller identity")]
    Unauthenticated,

    #[error("Access denied to resource owned by another user")]
    Forbidden,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Research provider error: {0}")]
    Research(#[from] ResearchError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Operation cancelled by shutdown")]
    Cancelled,

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Reasons a URL is refused before any network access
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("URL exceeds {max} characters")]
    TooLong { max: usize },

    #[error("URL could not be parsed: {reason}")]
    Malformed { reason: String },

    #[error("scheme `{scheme}` is not allowed")]
    UnsupportedScheme { scheme: String },

    #[error("URL has no host")]
    MissingHost,

    #[error("host `{host}` is not publicly routable")]
    BlockedHost { host: String },
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("query failed: {0}")]
    Query(#[source] rusqlite::Error),

    #[error("migration failed: {message}")]
    Migration { message: String },

    #[error("serialization failed")]
    Serialization(#[source] serde_json::Error),
}

/// Blob storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("blob not found: {key}")]
    NotFound { key: String },

    #[error("invalid blob key: {key}")]
    InvalidKey { key: String },

    #[error("I/O error for blob {key}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Job queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("failed to enqueue {job_type} job: {message}")]
    Enqueue { job_type: String, message: String },

    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("invalid job payload")]
    Payload(#[source] serde_json::Error),

    #[error("queue storage failed")]
    Storage(#[source] rusqlite::Error),
}

/// Research provider errors
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("connection failed to research provider at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("research request failed (status {status}): {message}")]
    Request { status: u16, message: String },

    #[error("research operation {interaction_id} failed: {message}")]
    OperationFailed {
        interaction_id: String,
        message: String,
    },

    #[error("invalid response from research provider: {message}")]
    InvalidResponse { message: String },
}

/// Content fetch errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} returned unsupported content type `{content_type}`")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("{url} exceeds the {max} byte limit")]
    TooLarge { url: String, max: u64 },

    #[error("no readable content found at {url}")]
    NoContent { url: String },
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidUrl(_) | ServiceError::InvalidRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::DocumentAlreadyProcessing { .. } => StatusCode::CONFLICT,
            ServiceError::DocumentNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::DocumentsNotReadyTimeout { .. }
            | ServiceError::ResearchTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::ResearchEmptyContent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Fetch(_) | ServiceError::Research(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::InvalidUrl(_) => "invalid_url",
            ServiceError::DocumentAlreadyProcessing { .. } => "document_already_processing",
            ServiceError::DocumentNotFound { .. } => "document_not_found",
            ServiceError::DocumentsNotReadyTimeout { .. } => "documents_not_ready",
            ServiceError::ResearchTimeout { .. } => "research_timeout",
            ServiceError::ResearchEmptyContent { .. } => "research_empty_content",
            ServiceError::Unauthenticated => "unauthenticated",
            ServiceError::Forbidden => "forbidden",
            ServiceError::Database(_) => "database_error",
            ServiceError::Storage(StorageError::NotFound { .. }) => "blob_not_found",
            ServiceError::Storage(_) => "storage_error",
            ServiceError::Queue(_) => "queue_error",
            ServiceError::Research(_) => "research_provider_error",
            ServiceError::Fetch(_) => "fetch_error",
            ServiceError::Cancelled => "cancelled",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ServiceError::DocumentsNotReadyTimeout { document_ids } => {
                Some(serde_json::json!({ "document_ids": document_ids }))
            }
            ServiceError::ResearchTimeout {
                document_id,
                interaction_id,
            }
            | ServiceError::ResearchEmptyContent {
                document_id,
                interaction_id,
            } => Some(serde_json::json!({
                "document_id": document_id,
                "interaction_id": interaction_id,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(self.error_code().to_string()),
            details: self.details(),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
