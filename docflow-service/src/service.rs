mod document_pipeline;
mod state;

pub use document_pipeline::{CreateFromResearchRequest, CreateFromUrlRequest};
pub use state::UserContext;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::db::{Document, DocumentStatus};
use crate::error::{ServiceError, ServiceResult};
use crate::fetch::ContentFetcher;
use crate::queue::JobQueue;
use crate::repository::DocumentRepository;
use crate::research::ResearchProvider;
use crate::storage::BlobStore;

/// Backends the pipeline talks to
#[derive(Clone)]
pub struct Collaborators {
    pub documents: Arc<dyn DocumentRepository>,
    pub queue: Arc<dyn JobQueue>,
    pub blobs: Arc<dyn BlobStore>,
    pub research: Arc<dyn ResearchProvider>,
    pub fetcher: Arc<dyn ContentFetcher>,
}

/// Document ingestion service: initiators, job handlers, and the readiness barrier
pub struct IngestionService {
    documents: Arc<dyn DocumentRepository>,
    queue: Arc<dyn JobQueue>,
    blobs: Arc<dyn BlobStore>,
    research: Arc<dyn ResearchProvider>,
    fetcher: Arc<dyn ContentFetcher>,
    pipeline: PipelineConfig,
    /// Cancelled on shutdown; every poll sleep races it
    shutdown: CancellationToken,
}

impl IngestionService {
    pub fn new(
        collaborators: Collaborators,
        pipeline: PipelineConfig,
        shutdown: CancellationToken,
    ) -> Self {
        info!("Initializing document ingestion service");

        let Collaborators {
            documents,
            queue,
            blobs,
            research,
            fetcher,
        } = collaborators;

        Self {
            documents,
            queue,
            blobs,
            research,
            fetcher,
            pipeline,
            shutdown,
        }
    }

    /// Token observed by long-running handlers
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Sleep for `duration`, returning [`ServiceError::Cancelled`] if shutdown begins first
    pub(crate) async fn pause(&self, duration: Duration) -> ServiceResult<()> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(ServiceError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    pub(crate) async fn require_document(&self, document_id: &str) -> ServiceResult<Document> {
        self.documents
            .find_by_id(document_id)
            .await?
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_id: document_id.to_string(),
            })
    }

    /// Mark a document failed without letting a storage error mask the caller's error
    pub(crate) async fn record_failure(&self, document_id: &str, message: &str) {
        if let Err(e) = self
            .documents
            .update_status(document_id, DocumentStatus::Failed, Some(message))
            .await
        {
            warn!(
                doc_id = %document_id,
                error = %e,
                "Failed to record document failure"
            );
        }
    }

    /// Delete a replaced content blob; errors are logged and otherwise ignored
    pub(crate) async fn discard_previous_content(&self, document: &Document, new_key: &str) {
        if !document.has_content() || document.content_key == new_key {
            return;
        }

        if let Err(e) = self.blobs.delete(&document.content_key).await {
            warn!(
                doc_id = %document.id,
                key = %document.content_key,
                error = %e,
                "Failed to delete previous content"
            );
        }
    }

    /// Drop content uploaded for a document whose row disappeared mid-job
    pub(crate) async fn discard_orphaned_content(&self, document_id: &str, key: &str) {
        if let Err(e) = self.blobs.delete(key).await {
            warn!(doc_id = %document_id, key = %key, error = %e, "Failed to delete orphaned content");
        }
    }
}
