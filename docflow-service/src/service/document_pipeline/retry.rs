//! Re-arming failed documents.

use tracing::{info, warn};

use crate::db::{Document, DocumentSource, DocumentStatus};
use crate::error::{ServiceError, ServiceResult};
use crate::queue::{JobType, ProcessResearchPayload, ProcessUrlPayload};
use crate::service::{IngestionService, UserContext};

impl IngestionService {
    /// Move a failed document back to `processing` and enqueue the job for its source.
    ///
    /// Ready documents are returned unchanged. Research documents are retried with their
    /// original query.
    pub async fn retry_processing(
        &self,
        user: &UserContext,
        document_id: &str,
    ) -> ServiceResult<Document> {
        let document = self.require_document(document_id).await?;
        user.require_ownership(&document.created_by)?;

        match document.status {
            DocumentStatus::Processing => {
                return Err(ServiceError::DocumentAlreadyProcessing {
                    document_id: document.id,
                });
            }
            DocumentStatus::Ready => return Ok(document),
            DocumentStatus::Failed => {}
        }

        self.documents
            .update_status(&document.id, DocumentStatus::Processing, None)
            .await?;
        info!(doc_id = %document.id, source = %document.source, "Retrying document");

        match (document.source, &document.source_url, &document.research_config) {
            (DocumentSource::Url, Some(url), _) => {
                let payload = ProcessUrlPayload {
                    document_id: document.id.clone(),
                    url: url.clone(),
                    user_id: document.created_by.clone(),
                };
                self.dispatch(&document, JobType::ProcessUrl, &payload)
                    .await?;
            }
            (DocumentSource::Research, _, Some(config)) => {
                let payload = ProcessResearchPayload {
                    document_id: document.id.clone(),
                    query: config.query.clone(),
                    user_id: document.created_by.clone(),
                };
                self.dispatch(&document, JobType::ProcessResearch, &payload)
                    .await?;
            }
            _ => {
                warn!(
                    doc_id = %document.id,
                    source = %document.source,
                    "No job handles this source, document left processing"
                );
            }
        }

        self.require_document(&document.id).await
    }
}
