//! Readiness barrier for features that consume finished documents.

use std::time::Duration;

use tracing::{debug, info};

use crate::db::{Document, DocumentStatus};
use crate::error::{ServiceError, ServiceResult};
use crate::service::IngestionService;

impl IngestionService {
    /// Wait until every listed document is `ready`, returning them in the order given.
    ///
    /// Fails immediately when any document has failed or no longer exists, and with
    /// [`ServiceError::DocumentsNotReadyTimeout`] once the wait ceiling is reached. Read-only.
    pub async fn await_documents_ready(&self, document_ids: &[String]) -> ServiceResult<Vec<Document>> {
        if document_ids.is_empty() {
            return Ok(Vec::new());
        }

        let readiness = &self.pipeline.readiness;
        let mut waited = Duration::ZERO;

        loop {
            let found = self.documents.find_by_ids(document_ids).await?;

            let mut documents = Vec::with_capacity(document_ids.len());
            for id in document_ids {
                let document = found.iter().find(|d| &d.id == id).ok_or_else(|| {
                    ServiceError::DocumentNotFound {
                        document_id: id.clone(),
                    }
                })?;
                documents.push(document.clone());
            }

            let failed = ids_with_status(&documents, DocumentStatus::Failed);
            if !failed.is_empty() {
                info!(document_ids = ?failed, "Awaited documents failed");
                return Err(ServiceError::DocumentsNotReadyTimeout {
                    document_ids: failed,
                });
            }

            let pending = ids_with_status(&documents, DocumentStatus::Processing);
            if pending.is_empty() {
                return Ok(documents);
            }

            if waited >= readiness.max_wait() {
                info!(document_ids = ?pending, waited_secs = waited.as_secs(), "Documents not ready before ceiling");
                return Err(ServiceError::DocumentsNotReadyTimeout {
                    document_ids: pending,
                });
            }

            debug!(pending = pending.len(), waited_secs = waited.as_secs(), "Waiting for documents");
            self.pause(readiness.poll_interval()).await?;
            waited += readiness.poll_interval();
        }
    }
}

fn ids_with_status(documents: &[Document], status: DocumentStatus) -> Vec<String> {
    let mut ids: Vec<String> = documents
        .iter()
        .filter(|d| d.status == status)
        .map(|d| d.id.clone())
        .collect();
    ids.dedup();
    ids
}
