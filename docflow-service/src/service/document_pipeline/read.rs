//! Owner-checked document reads.

use crate::db::{Document, DocumentStatus};
use crate::error::{ServiceError, ServiceResult};
use crate::service::{IngestionService, UserContext};

impl IngestionService {
    /// Get a document the caller owns
    pub async fn get_document(&self, user: &UserContext, document_id: &str) -> ServiceResult<Document> {
        let document = self.require_document(document_id).await?;
        user.require_ownership(&document.created_by)?;
        Ok(document)
    }

    /// Get the extracted text of a ready document, falling back to blob storage when no copy
    /// is cached on the row
    pub async fn get_document_content(
        &self,
        user: &UserContext,
        document_id: &str,
    ) -> ServiceResult<String> {
        let document = self.get_document(user, document_id).await?;
        if document.status != DocumentStatus::Ready {
            return Err(ServiceError::InvalidRequest {
                message: format!("Document {} is {}, not ready", document.id, document.status),
            });
        }

        if let Some(text) = document.extracted_text {
            return Ok(text);
        }

        let bytes = self.blobs.download(&document.content_key).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
