//! `process-url` job handler.

use tracing::{error, info};

use crate::content;
use crate::db::{ContentUpdate, Document, DocumentStatus};
use crate::error::{ServiceError, ServiceResult};
use crate::queue::{JobType, ProcessUrlPayload};
use crate::service::IngestionService;
use crate::url_safety;

use super::initiators::default_url_title;

impl IngestionService {
    /// Fetch a URL document's page, store its text, and mark it ready.
    ///
    /// Any failure after the document is loaded marks it failed before the error is returned.
    pub async fn process_url(&self, payload: &ProcessUrlPayload) -> ServiceResult<()> {
        let document = self.require_document(&payload.document_id).await?;
        info!(doc_id = %document.id, url = %payload.url, "Processing URL document");

        match self.ingest_url(&document, &payload.url).await {
            Ok(word_count) => {
                metrics::counter!(
                    "docflow_job_outcomes_total",
                    "job_type" => JobType::ProcessUrl.to_string(),
                    "outcome" => "ready"
                )
                .increment(1);
                info!(doc_id = %document.id, word_count, "URL document ready");
                Ok(())
            }
            Err(e) => {
                metrics::counter!(
                    "docflow_job_outcomes_total",
                    "job_type" => JobType::ProcessUrl.to_string(),
                    "outcome" => "failed"
                )
                .increment(1);
                error!(doc_id = %document.id, error = %e, "URL processing failed");
                self.record_failure(&document.id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn ingest_url(&self, document: &Document, raw_url: &str) -> ServiceResult<usize> {
        let url = url_safety::validate(raw_url)?;
        let page = self.fetcher.fetch(&url).await?;

        let requested_key = format!("documents/{}/{}.txt", document.id, uuid::Uuid::new_v4());
        let key = self
            .blobs
            .upload(&requested_key, page.text.clone().into_bytes(), "text/plain")
            .await?;

        let mut metadata = document.metadata.clone();
        for (field, value) in [
            ("description", &page.description),
            ("author", &page.author),
            ("published_at", &page.published_at),
        ] {
            if let Some(value) = value {
                metadata.insert(field.to_string(), serde_json::Value::String(value.clone()));
            }
        }

        // Only replace a title the user did not choose
        let title = page
            .title
            .clone()
            .filter(|_| document.title == default_url_title(&url));

        let word_count = content::word_count(&page.text);
        let update = ContentUpdate {
            content_key: key.clone(),
            content_hash: content::content_hash(&page.text),
            extracted_text: page.text,
            word_count,
            title,
            metadata: Some(metadata),
        };
        if !self.documents.update_content(&document.id, &update).await? {
            self.discard_orphaned_content(&document.id, &key).await;
            return Err(ServiceError::DocumentNotFound {
                document_id: document.id.clone(),
            });
        }

        self.discard_previous_content(document, &key).await;

        self.documents
            .update_status(&document.id, DocumentStatus::Ready, None)
            .await?;

        Ok(word_count)
    }
}
