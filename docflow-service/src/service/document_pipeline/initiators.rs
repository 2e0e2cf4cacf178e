//! Document creation from URLs and research queries.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::db::{Document, DocumentSource, DocumentStatus, ResearchConfig};
use crate::error::{QueueError, ServiceError, ServiceResult};
use crate::queue::{JobType, ProcessResearchPayload, ProcessUrlPayload};
use crate::service::{IngestionService, UserContext};
use crate::url_safety;

/// Longest title derived from a research query
const MAX_RESEARCH_TITLE_CHARS: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFromUrlRequest {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFromResearchRequest {
    pub query: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Title given to a URL document until the page supplies its own
pub(crate) fn default_url_title(url: &Url) -> String {
    format!("{}{}", url.host_str().unwrap_or_default(), url.path())
}

fn explicit_title(title: Option<String>) -> Option<String> {
    title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

impl IngestionService {
    /// Create a document from a web page and enqueue its `process-url` job.
    ///
    /// Submitting a URL the caller already has returns the ready document unchanged, refuses
    /// while an earlier submission is still processing, and replaces a failed one.
    pub async fn create_from_url(
        &self,
        user: &UserContext,
        request: CreateFromUrlRequest,
    ) -> ServiceResult<Document> {
        let url = url_safety::validate(&request.url)?;
        let normalized = url.as_str().to_string();

        if let Some(existing) = self
            .documents
            .find_by_source_url(&normalized, &user.user_id)
            .await?
        {
            match existing.status {
                DocumentStatus::Ready => {
                    info!(doc_id = %existing.id, url = %normalized, "URL already ingested");
                    return Ok(existing);
                }
                DocumentStatus::Processing => {
                    return Err(ServiceError::DocumentAlreadyProcessing {
                        document_id: existing.id,
                    });
                }
                DocumentStatus::Failed => {
                    info!(doc_id = %existing.id, url = %normalized, "Replacing failed URL document");
                    self.documents.delete(&existing.id).await?;
                }
            }
        }

        let title = explicit_title(request.title).unwrap_or_else(|| default_url_title(&url));
        let mut document = Document::new_processing(title, &user.user_id, DocumentSource::Url);
        document.source_url = Some(normalized.clone());
        if let Some(metadata) = request.metadata {
            document.metadata = metadata;
        }

        self.documents.insert(&document).await?;
        metrics::counter!("docflow_documents_created_total", "source" => "url").increment(1);
        info!(doc_id = %document.id, url = %normalized, "Created URL document");

        let payload = ProcessUrlPayload {
            document_id: document.id.clone(),
            url: normalized,
            user_id: user.user_id.clone(),
        };
        self.dispatch(&document, JobType::ProcessUrl, &payload)
            .await?;

        Ok(document)
    }

    /// Create a document from a deep research query and enqueue its `process-research` job
    pub async fn create_from_research(
        &self,
        user: &UserContext,
        request: CreateFromResearchRequest,
    ) -> ServiceResult<Document> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "Research query must not be empty".to_string(),
            });
        }

        let title = explicit_title(request.title)
            .unwrap_or_else(|| query.chars().take(MAX_RESEARCH_TITLE_CHARS).collect());
        let mut document =
            Document::new_processing(title, &user.user_id, DocumentSource::Research);
        document.research_config = Some(ResearchConfig::new(query));

        self.documents.insert(&document).await?;
        metrics::counter!("docflow_documents_created_total", "source" => "research")
            .increment(1);
        info!(doc_id = %document.id, "Created research document");

        let payload = ProcessResearchPayload {
            document_id: document.id.clone(),
            query: query.to_string(),
            user_id: user.user_id.clone(),
        };
        self.dispatch(&document, JobType::ProcessResearch, &payload)
            .await?;

        Ok(document)
    }

    /// Enqueue a job for a `processing` document.
    ///
    /// The row already exists, so an enqueue failure flips it to `failed` before the error is
    /// returned. If that also fails the row stays `processing`.
    pub(crate) async fn dispatch<P: Serialize>(
        &self,
        document: &Document,
        job_type: JobType,
        payload: &P,
    ) -> ServiceResult<()> {
        let result = match serde_json::to_value(payload) {
            Ok(payload) => self
                .queue
                .enqueue(job_type, payload, &document.created_by)
                .await,
            Err(e) => Err(QueueError::Payload(e)),
        };

        match result {
            Ok(job) => {
                metrics::counter!("docflow_jobs_enqueued_total", "job_type" => job_type.to_string())
                    .increment(1);
                info!(doc_id = %document.id, job_id = %job.id, job_type = %job_type, "Enqueued job");
                Ok(())
            }
            Err(e) => {
                metrics::counter!("docflow_compensations_total", "job_type" => job_type.to_string())
                    .increment(1);
                warn!(
                    doc_id = %document.id,
                    job_type = %job_type,
                    error = %e,
                    "Failed to enqueue job, marking document failed"
                );

                let message = format!("Failed to enqueue {} job: {}", job_type, e);
                if let Err(status_err) = self
                    .documents
                    .update_status(&document.id, DocumentStatus::Failed, Some(&message))
                    .await
                {
                    warn!(
                        doc_id = %document.id,
                        error = %status_err,
                        "Compensation failed, document left processing"
                    );
                }

                Err(e.into())
            }
        }
    }
}
