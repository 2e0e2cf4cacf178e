//! `process-research` job handler.
//!
//! A research operation can outlive the worker running it, so its progress lives on the
//! document: `operation_id` plus `research_status = in_progress` is written before the first
//! wait. A redelivered job finding that pair resumes polling the same operation instead of
//! starting a new one.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::content;
use crate::db::{ContentUpdate, Document, DocumentStatus, ResearchConfig, ResearchStatus};
use crate::error::{ServiceError, ServiceResult};
use crate::queue::{JobType, ProcessResearchPayload};
use crate::research::ResearchResult;
use crate::service::IngestionService;

const EMPTY_CONTENT_MESSAGE: &str = "Research completed but returned no content";

fn record_outcome(outcome: &'static str) {
    metrics::counter!(
        "docflow_job_outcomes_total",
        "job_type" => JobType::ProcessResearch.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

impl IngestionService {
    /// Run or resume the research operation for a document and store its report.
    pub async fn process_research(&self, payload: &ProcessResearchPayload) -> ServiceResult<()> {
        let document = self.require_document(&payload.document_id).await?;

        match self.run_research(&document, &payload.query).await {
            Ok(()) => {
                record_outcome("ready");
                Ok(())
            }
            Err(ServiceError::Cancelled) => {
                record_outcome("cancelled");
                info!(
                    doc_id = %document.id,
                    "Research job interrupted by shutdown, operation left resumable"
                );
                Err(ServiceError::Cancelled)
            }
            // These paths already recorded their own failure, or have no row left to mark
            Err(
                e @ (ServiceError::ResearchTimeout { .. }
                | ServiceError::ResearchEmptyContent { .. }
                | ServiceError::DocumentNotFound { .. }),
            ) => {
                record_outcome("failed");
                error!(doc_id = %document.id, error = %e, "Research job failed");
                Err(e)
            }
            Err(e) => {
                record_outcome("failed");
                error!(doc_id = %document.id, error = %e, "Research job failed");
                self.record_failure(&document.id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn run_research(&self, document: &Document, query: &str) -> ServiceResult<()> {
        let mut config = document
            .research_config
            .clone()
            .unwrap_or_else(|| ResearchConfig::new(query));

        let interaction_id = match config.resumable_operation() {
            Some(id) => {
                info!(doc_id = %document.id, interaction_id = %id, "Resuming research operation");
                id.to_string()
            }
            None => {
                let id = self.research.start_research(&config.query).await?;
                config.operation_id = Some(id.clone());
                config.research_status = Some(ResearchStatus::InProgress);
                config.source_count = None;
                config.sources.clear();
                self.documents
                    .update_research_config(&document.id, &config)
                    .await?;
                info!(doc_id = %document.id, interaction_id = %id, "Started research operation");
                id
            }
        };

        let Some(result) = self.poll_research(&document.id, &interaction_id).await? else {
            let max_wait = self.pipeline.research_polling.max_wait();
            warn!(
                doc_id = %document.id,
                interaction_id = %interaction_id,
                waited_secs = max_wait.as_secs(),
                "Research operation timed out"
            );
            let message = format!(
                "Research timed out after {} minutes",
                max_wait.as_secs() / 60
            );
            self.abandon_research(&document.id, &mut config, &message)
                .await;
            return Err(ServiceError::ResearchTimeout {
                document_id: document.id.clone(),
                interaction_id,
            });
        };

        if result.content.trim().is_empty() {
            warn!(doc_id = %document.id, interaction_id = %interaction_id, "Research returned no content");
            self.abandon_research(&document.id, &mut config, EMPTY_CONTENT_MESSAGE)
                .await;
            return Err(ServiceError::ResearchEmptyContent {
                document_id: document.id.clone(),
                interaction_id,
            });
        }

        self.store_research_result(document, config, result).await
    }

    /// Poll until the operation yields a result, or `None` once the wait ceiling is reached.
    ///
    /// The first empty poll sleeps the initial delay and every later one the regular interval.
    /// Only slept time counts toward the ceiling, and no poll follows the final sleep.
    async fn poll_research(
        &self,
        document_id: &str,
        interaction_id: &str,
    ) -> ServiceResult<Option<ResearchResult>> {
        let polling = &self.pipeline.research_polling;
        let mut interval = polling.first_delay();
        let mut waited = Duration::ZERO;
        let mut polls: u32 = 0;

        loop {
            polls += 1;
            metrics::counter!("docflow_research_polls_total").increment(1);
            if let Some(result) = self.research.get_result(interaction_id).await? {
                debug!(doc_id = %document_id, interaction_id = %interaction_id, polls, "Research result available");
                return Ok(Some(result));
            }

            debug!(
                doc_id = %document_id,
                interaction_id = %interaction_id,
                polls,
                waited_secs = waited.as_secs(),
                "Research still running"
            );

            self.pause(interval).await?;
            waited += interval;
            if waited >= polling.max_wait() {
                return Ok(None);
            }
            interval = polling.poll_interval();
        }
    }

    /// Record a failed operation on both the research config and the document
    async fn abandon_research(&self, document_id: &str, config: &mut ResearchConfig, message: &str) {
        config.research_status = Some(ResearchStatus::Failed);
        if let Err(e) = self
            .documents
            .update_research_config(document_id, config)
            .await
        {
            warn!(doc_id = %document_id, error = %e, "Failed to record research failure");
        }
        self.record_failure(document_id, message).await;
    }

    async fn store_research_result(
        &self,
        document: &Document,
        mut config: ResearchConfig,
        result: ResearchResult,
    ) -> ServiceResult<()> {
        let requested_key = format!("documents/{}/content.txt", document.id);
        let key = self
            .blobs
            .upload(&requested_key, result.content.clone().into_bytes(), "text/plain")
            .await?;

        let word_count = content::word_count(&result.content);
        let update = ContentUpdate {
            content_key: key.clone(),
            content_hash: content::content_hash(&result.content),
            extracted_text: result.content,
            word_count,
            title: None,
            metadata: None,
        };
        if !self.documents.update_content(&document.id, &update).await? {
            self.discard_orphaned_content(&document.id, &key).await;
            return Err(ServiceError::DocumentNotFound {
                document_id: document.id.clone(),
            });
        }
        self.discard_previous_content(document, &key).await;

        config.research_status = Some(ResearchStatus::Completed);
        config.source_count = Some(result.sources.len());
        config.sources = result.sources;
        let found = self
            .documents
            .update_research_config(&document.id, &config)
            .await?
            && self
                .documents
                .update_status(&document.id, DocumentStatus::Ready, None)
                .await?;
        if !found {
            self.discard_orphaned_content(&document.id, &key).await;
            return Err(ServiceError::DocumentNotFound {
                document_id: document.id.clone(),
            });
        }

        info!(
            doc_id = %document.id,
            word_count,
            sources = config.sources.len(),
            "Research document ready"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DocumentSource;
    use crate::repository::DocumentRepository;
    use crate::service::{CreateFromResearchRequest, UserContext};
    use crate::testing::{Harness, ScriptedResearchProvider, research_result};

    async fn submit(harness: &Harness) -> (Document, ProcessResearchPayload) {
        let document = harness
            .service
            .create_from_research(
                &UserContext::new("alice"),
                CreateFromResearchRequest {
                    query: "history of tea".to_string(),
                    title: None,
                },
            )
            .await
            .unwrap();
        let payload = harness.queue.jobs()[0].payload_as().unwrap();
        (document, payload)
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_resolves_on_third_poll() {
        let research = ScriptedResearchProvider::with_polls([
            None,
            None,
            Some(research_result("Tea comes from China", 2)),
        ]);
        let harness = Harness::with_research(research);
        let (document, payload) = submit(&harness).await;

        let started = tokio::time::Instant::now();
        harness.service.process_research(&payload).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(30 + 60));

        assert_eq!(harness.research.start_calls(), 1);
        assert_eq!(harness.research.polled_ids(), vec!["op-1"; 3]);

        let stored = harness.documents.get(&document.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Ready);
        assert_eq!(stored.source, DocumentSource::Research);
        assert_eq!(stored.word_count, 4);
        assert_eq!(stored.content_key, format!("documents/{}/content.txt", document.id));
        assert_eq!(
            harness.blobs.get(&stored.content_key).as_deref(),
            Some("Tea comes from China")
        );

        let config = stored.research_config.unwrap();
        assert_eq!(config.query, "history of tea");
        assert_eq!(config.operation_id.as_deref(), Some("op-1"));
        assert_eq!(config.research_status, Some(ResearchStatus::Completed));
        assert_eq!(config.source_count, Some(2));
        assert_eq!(config.sources.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_result_does_not_sleep() {
        let research =
            ScriptedResearchProvider::with_polls([Some(research_result("Ready at once", 0))]);
        let harness = Harness::with_research(research);
        let (_, payload) = submit(&harness).await;

        let started = tokio::time::Instant::now();
        harness.service.process_research(&payload).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_skips_start() {
        let research = ScriptedResearchProvider::with_polls([Some(research_result("Done", 1))]);
        let harness = Harness::with_research(research);
        let (document, payload) = submit(&harness).await;

        let mut config = ResearchConfig::new("history of tea");
        config.operation_id = Some("op-existing".to_string());
        config.research_status = Some(ResearchStatus::InProgress);
        let mut stored = harness.documents.get(&document.id).unwrap();
        stored.research_config = Some(config);
        harness.documents.put(stored);

        harness.service.process_research(&payload).await.unwrap();

        assert_eq!(harness.research.start_calls(), 0);
        assert_eq!(harness.research.polled_ids(), vec!["op-existing"]);
        let config = harness
            .documents
            .get(&document.id)
            .unwrap()
            .research_config
            .unwrap();
        assert_eq!(config.operation_id.as_deref(), Some("op-existing"));
        assert_eq!(config.research_status, Some(ResearchStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_operation_starts_fresh() {
        let research = ScriptedResearchProvider::with_polls([Some(research_result("Again", 0))]);
        let harness = Harness::with_research(research);
        let (document, payload) = submit(&harness).await;

        let mut config = ResearchConfig::new("history of tea");
        config.operation_id = Some("op-old".to_string());
        config.research_status = Some(ResearchStatus::Failed);
        let mut stored = harness.documents.get(&document.id).unwrap();
        stored.research_config = Some(config);
        harness.documents.put(stored);

        harness.service.process_research(&payload).await.unwrap();

        assert_eq!(harness.research.start_calls(), 1);
        assert_eq!(harness.research.polled_ids(), vec!["op-1"]);
        let config = harness
            .documents
            .get(&document.id)
            .unwrap()
            .research_config
            .unwrap();
        assert_eq!(config.operation_id.as_deref(), Some("op-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_document_and_operation_failed() {
        let harness = Harness::new();
        let (document, payload) = submit(&harness).await;

        let started = tokio::time::Instant::now();
        let err = harness.service.process_research(&payload).await.unwrap_err();
        // 30 s, then 60 s sleeps until at least an hour has been slept
        assert_eq!(started.elapsed(), Duration::from_secs(30 + 60 * 60));

        assert!(matches!(
            err,
            ServiceError::ResearchTimeout { ref document_id, ref interaction_id }
                if *document_id == document.id && interaction_id == "op-1"
        ));
        // One poll before each of the 61 sleeps, none after the last
        assert_eq!(harness.research.polled_ids().len(), 61);

        let stored = harness.documents.get(&document.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert_eq!(
            stored.error_message.as_deref(),
            Some("Research timed out after 60 minutes")
        );
        assert_eq!(
            stored.research_config.unwrap().research_status,
            Some(ResearchStatus::Failed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_content_fails() {
        let research = ScriptedResearchProvider::with_polls([Some(research_result("  \n ", 0))]);
        let harness = Harness::with_research(research);
        let (document, payload) = submit(&harness).await;

        let err = harness.service.process_research(&payload).await.unwrap_err();
        assert!(matches!(err, ServiceError::ResearchEmptyContent { .. }));

        let stored = harness.documents.get(&document.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some(EMPTY_CONTENT_MESSAGE));
        assert_eq!(
            stored.research_config.unwrap().research_status,
            Some(ResearchStatus::Failed)
        );
        assert!(harness.blobs.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_leaves_operation_resumable() {
        let harness = Harness::new();
        let (document, payload) = submit(&harness).await;
        harness.shutdown.cancel();

        let err = harness.service.process_research(&payload).await.unwrap_err();
        assert!(matches!(err, ServiceError::Cancelled));

        let stored = harness.documents.get(&document.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Processing);
        assert!(stored.error_message.is_none());
        let config = stored.research_config.unwrap();
        assert_eq!(config.resumable_operation(), Some("op-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_document_deleted_while_polling() {
        let research = ScriptedResearchProvider::with_polls([
            None,
            Some(research_result("Body text", 1)),
        ]);
        let harness = Harness::with_research(research);
        let (document, payload) = submit(&harness).await;

        let documents = harness.documents.clone();
        let id = document.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            documents.delete(&id).await.unwrap();
        });

        let err = harness.service.process_research(&payload).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::DocumentNotFound { ref document_id } if *document_id == document.id
        ));
        assert!(harness.documents.get(&document.id).is_none());
        assert!(harness.blobs.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_key_is_the_key_the_store_wrote() {
        let research = ScriptedResearchProvider::with_polls([Some(research_result("Body text", 0))]);
        let harness = Harness::with_research(research);
        harness.blobs.rewrite_keys("tenant-a/");
        let (document, payload) = submit(&harness).await;

        harness.service.process_research(&payload).await.unwrap();

        let stored = harness.documents.get(&document.id).unwrap();
        assert_eq!(
            stored.content_key,
            format!("tenant-a/documents/{}/content.txt", document.id)
        );
        assert_eq!(harness.blobs.get(&stored.content_key).as_deref(), Some("Body text"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_marks_document_failed() {
        let harness = Harness::new();
        harness.research.fail_polls(true);
        let (document, payload) = submit(&harness).await;

        let err = harness.service.process_research(&payload).await.unwrap_err();
        assert!(matches!(err, ServiceError::Research(_)));

        let stored = harness.documents.get(&document.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert_eq!(stored.error_message, Some(err.to_string()));
        // The operation was started, so a retry can still resume it
        assert_eq!(
            stored.research_config.unwrap().resumable_operation(),
            Some("op-1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_error_marks_document_failed() {
        let research = ScriptedResearchProvider::with_polls([Some(research_result("Body text", 0))]);
        let harness = Harness::with_research(research);
        harness.blobs.fail_uploads(true);
        let (document, payload) = submit(&harness).await;

        let err = harness.service.process_research(&payload).await.unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)));

        let stored = harness.documents.get(&document.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert_eq!(stored.error_message, Some(err.to_string()));
        assert!(harness.blobs.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_recording_failure_keeps_original_error() {
        let harness = Harness::new();
        harness.research.fail_polls(true);
        let (document, payload) = submit(&harness).await;
        harness.documents.fail_status_updates(true);

        let err = harness.service.process_research(&payload).await.unwrap_err();
        assert!(matches!(err, ServiceError::Research(_)));
        assert_eq!(
            harness.documents.get(&document.id).unwrap().status,
            DocumentStatus::Processing
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_document() {
        let harness = Harness::new();
        let payload = ProcessResearchPayload {
            document_id: "missing".to_string(),
            query: "q".to_string(),
            user_id: "alice".to_string(),
        };

        let err = harness.service.process_research(&payload).await.unwrap_err();
        assert!(matches!(err, ServiceError::DocumentNotFound { .. }));
        assert_eq!(harness.research.start_calls(), 0);
    }
}
