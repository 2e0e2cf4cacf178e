//! In-memory collaborators for pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::PipelineConfig;
use crate::db::{ContentUpdate, Document, DocumentStatus, ResearchConfig};
use crate::error::{DatabaseError, FetchError, QueueError, ResearchError, StorageError};
use crate::fetch::{ContentFetcher, FetchedPage};
use crate::queue::{Job, JobQueue, JobStatus, JobType};
use crate::repository::{DocumentRepository, RepositoryResult};
use crate::research::{ResearchProvider, ResearchResult};
use crate::service::{Collaborators, IngestionService};
use crate::storage::{BlobStore, StorageResult};

#[derive(Default)]
pub struct MemoryRepository {
    documents: Mutex<HashMap<String, Document>>,
    fail_status_updates: AtomicBool,
}

impl MemoryRepository {
    pub fn get(&self, id: &str) -> Option<Document> {
        self.documents.lock().unwrap().get(id).cloned()
    }

    pub fn put(&self, document: Document) {
        self.documents
            .lock()
            .unwrap()
            .insert(document.id.clone(), document);
    }

    pub fn all(&self) -> Vec<Document> {
        self.documents.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    pub fn fail_status_updates(&self, fail: bool) {
        self.fail_status_updates.store(fail, Ordering::SeqCst);
    }

    fn modify(&self, id: &str, f: impl FnOnce(&mut Document)) -> bool {
        let mut documents = self.documents.lock().unwrap();
        match documents.get_mut(id) {
            Some(document) => {
                f(document);
                document.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl DocumentRepository for MemoryRepository {
    async fn insert(&self, document: &Document) -> RepositoryResult<()> {
        self.put(document.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Document>> {
        Ok(self.get(id))
    }

    async fn find_by_ids(&self, ids: &[String]) -> RepositoryResult<Vec<Document>> {
        let documents = self.documents.lock().unwrap();
        Ok(ids.iter().filter_map(|id| documents.get(id).cloned()).collect())
    }

    async fn update(&self, document: &Document) -> RepositoryResult<bool> {
        let replacement = document.clone();
        Ok(self.modify(&document.id, |stored| *stored = replacement))
    }

    async fn delete(&self, id: &str) -> RepositoryResult<bool> {
        Ok(self.documents.lock().unwrap().remove(id).is_some())
    }

    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> RepositoryResult<bool> {
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(DatabaseError::Migration {
                message: "status updates disabled".to_string(),
            });
        }
        Ok(self.modify(id, |stored| {
            stored.status = status;
            stored.error_message = error_message.map(str::to_string);
        }))
    }

    async fn update_content(&self, id: &str, update: &ContentUpdate) -> RepositoryResult<bool> {
        Ok(self.modify(id, |stored| {
            stored.content_key = update.content_key.clone();
            stored.extracted_text = Some(update.extracted_text.clone());
            stored.content_hash = Some(update.content_hash.clone());
            stored.word_count = update.word_count;
            if let Some(title) = &update.title {
                stored.title = title.clone();
            }
            if let Some(metadata) = &update.metadata {
                stored.metadata = metadata.clone();
            }
        }))
    }

    async fn update_research_config(
        &self,
        id: &str,
        config: &ResearchConfig,
    ) -> RepositoryResult<bool> {
        Ok(self.modify(id, |stored| {
            stored.research_config = Some(config.clone());
        }))
    }

    async fn find_by_source_url(
        &self,
        source_url: &str,
        owner_id: &str,
    ) -> RepositoryResult<Option<Document>> {
        let documents = self.documents.lock().unwrap();
        Ok(documents
            .values()
            .filter(|d| d.source_url.as_deref() == Some(source_url) && d.created_by == owner_id)
            .max_by_key(|d| d.created_at)
            .cloned())
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<Job>>,
    fail: AtomicBool,
}

impl RecordingQueue {
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn fail_enqueues(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        owner_id: &str,
    ) -> Result<Job, QueueError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(QueueError::Enqueue {
                job_type: job_type.to_string(),
                message: "queue unavailable".to_string(),
            });
        }

        let now = Utc::now();
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            job_type,
            payload,
            owner_id: owner_id.to_string(),
            status: JobStatus::Pending,
            attempts: 0,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.lock().unwrap().push(job.clone());
        Ok(job)
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    key_prefix: Mutex<Option<String>>,
    fail_uploads: AtomicBool,
}

impl MemoryBlobStore {
    /// Store every upload under `prefix` + the requested key
    pub fn rewrite_keys(&self, prefix: &str) {
        *self.key_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> StorageResult<String> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::other("disk full"),
            });
        }

        let stored_key = match self.key_prefix.lock().unwrap().as_deref() {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key.to_string(),
        };
        self.blobs.lock().unwrap().insert(stored_key.clone(), bytes);
        Ok(stored_key)
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Research provider returning scripted poll results; an exhausted script means "still running"
#[derive(Default)]
pub struct ScriptedResearchProvider {
    polls: Mutex<VecDeque<Option<ResearchResult>>>,
    polled_ids: Mutex<Vec<String>>,
    start_calls: AtomicUsize,
    fail_polls: AtomicBool,
}

impl ScriptedResearchProvider {
    pub fn with_polls(polls: impl IntoIterator<Item = Option<ResearchResult>>) -> Self {
        Self {
            polls: Mutex::new(polls.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn polled_ids(&self) -> Vec<String> {
        self.polled_ids.lock().unwrap().clone()
    }

    pub fn fail_polls(&self, fail: bool) {
        self.fail_polls.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResearchProvider for ScriptedResearchProvider {
    async fn start_research(&self, _query: &str) -> Result<String, ResearchError> {
        let n = self.start_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("op-{}", n))
    }

    async fn get_result(
        &self,
        interaction_id: &str,
    ) -> Result<Option<ResearchResult>, ResearchError> {
        self.polled_ids
            .lock()
            .unwrap()
            .push(interaction_id.to_string());
        if self.fail_polls.load(Ordering::SeqCst) {
            return Err(ResearchError::Request {
                status: 503,
                message: "provider unavailable".to_string(),
            });
        }
        Ok(self.polls.lock().unwrap().pop_front().flatten())
    }
}

/// Fetcher returning one fixed page, or failing when none is set
#[derive(Default)]
pub struct StaticFetcher {
    page: Option<FetchedPage>,
}

impl StaticFetcher {
    pub fn page(page: FetchedPage) -> Self {
        Self { page: Some(page) }
    }

    pub fn failing() -> Self {
        Self { page: None }
    }
}

#[async_trait]
impl ContentFetcher for StaticFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        self.page.clone().ok_or_else(|| FetchError::NoContent {
            url: url.to_string(),
        })
    }
}

pub fn research_result(content: &str, sources: usize) -> ResearchResult {
    ResearchResult {
        content: content.to_string(),
        sources: (0..sources)
            .map(|i| crate::db::ResearchSource {
                title: format!("Source {}", i + 1),
                url: format!("https://example.com/source/{}", i + 1),
            })
            .collect(),
        word_count: crate::content::word_count(content),
    }
}

/// A service wired to in-memory collaborators, with handles for inspecting them
pub struct Harness {
    pub service: Arc<IngestionService>,
    pub documents: Arc<MemoryRepository>,
    pub queue: Arc<RecordingQueue>,
    pub blobs: Arc<MemoryBlobStore>,
    pub research: Arc<ScriptedResearchProvider>,
    pub shutdown: CancellationToken,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(ScriptedResearchProvider::default(), StaticFetcher::failing())
    }

    pub fn with_research(research: ScriptedResearchProvider) -> Self {
        Self::build(research, StaticFetcher::failing())
    }

    pub fn with_page(page: FetchedPage) -> Self {
        Self::build(ScriptedResearchProvider::default(), StaticFetcher::page(page))
    }

    fn build(research: ScriptedResearchProvider, fetcher: StaticFetcher) -> Self {
        let documents = Arc::new(MemoryRepository::default());
        let queue = Arc::new(RecordingQueue::default());
        let blobs = Arc::new(MemoryBlobStore::default());
        let research = Arc::new(research);
        let shutdown = CancellationToken::new();

        let service = Arc::new(IngestionService::new(
            Collaborators {
                documents: documents.clone(),
                queue: queue.clone(),
                blobs: blobs.clone(),
                research: research.clone(),
                fetcher: Arc::new(fetcher),
            },
            PipelineConfig::default(),
            shutdown.clone(),
        ));

        Self {
            service,
            documents,
            queue,
            blobs,
            research,
            shutdown,
        }
    }
}
