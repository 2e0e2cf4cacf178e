//! Document persistence contract consumed by the pipeline.
//!
//! The pipeline never retries these calls; a failure surfaces as [`DatabaseError`].

use async_trait::async_trait;

use crate::db::{ContentUpdate, Document, DocumentStatus, ResearchConfig};
use crate::error::DatabaseError;

pub type RepositoryResult<T> = Result<T, DatabaseError>;

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn insert(&self, document: &Document) -> RepositoryResult<()>;

    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Document>>;

    /// Documents for the given ids; ids with no row are simply absent from the result
    async fn find_by_ids(&self, ids: &[String]) -> RepositoryResult<Vec<Document>>;

    /// Replace every mutable column of an existing row
    async fn update(&self, document: &Document) -> RepositoryResult<bool>;

    async fn delete(&self, id: &str) -> RepositoryResult<bool>;

    /// Set the lifecycle status. `error_message` is stored as given, so callers clear it
    /// by passing `None`.
    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> RepositoryResult<bool>;

    async fn update_content(&self, id: &str, update: &ContentUpdate) -> RepositoryResult<bool>;

    async fn update_research_config(
        &self,
        id: &str,
        config: &ResearchConfig,
    ) -> RepositoryResult<bool>;

    /// Most recent document for `(source_url, owner_id)` in any status
    async fn find_by_source_url(
        &self,
        source_url: &str,
        owner_id: &str,
    ) -> RepositoryResult<Option<Document>>;
}
