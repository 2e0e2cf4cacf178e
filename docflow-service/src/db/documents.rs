//! Document CRUD operations.
//!
//! This module contains the document queries and the [`DocumentRepository`]
//! implementation backed by them.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, params, params_from_iter};

use super::Database;
use super::models::{ContentUpdate, Document, DocumentStatus, ResearchConfig};
use crate::error::DatabaseError;
use crate::repository::{DocumentRepository, RepositoryResult};

const DOCUMENT_COLUMNS: &str = "id, title, created_by, content_key, mime_type, word_count, \
     extracted_text, content_hash, source, source_url, research_config, status, error_message, \
     metadata, original_file_name, original_file_size, created_at, updated_at";

fn metadata_json(
    metadata: &serde_json::Map<String, serde_json::Value>,
) -> RepositoryResult<Option<String>> {
    if metadata.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(metadata)
        .map(Some)
        .map_err(DatabaseError::Serialization)
}

fn research_config_json(config: Option<&ResearchConfig>) -> RepositoryResult<Option<String>> {
    config
        .map(serde_json::to_string)
        .transpose()
        .map_err(DatabaseError::Serialization)
}

impl Database {
    /// Insert a new document
    pub fn insert_document(&self, doc: &Document) -> RepositoryResult<()> {
        let metadata = metadata_json(&doc.metadata)?;
        let research_config = research_config_json(doc.research_config.as_ref())?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO documents ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                DOCUMENT_COLUMNS
            ),
            params![
                doc.id,
                doc.title,
                doc.created_by,
                doc.content_key,
                doc.mime_type,
                doc.word_count as i64,
                doc.extracted_text,
                doc.content_hash,
                doc.source.as_ref(),
                doc.source_url,
                research_config,
                doc.status.as_ref(),
                doc.error_message,
                metadata,
                doc.original_file_name,
                doc.original_file_size.map(|s| s as i64),
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    /// Get a document by ID
    pub fn get_document(&self, id: &str) -> RepositoryResult<Option<Document>> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
            params![id],
            Document::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
    }

    /// Get all documents matching the given IDs
    pub fn get_documents(&self, ids: &[String]) -> RepositoryResult<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().unwrap();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM documents WHERE id IN ({})",
                DOCUMENT_COLUMNS, placeholders
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params_from_iter(ids.iter()), Document::from_row)
            .map_err(DatabaseError::Query)?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row.map_err(DatabaseError::Query)?);
        }
        Ok(docs)
    }

    /// Replace all mutable columns of a document
    pub fn update_document(&self, doc: &Document) -> RepositoryResult<bool> {
        let metadata = metadata_json(&doc.metadata)?;
        let research_config = research_config_json(doc.research_config.as_ref())?;

        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute(
                "UPDATE documents SET title = ?1, content_key = ?2, mime_type = ?3, word_count = ?4, \
                 extracted_text = ?5, content_hash = ?6, source = ?7, source_url = ?8, \
                 research_config = ?9, status = ?10, error_message = ?11, metadata = ?12, \
                 original_file_name = ?13, original_file_size = ?14, updated_at = ?15 WHERE id = ?16",
                params![
                    doc.title,
                    doc.content_key,
                    doc.mime_type,
                    doc.word_count as i64,
                    doc.extracted_text,
                    doc.content_hash,
                    doc.source.as_ref(),
                    doc.source_url,
                    research_config,
                    doc.status.as_ref(),
                    doc.error_message,
                    metadata,
                    doc.original_file_name,
                    doc.original_file_size.map(|s| s as i64),
                    Utc::now().to_rfc3339(),
                    doc.id,
                ],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Delete a document
    pub fn delete_document(&self, id: &str) -> RepositoryResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Update document status and error message
    pub fn update_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> RepositoryResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute(
                "UPDATE documents SET status = ?1, error_message = ?2, updated_at = ?3 WHERE id = ?4",
                params![status.as_ref(), error_message, Utc::now().to_rfc3339(), id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Store extracted content; title and metadata are only replaced when provided
    pub fn update_document_content(
        &self,
        id: &str,
        update: &ContentUpdate,
    ) -> RepositoryResult<bool> {
        let metadata = update
            .metadata
            .as_ref()
            .map(metadata_json)
            .transpose()?
            .flatten();

        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute(
                "UPDATE documents SET content_key = ?1, extracted_text = ?2, content_hash = ?3, \
                 word_count = ?4, title = COALESCE(?5, title), \
                 metadata = CASE WHEN ?6 THEN ?7 ELSE metadata END, updated_at = ?8 WHERE id = ?9",
                params![
                    update.content_key,
                    update.extracted_text,
                    update.content_hash,
                    update.word_count as i64,
                    update.title,
                    update.metadata.is_some(),
                    metadata,
                    Utc::now().to_rfc3339(),
                    id,
                ],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Persist the research state of a document
    pub fn update_document_research_config(
        &self,
        id: &str,
        config: &ResearchConfig,
    ) -> RepositoryResult<bool> {
        let research_config = research_config_json(Some(config))?;

        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute(
                "UPDATE documents SET research_config = ?1, updated_at = ?2 WHERE id = ?3",
                params![research_config, Utc::now().to_rfc3339(), id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Find the most recent document for a source URL and owner
    pub fn get_document_by_source_url(
        &self,
        source_url: &str,
        owner_id: &str,
    ) -> RepositoryResult<Option<Document>> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!(
                "SELECT {} FROM documents WHERE source_url = ?1 AND created_by = ?2 \
                 ORDER BY created_at DESC LIMIT 1",
                DOCUMENT_COLUMNS
            ),
            params![source_url, owner_id],
            Document::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
    }
}

#[async_trait]
impl DocumentRepository for Database {
    async fn insert(&self, document: &Document) -> RepositoryResult<()> {
        self.insert_document(document)
    }

    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Document>> {
        self.get_document(id)
    }

    async fn find_by_ids(&self, ids: &[String]) -> RepositoryResult<Vec<Document>> {
        self.get_documents(ids)
    }

    async fn update(&self, document: &Document) -> RepositoryResult<bool> {
        self.update_document(document)
    }

    async fn delete(&self, id: &str) -> RepositoryResult<bool> {
        self.delete_document(id)
    }

    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> RepositoryResult<bool> {
        self.update_document_status(id, status, error_message)
    }

    async fn update_content(&self, id: &str, update: &ContentUpdate) -> RepositoryResult<bool> {
        self.update_document_content(id, update)
    }

    async fn update_research_config(
        &self,
        id: &str,
        config: &ResearchConfig,
    ) -> RepositoryResult<bool> {
        self.update_document_research_config(id, config)
    }

    async fn find_by_source_url(
        &self,
        source_url: &str,
        owner_id: &str,
    ) -> RepositoryResult<Option<Document>> {
        self.get_document_by_source_url(source_url, owner_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DocumentSource, ResearchStatus};

    fn url_document(owner: &str, url: &str) -> Document {
        let mut doc = Document::new_processing("example.com/a", owner, DocumentSource::Url);
        doc.source_url = Some(url.to_string());
        doc
    }

    #[test]
    fn test_insert_and_get_document() {
        let db = Database::open_in_memory().unwrap();
        let mut doc = url_document("user-1", "https://example.com/a");
        doc.metadata
            .insert("lang".to_string(), serde_json::json!("en"));
        db.insert_document(&doc).unwrap();

        let loaded = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(loaded.id, doc.id);
        assert_eq!(loaded.source, DocumentSource::Url);
        assert_eq!(loaded.status, DocumentStatus::Processing);
        assert_eq!(loaded.source_url.as_deref(), Some("https://example.com/a"));
        assert_eq!(loaded.metadata.get("lang"), Some(&serde_json::json!("en")));
        assert!(loaded.research_config.is_none());

        assert!(db.get_document("missing").unwrap().is_none());
    }

    #[test]
    fn test_get_documents_skips_missing_ids() {
        let db = Database::open_in_memory().unwrap();
        let a = url_document("user-1", "https://example.com/a");
        let b = url_document("user-1", "https://example.com/b");
        db.insert_document(&a).unwrap();
        db.insert_document(&b).unwrap();

        let docs = db
            .get_documents(&[a.id.clone(), "nope".to_string(), b.id.clone()])
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert!(db.get_documents(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_status_update_sets_and_clears_error() {
        let db = Database::open_in_memory().unwrap();
        let doc = url_document("user-1", "https://example.com/a");
        db.insert_document(&doc).unwrap();

        assert!(
            db.update_document_status(&doc.id, DocumentStatus::Failed, Some("boom"))
                .unwrap()
        );
        let failed = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(failed.status, DocumentStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));

        db.update_document_status(&doc.id, DocumentStatus::Processing, None)
            .unwrap();
        let processing = db.get_document(&doc.id).unwrap().unwrap();
        assert!(processing.error_message.is_none());

        assert!(
            !db.update_document_status("missing", DocumentStatus::Ready, None)
                .unwrap()
        );
    }

    #[test]
    fn test_content_update_keeps_title_without_override() {
        let db = Database::open_in_memory().unwrap();
        let doc = url_document("user-1", "https://example.com/a");
        db.insert_document(&doc).unwrap();

        let update = ContentUpdate {
            content_key: "documents/x/1.txt".to_string(),
            extracted_text: "one two three".to_string(),
            content_hash: "abc".to_string(),
            word_count: 3,
            title: None,
            metadata: None,
        };
        db.update_document_content(&doc.id, &update).unwrap();

        let loaded = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(loaded.title, "example.com/a");
        assert_eq!(loaded.word_count, 3);
        assert_eq!(loaded.content_key, "documents/x/1.txt");
        assert_eq!(loaded.extracted_text.as_deref(), Some("one two three"));

        let mut metadata = serde_json::Map::new();
        metadata.insert("author".to_string(), serde_json::json!("Ada"));
        let update = ContentUpdate {
            title: Some("Real Title".to_string()),
            metadata: Some(metadata),
            ..update
        };
        db.update_document_content(&doc.id, &update).unwrap();
        let loaded = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Real Title");
        assert_eq!(loaded.metadata.get("author"), Some(&serde_json::json!("Ada")));
    }

    #[test]
    fn test_research_config_round_trips_through_row() {
        let db = Database::open_in_memory().unwrap();
        let mut doc = Document::new_processing("q", "user-1", DocumentSource::Research);
        doc.research_config = Some(ResearchConfig::new("q"));
        db.insert_document(&doc).unwrap();

        let config = ResearchConfig {
            operation_id: Some("op-1".to_string()),
            research_status: Some(ResearchStatus::InProgress),
            ..ResearchConfig::new("q")
        };
        db.update_document_research_config(&doc.id, &config).unwrap();

        let loaded = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(loaded.research_config, Some(config));
    }

    #[test]
    fn test_find_by_source_url_is_scoped_to_owner() {
        let db = Database::open_in_memory().unwrap();
        let mine = url_document("user-1", "https://example.com/a");
        db.insert_document(&mine).unwrap();

        let found = db
            .get_document_by_source_url("https://example.com/a", "user-1")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, mine.id);

        assert!(
            db.get_document_by_source_url("https://example.com/a", "user-2")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_update_and_delete_document() {
        let db = Database::open_in_memory().unwrap();
        let mut doc = url_document("user-1", "https://example.com/a");
        db.insert_document(&doc).unwrap();

        doc.title = "Renamed".to_string();
        doc.original_file_name = Some("a.txt".to_string());
        assert!(db.update_document(&doc).unwrap());
        let loaded = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Renamed");
        assert_eq!(loaded.original_file_name.as_deref(), Some("a.txt"));

        assert!(db.delete_document(&doc.id).unwrap());
        assert!(!db.delete_document(&doc.id).unwrap());
        assert!(db.get_document(&doc.id).unwrap().is_none());
    }
}
