//! Database model structs.
//!
//! This module contains the document record and the research state embedded in it.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Content key stored on a document before any content has been written
pub const PENDING_CONTENT_KEY: &str = "pending";

/// Lifecycle status of a document
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentStatus {
    /// A job is expected to be in flight for this document
    Processing,
    /// Content is stored and retrievable
    Ready,
    /// The last processing attempt failed; `error_message` explains why
    Failed,
}

/// Where a document's content came from
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentSource {
    Manual,
    UploadTxt,
    UploadPdf,
    UploadDocx,
    UploadPptx,
    Url,
    Research,
}

/// Status of the external research operation (distinct from the document status)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResearchStatus {
    InProgress,
    Completed,
    Failed,
}

/// A source cited by a completed research operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchSource {
    pub title: String,
    pub url: String,
}

/// Research state embedded on research-sourced documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchConfig {
    pub query: String,
    /// Provider handle of the long-running operation, absent until it starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_status: Option<ResearchStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<ResearchSource>,
}

impl ResearchConfig {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_id: None,
            research_status: None,
            source_count: None,
            sources: Vec::new(),
        }
    }

    /// The operation handle when an operation is believed to still be running
    pub fn resumable_operation(&self) -> Option<&str> {
        match (&self.operation_id, self.research_status) {
            (Some(id), Some(ResearchStatus::InProgress)) => Some(id.as_str()),
            _ => None,
        }
    }
}

/// Document record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub created_by: String,
    pub content_key: String,
    pub mime_type: String,
    pub word_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub source: DocumentSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_config: Option<ResearchConfig>,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_file_size: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A new `processing` document with no content yet
    pub fn new_processing(
        title: impl Into<String>,
        created_by: impl Into<String>,
        source: DocumentSource,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            created_by: created_by.into(),
            content_key: PENDING_CONTENT_KEY.to_string(),
            mime_type: "text/plain".to_string(),
            word_count: 0,
            extracted_text: None,
            content_hash: None,
            source,
            source_url: None,
            research_config: None,
            status: DocumentStatus::Processing,
            error_message: None,
            metadata: serde_json::Map::new(),
            original_file_name: None,
            original_file_size: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `content_key` points at written content
    pub fn has_content(&self) -> bool {
        self.content_key != PENDING_CONTENT_KEY
    }

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let word_count: i64 = row.get(5)?;
        let source_str: String = row.get(8)?;
        let research_config_str: Option<String> = row.get(10)?;
        let status_str: String = row.get(11)?;
        let metadata_str: Option<String> = row.get(13)?;
        let original_file_size: Option<i64> = row.get(15)?;
        let created_at_str: String = row.get(16)?;
        let updated_at_str: String = row.get(17)?;

        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            created_by: row.get(2)?,
            content_key: row.get(3)?,
            mime_type: row.get(4)?,
            word_count: word_count.max(0) as usize,
            extracted_text: row.get(6)?,
            content_hash: row.get(7)?,
            source: source_str
                .parse()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?,
            source_url: row.get(9)?,
            research_config: research_config_str
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e))
                })?,
            status: status_str.parse().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e))
            })?,
            error_message: row.get(12)?,
            metadata: metadata_str
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            original_file_name: row.get(14)?,
            original_file_size: original_file_size.map(|s| s.max(0) as u64),
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }
}

/// Content written by a job handler once extraction succeeds
#[derive(Debug, Clone)]
pub struct ContentUpdate {
    pub content_key: String,
    pub extracted_text: String,
    pub content_hash: String,
    pub word_count: usize,
    pub title: Option<String>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
