//! Job queue contract and the payloads exchanged between initiators and job handlers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::QueueError;

/// Kind of asynchronous work a job carries
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum JobType {
    ProcessUrl,
    ProcessResearch,
}

/// Delivery state of a queued job
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A queued unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub owner_id: String,
    pub status: JobStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Decode the payload into its typed form
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, QueueError> {
        serde_json::from_value(self.payload.clone()).map_err(QueueError::Payload)
    }
}

/// Payload of a `process-url` job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUrlPayload {
    pub document_id: String,
    pub url: String,
    pub user_id: String,
}

/// Payload of a `process-research` job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResearchPayload {
    pub document_id: String,
    pub query: String,
    pub user_id: String,
}

/// At-least-once job transport
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        owner_id: &str,
    ) -> Result<Job, QueueError>;
}
