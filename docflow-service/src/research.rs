//! Deep research provider contract and HTTP client.
//!
//! Research runs as a long-lived operation on the provider side: the client starts it,
//! receives an interaction id, and polls that id until a result is available.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::ResearchProviderConfig;
use crate::db::ResearchSource;
use crate::error::ResearchError;

/// Output of a finished research operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchResult {
    pub content: String,
    pub sources: Vec<ResearchSource>,
    pub word_count: usize,
}

#[async_trait]
pub trait ResearchProvider: Send + Sync {
    /// Start an operation for `query`, returning its interaction id
    async fn start_research(&self, query: &str) -> Result<String, ResearchError>;

    /// The result of an operation, or `None` while it is still running
    async fn get_result(&self, interaction_id: &str)
    -> Result<Option<ResearchResult>, ResearchError>;
}

/// Research provider reached over HTTP
pub struct HttpResearchClient {
    client: Client,
    config: ResearchProviderConfig,
}

impl HttpResearchClient {
    pub fn new(config: ResearchProviderConfig) -> Result<Self, ResearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ResearchError::Connection {
                url: config.base_url.clone(),
                source: e,
            })?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, ResearchError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ResearchError::Connection {
                url: url.to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ResearchError::Request { status, message });
        }

        Ok(response)
    }
}

#[async_trait]
impl ResearchProvider for HttpResearchClient {
    async fn start_research(&self, query: &str) -> Result<String, ResearchError> {
        let url = self.endpoint("interactions");
        let request = self.client.post(&url).json(&StartRequest {
            input: query,
            background: true,
        });

        let started: StartResponse = self
            .send(&url, request)
            .await?
            .json()
            .await
            .map_err(|e| ResearchError::InvalidResponse {
                message: e.to_string(),
            })?;

        if started.id.trim().is_empty() {
            return Err(ResearchError::InvalidResponse {
                message: "provider returned an empty interaction id".to_string(),
            });
        }

        debug!(interaction_id = %started.id, "Research operation started");
        Ok(started.id)
    }

    async fn get_result(
        &self,
        interaction_id: &str,
    ) -> Result<Option<ResearchResult>, ResearchError> {
        let url = self.endpoint(&format!("interactions/{}", interaction_id));
        let request = self.client.get(&url);

        let interaction: InteractionResponse = self
            .send(&url, request)
            .await?
            .json()
            .await
            .map_err(|e| ResearchError::InvalidResponse {
                message: e.to_string(),
            })?;

        interaction.into_result(interaction_id)
    }
}

// Internal provider API types

#[derive(Debug, Serialize)]
struct StartRequest<'a> {
    input: &'a str,
    background: bool,
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct InteractionResponse {
    status: String,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    sources: Vec<ProviderSource>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderSource {
    #[serde(default)]
    title: Option<String>,
    url: String,
}

impl InteractionResponse {
    fn into_result(self, interaction_id: &str) -> Result<Option<ResearchResult>, ResearchError> {
        match self.status.as_str() {
            "completed" => {
                let content = self.output.unwrap_or_default();
                let sources = self
                    .sources
                    .into_iter()
                    .map(|s| ResearchSource {
                        title: s.title.unwrap_or_else(|| s.url.clone()),
                        url: s.url,
                    })
                    .collect();
                Ok(Some(ResearchResult {
                    word_count: crate::content::word_count(&content),
                    content,
                    sources,
                }))
            }
            "failed" | "cancelled" => Err(ResearchError::OperationFailed {
                interaction_id: interaction_id.to_string(),
                message: self
                    .error
                    .unwrap_or_else(|| format!("operation {}", self.status)),
            }),
            _ => Ok(None),
        }
    }
}
