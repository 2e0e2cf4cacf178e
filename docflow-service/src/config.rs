//! Service configuration.
//!
//! Values come from an optional `config` file layered under `DOCFLOW__`-prefixed
//! environment variables; every field has a default.

mod defaults;
mod loader;

pub use loader::load_config;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use defaults::*;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub research: ResearchProviderConfig,

    #[serde(default)]
    pub fetcher: FetcherConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Holds the SQLite database and the blob directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("docflow.db")
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }
}

/// Deep research provider connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchProviderConfig {
    #[serde(default = "default_research_url")]
    pub base_url: String,

    /// Sent as a bearer token when set
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_research_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ResearchProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_research_url(),
            api_key: None,
            request_timeout_secs: default_research_request_timeout_secs(),
        }
    }
}

/// Outbound page fetching for URL ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_fetch_bytes")]
    pub max_bytes: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_fetch_timeout_secs(),
            max_bytes: default_max_fetch_bytes(),
        }
    }
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Timing of the pipeline's polling loops
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub research_polling: ResearchPollingConfig,

    #[serde(default)]
    pub readiness: ReadinessConfig,
}

/// Poll cadence for a research operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchPollingConfig {
    /// Sleep after the first empty poll
    #[serde(default = "default_research_first_delay_secs")]
    pub first_delay_secs: u64,

    /// Sleep after every later empty poll
    #[serde(default = "default_research_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Total sleep after which the operation is abandoned
    #[serde(default = "default_research_max_wait_secs")]
    pub max_wait_secs: u64,
}

impl Default for ResearchPollingConfig {
    fn default() -> Self {
        Self {
            first_delay_secs: default_research_first_delay_secs(),
            poll_interval_secs: default_research_poll_interval_secs(),
            max_wait_secs: default_research_max_wait_secs(),
        }
    }
}

impl ResearchPollingConfig {
    pub fn first_delay(&self) -> Duration {
        Duration::from_secs(self.first_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

/// Poll cadence for the readiness barrier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_readiness_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Must exceed the research ceiling so waiters outlast the operation they wait on
    #[serde(default = "default_readiness_max_wait_secs")]
    pub max_wait_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_readiness_poll_interval_secs(),
            max_wait_secs: default_readiness_max_wait_secs(),
        }
    }
}

impl ReadinessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}
