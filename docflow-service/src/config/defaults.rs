//! Default value functions for configuration fields.

use std::path::PathBuf;

// ==================== Server & Storage ====================

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

pub(crate) fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

// ==================== Research Provider ====================

pub(crate) fn default_research_url() -> String {
    "http://localhost:9400/v1".to_string()
}

pub(crate) fn default_research_request_timeout_secs() -> u64 {
    60
}

// ==================== Fetcher ====================

pub(crate) fn default_user_agent() -> String {
    format!("docflow/{}", env!("CARGO_PKG_VERSION"))
}

pub(crate) fn default_fetch_timeout_secs() -> u64 {
    30
}

pub(crate) fn default_max_fetch_bytes() -> u64 {
    10_485_760 // 10MB
}

// ==================== Pipeline Timing ====================

pub(crate) fn default_research_first_delay_secs() -> u64 {
    30
}

pub(crate) fn default_research_poll_interval_secs() -> u64 {
    60
}

pub(crate) fn default_research_max_wait_secs() -> u64 {
    60 * 60
}

pub(crate) fn default_readiness_poll_interval_secs() -> u64 {
    30
}

pub(crate) fn default_readiness_max_wait_secs() -> u64 {
    65 * 60
}
