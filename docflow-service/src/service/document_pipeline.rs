//! Document ingestion pipeline.
//!
//! This module coordinates the document lifecycle:
//! - Initiators that insert a `processing` row and enqueue its job
//! - Retry of failed documents
//! - The URL and research job handlers
//! - The readiness barrier used by dependent features
//! - Owner-checked reads

mod initiators;
mod read;
mod readiness;
mod research_job;
mod retry;
mod url_job;

pub use initiators::{CreateFromResearchRequest, CreateFromUrlRequest};
