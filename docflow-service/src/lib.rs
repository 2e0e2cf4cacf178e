//! Asynchronous document ingestion pipeline.
//!
//! Documents are created from URLs or deep research queries in a `processing` state, a job is
//! enqueued for each, and the job handlers fill in content and move the document to `ready` or
//! `failed`. Dependent features wait on documents through the readiness barrier.

pub mod api;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod fetch;
pub mod queue;
pub mod repository;
pub mod research;
pub mod service;
pub mod storage;
pub mod url_safety;

#[cfg(test)]
mod testing;

pub use error::{ServiceError, ServiceResult};
pub use service::{Collaborators, IngestionService, UserContext};
