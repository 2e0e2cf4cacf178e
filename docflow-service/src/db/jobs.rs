//! SQLite-backed job queue.
//!
//! Jobs move `pending → running → completed | failed`. Claiming is a single
//! transaction, so two consumers never receive the same pending job.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};
use rusqlite::types::Type;

use super::Database;
use super::models::parse_timestamp;
use crate::error::QueueError;
use crate::queue::{Job, JobQueue, JobStatus, JobType};

const JOB_COLUMNS: &str =
    "id, job_type, payload, owner_id, status, attempts, error, created_at, updated_at";

fn job_from_row(row: &Row<'_>) -> Result<Job, rusqlite::Error> {
    let job_type_str: String = row.get(1)?;
    let payload_str: String = row.get(2)?;
    let status_str: String = row.get(4)?;
    let attempts: i64 = row.get(5)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    Ok(Job {
        id: row.get(0)?,
        job_type: job_type_str
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
        payload: serde_json::from_str(&payload_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        owner_id: row.get(3)?,
        status: status_str
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        attempts: attempts.max(0) as u32,
        error: row.get(6)?,
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}

impl Database {
    /// Append a pending job
    pub fn insert_job(
        &self,
        job_type: JobType,
        payload: &serde_json::Value,
        owner_id: &str,
    ) -> Result<Job, QueueError> {
        let now = Utc::now();
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            job_type,
            payload: payload.clone(),
            owner_id: owner_id.to_string(),
            status: JobStatus::Pending,
            attempts: 0,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let payload_json = serde_json::to_string(payload).map_err(QueueError::Payload)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                JOB_COLUMNS
            ),
            params![
                job.id,
                job.job_type.as_ref(),
                payload_json,
                job.owner_id,
                job.status.as_ref(),
                0i64,
                job.error,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(QueueError::Storage)?;

        Ok(job)
    }

    /// Get a job by ID
    pub fn get_job(&self, id: &str) -> Result<Option<Job>, QueueError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
            params![id],
            job_from_row,
        )
        .optional()
        .map_err(QueueError::Storage)
    }

    /// Claim the oldest pending job, marking it running and counting the attempt
    pub fn claim_next_job(&self) -> Result<Option<Job>, QueueError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(QueueError::Storage)?;

        let job = tx
            .query_row(
                &format!(
                    "SELECT {} FROM jobs WHERE status = 'pending' ORDER BY created_at ASC LIMIT 1",
                    JOB_COLUMNS
                ),
                [],
                job_from_row,
            )
            .optional()
            .map_err(QueueError::Storage)?;

        let Some(mut job) = job else {
            return Ok(None);
        };

        let now = Utc::now();
        tx.execute(
            "UPDATE jobs SET status = 'running', attempts = attempts + 1, updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), job.id],
        )
        .map_err(QueueError::Storage)?;
        tx.commit().map_err(QueueError::Storage)?;

        job.status = JobStatus::Running;
        job.attempts += 1;
        job.updated_at = now;
        Ok(Some(job))
    }

    /// Mark a job completed
    pub fn complete_job(&self, id: &str) -> Result<(), QueueError> {
        self.finish_job(id, JobStatus::Completed, None)
    }

    /// Mark a job failed, returning it to `pending` while attempts remain
    pub fn fail_job(&self, id: &str, error: &str, max_attempts: u32) -> Result<(), QueueError> {
        let job = self.get_job(id)?.ok_or_else(|| QueueError::JobNotFound {
            job_id: id.to_string(),
        })?;

        let status = if job.attempts < max_attempts {
            JobStatus::Pending
        } else {
            JobStatus::Failed
        };
        self.finish_job(id, status, Some(error))
    }

    fn finish_job(&self, id: &str, status: JobStatus, error: Option<&str>) -> Result<(), QueueError> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute(
                "UPDATE jobs SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
                params![status.as_ref(), error, Utc::now().to_rfc3339(), id],
            )
            .map_err(QueueError::Storage)?;

        if rows == 0 {
            return Err(QueueError::JobNotFound {
                job_id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for Database {
    async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        owner_id: &str,
    ) -> Result<Job, QueueError> {
        self.insert_job(job_type, &payload, owner_id)
    }
}
