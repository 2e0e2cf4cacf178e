//! Database schema migrations.

use rusqlite::Connection;

use crate::error::{DatabaseError, ServiceResult};

/// Current schema version, tracked with `PRAGMA user_version`
const SCHEMA_VERSION: i64 = 1;

/// Run all database migrations.
///
/// Called during database initialization to bring the schema up to date.
pub(super) fn run_migrations(conn: &Connection) -> ServiceResult<()> {
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(DatabaseError::Query)?;

    if version > SCHEMA_VERSION {
        return Err(DatabaseError::Migration {
            message: format!(
                "database schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            ),
        }
        .into());
    }

    if version < 1 {
        conn.execute_batch(
            r#"
            -- Documents table
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_by TEXT NOT NULL,
                content_key TEXT NOT NULL,
                mime_type TEXT NOT NULL DEFAULT 'text/plain',
                word_count INTEGER NOT NULL DEFAULT 0,
                extracted_text TEXT,
                content_hash TEXT,
                source TEXT NOT NULL,
                source_url TEXT,
                research_config TEXT,
                status TEXT NOT NULL DEFAULT 'processing',
                error_message TEXT,
                metadata TEXT,
                original_file_name TEXT,
                original_file_size INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_source_url
                ON documents(created_by, source_url);
            CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);

            -- Job queue
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                job_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, created_at);

            PRAGMA user_version = 1;
            "#,
        )
        .map_err(|e| DatabaseError::Migration {
            message: format!("initial schema: {}", e),
        })?;
    }

    Ok(())
}
