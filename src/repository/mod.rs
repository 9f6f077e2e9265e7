//! Database repositories backed by Diesel/SQLite.
//!
//! All cross-worker coordination happens through these persisted
//! records and their status fields; there is no in-process shared
//! cache. Timestamps are stored as RFC 3339 text.

pub mod diesel_article;
pub mod diesel_candidate;
pub mod diesel_dataset;
pub mod diesel_models;
pub mod diesel_pool;
pub mod diesel_source;

pub use diesel_article::DieselArticleRepository;
pub use diesel_candidate::DieselCandidateRepository;
pub use diesel_dataset::DieselDatasetRepository;
pub use diesel_pool::{create_diesel_pool, create_diesel_pool_from_url, SqlitePool};
pub use diesel_source::DieselSourceRepository;

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use diesel_pool::{run_blocking, DieselError};

/// Parse an RFC 3339 timestamp stored as text, falling back to the
/// current time on corrupt data.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_datetime)
}

/// Create all tables if they do not exist.
///
/// Schema migration tooling lives outside this crate; this bootstrap is
/// enough for a fresh deployment and for tests.
pub async fn init_schema(pool: SqlitePool) -> Result<(), DieselError> {
    run_blocking(pool, |conn| {
        diesel::sql_query(
            r#"CREATE TABLE IF NOT EXISTS datasets (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
        )
        .execute(conn)?;

        diesel::sql_query(
            r#"CREATE TABLE IF NOT EXISTS sources (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                homepage_url TEXT NOT NULL,
                discovery_enabled INTEGER NOT NULL DEFAULT 1,
                section_discovery_enabled INTEGER NOT NULL DEFAULT 1,
                sections TEXT NOT NULL DEFAULT '[]',
                discovery_interval_minutes INTEGER NOT NULL DEFAULT 60,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                last_discovery TEXT,
                created_at TEXT NOT NULL
            )"#,
        )
        .execute(conn)?;

        diesel::sql_query(
            r#"CREATE TABLE IF NOT EXISTS candidate_links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dataset_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                url TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'candidate',
                discovered_at TEXT NOT NULL,
                status_changed_at TEXT NOT NULL,
                UNIQUE (dataset_id, url)
            )"#,
        )
        .execute(conn)?;

        diesel::sql_query(
            r#"CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY,
                dataset_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                url TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'candidate',
                body TEXT,
                paused_reason TEXT,
                stage_entered_at TEXT NOT NULL,
                extraction_attempts INTEGER NOT NULL DEFAULT 0,
                cleaning_attempts INTEGER NOT NULL DEFAULT 0,
                verification_attempts INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        )
        .execute(conn)?;

        diesel::sql_query(
            "CREATE INDEX IF NOT EXISTS idx_candidate_links_status
             ON candidate_links (status, discovered_at)",
        )
        .execute(conn)?;

        diesel::sql_query(
            "CREATE INDEX IF NOT EXISTS idx_articles_status
             ON articles (status, stage_entered_at)",
        )
        .execute(conn)?;

        Ok(())
    })
    .await
}
