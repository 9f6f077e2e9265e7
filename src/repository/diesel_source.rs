//! Diesel-based source repository for SQLite.
//!
//! Scheduling state (last discovery time, consecutive failures) is
//! persisted here rather than held in process memory, so discovery
//! workers stay stateless between invocations.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::diesel_models::{NewSource, SourceRecord};
use super::diesel_pool::{run_blocking, SqlitePool};
use super::{parse_datetime, parse_datetime_opt};
use crate::models::{SectionList, Source};
use crate::schema::sources;

/// Convert a database record to a domain model.
impl From<SourceRecord> for Source {
    fn from(record: SourceRecord) -> Self {
        Source {
            id: record.id,
            name: record.name,
            homepage_url: record.homepage_url,
            discovery_enabled: record.discovery_enabled != 0,
            section_discovery_enabled: record.section_discovery_enabled != 0,
            sections: serde_json::from_str(&record.sections).unwrap_or_default(),
            discovery_interval_minutes: record.discovery_interval_minutes.max(0) as u32,
            consecutive_failures: record.consecutive_failures.max(0) as u32,
            last_discovery: parse_datetime_opt(record.last_discovery),
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// Diesel-based source repository with compile-time query checking.
#[derive(Clone)]
pub struct DieselSourceRepository {
    pool: SqlitePool,
}

impl DieselSourceRepository {
    /// Create a new Diesel source repository with an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a source by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Source>, diesel::result::Error> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            sources::table
                .find(&id)
                .first::<SourceRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(Source::from))
    }

    /// Get all sources.
    pub async fn get_all(&self) -> Result<Vec<Source>, diesel::result::Error> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| sources::table.load::<SourceRecord>(conn))
            .await
            .map(|records| records.into_iter().map(Source::from).collect())
    }

    /// Save a source (insert or update).
    pub async fn save(&self, source: &Source) -> Result<(), diesel::result::Error> {
        let sections_json =
            serde_json::to_string(&source.sections).unwrap_or_else(|_| "[]".to_string());
        let created_at = source.created_at.to_rfc3339();
        let last_discovery = source.last_discovery.map(|dt| dt.to_rfc3339());

        let id = source.id.clone();
        let name = source.name.clone();
        let homepage_url = source.homepage_url.clone();
        let discovery_enabled = source.discovery_enabled as i32;
        let section_discovery_enabled = source.section_discovery_enabled as i32;
        let interval = source.discovery_interval_minutes as i32;
        let failures = source.consecutive_failures as i32;
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            // Use replace_into for SQLite upsert
            diesel::replace_into(sources::table)
                .values(NewSource {
                    id: &id,
                    name: &name,
                    homepage_url: &homepage_url,
                    discovery_enabled,
                    section_discovery_enabled,
                    sections: &sections_json,
                    discovery_interval_minutes: interval,
                    consecutive_failures: failures,
                    last_discovery: last_discovery.as_deref(),
                    created_at: &created_at,
                })
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Check if a source exists.
    pub async fn exists(&self, id: &str) -> Result<bool, diesel::result::Error> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let count: i64 = sources::table
                .filter(sources::id.eq(&id))
                .select(count_star())
                .first(conn)?;
            Ok(count > 0)
        })
        .await
    }

    /// Record the outcome of a discovery attempt. Updates the last
    /// discovery timestamp and resets or increments the consecutive
    /// failure counter. Gated and ungated passes record outcomes
    /// identically.
    pub async fn record_discovery_outcome(
        &self,
        id: &str,
        timestamp: DateTime<Utc>,
        success: bool,
    ) -> Result<(), diesel::result::Error> {
        let id = id.to_string();
        let ts = timestamp.to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            if success {
                diesel::update(sources::table.find(&id))
                    .set((
                        sources::last_discovery.eq(Some(&ts)),
                        sources::consecutive_failures.eq(0),
                    ))
                    .execute(conn)?;
            } else {
                diesel::update(sources::table.find(&id))
                    .set((
                        sources::last_discovery.eq(Some(&ts)),
                        sources::consecutive_failures.eq(sources::consecutive_failures + 1),
                    ))
                    .execute(conn)?;
            }
            Ok(())
        })
        .await
    }

    /// Persist the merged section list for a source.
    pub async fn update_sections(
        &self,
        id: &str,
        sections: &SectionList,
    ) -> Result<(), diesel::result::Error> {
        let id = id.to_string();
        let sections_json = serde_json::to_string(sections).unwrap_or_else(|_| "[]".to_string());
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            diesel::update(sources::table.find(&id))
                .set(sources::sections.eq(&sections_json))
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}
