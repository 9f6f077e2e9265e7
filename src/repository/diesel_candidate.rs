//! Diesel-based candidate link repository for SQLite.
//!
//! Candidate links are unique per `(dataset_id, url)`; inserts use
//! `INSERT OR IGNORE` so concurrent discovery workers racing on the
//! same URL cannot create duplicates. Rows are never deleted.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::diesel_models::{CandidateLinkRecord, NewCandidateLink};
use super::diesel_pool::{run_blocking, SqlitePool};
use super::parse_datetime;
use crate::models::{CandidateLink, PipelineStatus};
use crate::schema::candidate_links;

impl From<CandidateLinkRecord> for CandidateLink {
    fn from(record: CandidateLinkRecord) -> Self {
        CandidateLink {
            id: record.id,
            dataset_id: record.dataset_id,
            source_id: record.source_id,
            url: record.url,
            status: PipelineStatus::from_str(&record.status).unwrap_or(PipelineStatus::Candidate),
            discovered_at: parse_datetime(&record.discovered_at),
            status_changed_at: parse_datetime(&record.status_changed_at),
        }
    }
}

/// Diesel-based candidate link repository.
#[derive(Clone)]
pub struct DieselCandidateRepository {
    pool: SqlitePool,
}

impl DieselCandidateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a candidate if `(dataset_id, url)` is not already known.
    /// Returns true if a row was inserted.
    pub async fn insert_new(&self, link: &CandidateLink) -> Result<bool, diesel::result::Error> {
        let dataset_id = link.dataset_id.clone();
        let source_id = link.source_id.clone();
        let url = link.url.clone();
        let status = link.status.as_str();
        let discovered_at = link.discovered_at.to_rfc3339();
        let status_changed_at = link.status_changed_at.to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let rows = diesel::insert_or_ignore_into(candidate_links::table)
                .values(NewCandidateLink {
                    dataset_id: &dataset_id,
                    source_id: &source_id,
                    url: &url,
                    status,
                    discovered_at: &discovered_at,
                    status_changed_at: &status_changed_at,
                })
                .execute(conn)?;
            Ok(rows > 0)
        })
        .await
    }

    /// Get a candidate by dataset and normalized URL.
    pub async fn get(
        &self,
        dataset_id: &str,
        url: &str,
    ) -> Result<Option<CandidateLink>, diesel::result::Error> {
        let dataset_id = dataset_id.to_string();
        let url = url.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            candidate_links::table
                .filter(candidate_links::dataset_id.eq(&dataset_id))
                .filter(candidate_links::url.eq(&url))
                .first::<CandidateLinkRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(CandidateLink::from))
    }

    /// All URLs already known for a source within a dataset, used by
    /// discovery to dedupe before insertion.
    pub async fn existing_urls(
        &self,
        source_id: &str,
        dataset_id: &str,
    ) -> Result<HashSet<String>, diesel::result::Error> {
        let source_id = source_id.to_string();
        let dataset_id = dataset_id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            candidate_links::table
                .filter(candidate_links::source_id.eq(&source_id))
                .filter(candidate_links::dataset_id.eq(&dataset_id))
                .select(candidate_links::url)
                .load::<String>(conn)
        })
        .await
        .map(|urls| urls.into_iter().collect())
    }

    /// Count candidates in the `candidate` status discovered before the
    /// cutoff, without transitioning them. Used by dry-run sweeps.
    pub async fn count_expirable(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, diesel::result::Error> {
        let cutoff = cutoff.to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let count: i64 = candidate_links::table
                .filter(candidate_links::status.eq(PipelineStatus::Candidate.as_str()))
                .filter(candidate_links::discovered_at.lt(&cutoff))
                .select(count_star())
                .first(conn)?;
            Ok(count as u64)
        })
        .await
    }

    /// Transition every still-`candidate` row older than the cutoff to
    /// `expired`. Conditioning on the current status makes the sweep
    /// idempotent and safe to run alongside pipeline workers. Returns
    /// the IDs of the transitioned rows so the caller can emit one
    /// event per record.
    pub async fn expire_older_than(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<i32>, diesel::result::Error> {
        let cutoff = cutoff.to_rfc3339();
        let now = now.to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            conn.transaction(|conn| {
                let ids: Vec<i32> = candidate_links::table
                    .filter(candidate_links::status.eq(PipelineStatus::Candidate.as_str()))
                    .filter(candidate_links::discovered_at.lt(&cutoff))
                    .select(candidate_links::id)
                    .load(conn)?;

                if !ids.is_empty() {
                    diesel::update(
                        candidate_links::table
                            .filter(candidate_links::id.eq_any(&ids))
                            .filter(
                                candidate_links::status.eq(PipelineStatus::Candidate.as_str()),
                            ),
                    )
                    .set((
                        candidate_links::status.eq(PipelineStatus::Expired.as_str()),
                        candidate_links::status_changed_at.eq(&now),
                    ))
                    .execute(conn)?;
                }
                Ok(ids)
            })
        })
        .await
    }

    /// Count candidates per status within a dataset, for summary
    /// reports.
    pub async fn count_by_status(
        &self,
        dataset_id: &str,
        status: PipelineStatus,
    ) -> Result<u64, diesel::result::Error> {
        let dataset_id = dataset_id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let count: i64 = candidate_links::table
                .filter(candidate_links::dataset_id.eq(&dataset_id))
                .filter(candidate_links::status.eq(status.as_str()))
                .select(count_star())
                .first(conn)?;
            Ok(count as u64)
        })
        .await
    }
}
