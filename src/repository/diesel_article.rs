//! Diesel-based article repository for SQLite.
//!
//! The transition method implements the compare-and-set discipline the
//! whole pipeline relies on: updates are conditioned on the expected
//! current status, so two workers racing to advance the same record
//! cannot both succeed.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::diesel_models::{ArticleRecord, NewArticle};
use super::diesel_pool::{run_blocking, SqlitePool};
use super::parse_datetime;
use crate::models::{Article, PauseReason, PipelineStatus};
use crate::schema::articles;

impl From<ArticleRecord> for Article {
    fn from(record: ArticleRecord) -> Self {
        Article {
            id: record.id,
            dataset_id: record.dataset_id,
            source_id: record.source_id,
            url: record.url,
            status: PipelineStatus::from_str(&record.status).unwrap_or(PipelineStatus::Candidate),
            body: record.body,
            paused_reason: record.paused_reason.as_deref().and_then(PauseReason::from_str),
            stage_entered_at: parse_datetime(&record.stage_entered_at),
            extraction_attempts: record.extraction_attempts.max(0) as u32,
            cleaning_attempts: record.cleaning_attempts.max(0) as u32,
            verification_attempts: record.verification_attempts.max(0) as u32,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

/// Diesel-based article repository with compile-time query checking.
#[derive(Clone)]
pub struct DieselArticleRepository {
    pool: SqlitePool,
}

impl DieselArticleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get an article by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Article>, diesel::result::Error> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            articles::table
                .find(&id)
                .first::<ArticleRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(Article::from))
    }

    /// Save an article (insert or update).
    pub async fn save(&self, article: &Article) -> Result<(), diesel::result::Error> {
        let id = article.id.clone();
        let dataset_id = article.dataset_id.clone();
        let source_id = article.source_id.clone();
        let url = article.url.clone();
        let status = article.status.as_str();
        let body = article.body.clone();
        let paused_reason = article.paused_reason.map(|r| r.as_str());
        let stage_entered_at = article.stage_entered_at.to_rfc3339();
        let extraction_attempts = article.extraction_attempts as i32;
        let cleaning_attempts = article.cleaning_attempts as i32;
        let verification_attempts = article.verification_attempts as i32;
        let created_at = article.created_at.to_rfc3339();
        let updated_at = article.updated_at.to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            diesel::replace_into(articles::table)
                .values(NewArticle {
                    id: &id,
                    dataset_id: &dataset_id,
                    source_id: &source_id,
                    url: &url,
                    status,
                    body: body.as_deref(),
                    paused_reason,
                    stage_entered_at: &stage_entered_at,
                    extraction_attempts,
                    cleaning_attempts,
                    verification_attempts,
                    created_at: &created_at,
                    updated_at: &updated_at,
                })
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Conditionally transition an article from `expected` to `next`.
    ///
    /// The update is keyed on the expected current status; if the record
    /// has moved, zero rows match and false is returned. Entering a
    /// forward stage increments that stage's attempt counter, and the
    /// stage-entry timestamp is always reset to the transition time.
    pub async fn transition(
        &self,
        article_id: &str,
        expected: PipelineStatus,
        next: PipelineStatus,
        reason: Option<PauseReason>,
        now: DateTime<Utc>,
    ) -> Result<bool, diesel::result::Error> {
        let id = article_id.to_string();
        let ts = now.to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let target = articles::table
                .filter(articles::id.eq(&id))
                .filter(articles::status.eq(expected.as_str()));
            let base = (
                articles::status.eq(next.as_str()),
                articles::stage_entered_at.eq(&ts),
                articles::updated_at.eq(&ts),
                articles::paused_reason.eq(reason.map(|r| r.as_str())),
            );

            let rows = match next {
                PipelineStatus::Extracted => diesel::update(target)
                    .set((
                        base,
                        articles::extraction_attempts.eq(articles::extraction_attempts + 1),
                    ))
                    .execute(conn)?,
                PipelineStatus::Cleaned => diesel::update(target)
                    .set((
                        base,
                        articles::cleaning_attempts.eq(articles::cleaning_attempts + 1),
                    ))
                    .execute(conn)?,
                PipelineStatus::Verified => diesel::update(target)
                    .set((
                        base,
                        articles::verification_attempts.eq(articles::verification_attempts + 1),
                    ))
                    .execute(conn)?,
                _ => diesel::update(target).set(base).execute(conn)?,
            };
            Ok(rows > 0)
        })
        .await
    }

    /// Articles past the candidate stage with a null or empty body.
    /// Terminal states are excluded; already-paused records never
    /// reappear here, which keeps the housekeeping sweep idempotent.
    pub async fn list_null_text(
        &self,
    ) -> Result<Vec<(String, PipelineStatus)>, diesel::result::Error> {
        let pool = self.pool.clone();

        let rows = run_blocking(pool, move |conn| {
            articles::table
                .filter(articles::status.eq_any(vec![
                    PipelineStatus::Extracted.as_str(),
                    PipelineStatus::Cleaned.as_str(),
                ]))
                .filter(articles::body.is_null().or(articles::body.eq("")))
                .select((articles::id, articles::status))
                .load::<(String, String)>(conn)
        })
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, status)| PipelineStatus::from_str(&status).map(|s| (id, s)))
            .collect())
    }

    /// Count articles sitting in `stage` whose stage-entry timestamp is
    /// older than the cutoff.
    pub async fn count_stalled(
        &self,
        stage: PipelineStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, diesel::result::Error> {
        let cutoff = cutoff.to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let count: i64 = articles::table
                .filter(articles::status.eq(stage.as_str()))
                .filter(articles::stage_entered_at.lt(&cutoff))
                .select(count_star())
                .first(conn)?;
            Ok(count as u64)
        })
        .await
    }

    /// Count articles per status, for summary reports.
    pub async fn count_by_status(
        &self,
        status: PipelineStatus,
    ) -> Result<u64, diesel::result::Error> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let count: i64 = articles::table
                .filter(articles::status.eq(status.as_str()))
                .select(count_star())
                .first(conn)?;
            Ok(count as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::setup_test_db;
    use chrono::Duration;

    #[tokio::test]
    async fn test_transition_requires_expected_status() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselArticleRepository::new(pool);

        let article = Article::new("ds-1", "bugle", "https://bugle.example.com/story");
        repo.save(&article).await.unwrap();

        let now = Utc::now();
        let moved = repo
            .transition(
                &article.id,
                PipelineStatus::Candidate,
                PipelineStatus::Extracted,
                None,
                now,
            )
            .await
            .unwrap();
        assert!(moved);

        // The record is no longer a candidate, so the same CAS loses.
        let moved_again = repo
            .transition(
                &article.id,
                PipelineStatus::Candidate,
                PipelineStatus::Extracted,
                None,
                now,
            )
            .await
            .unwrap();
        assert!(!moved_again);

        let fetched = repo.get(&article.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, PipelineStatus::Extracted);
        assert_eq!(fetched.extraction_attempts, 1);
    }

    #[tokio::test]
    async fn test_stage_entry_timestamp_reset_on_transition() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselArticleRepository::new(pool);

        let mut article = Article::new("ds-1", "bugle", "https://bugle.example.com/story");
        article.stage_entered_at = Utc::now() - Duration::days(3);
        repo.save(&article).await.unwrap();

        let now = Utc::now();
        repo.transition(
            &article.id,
            PipelineStatus::Candidate,
            PipelineStatus::Extracted,
            None,
            now,
        )
        .await
        .unwrap();

        let fetched = repo.get(&article.id).await.unwrap().unwrap();
        assert!(fetched.stage_entered_at > article.stage_entered_at);
    }

    #[tokio::test]
    async fn test_list_null_text_excludes_paused_and_candidates() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselArticleRepository::new(pool);

        let mut extracted_empty = Article::new("ds-1", "bugle", "https://bugle.example.com/1");
        extracted_empty.status = PipelineStatus::Extracted;
        repo.save(&extracted_empty).await.unwrap();

        let mut extracted_full = Article::new("ds-1", "bugle", "https://bugle.example.com/2");
        extracted_full.status = PipelineStatus::Extracted;
        extracted_full.body = Some("article text".to_string());
        repo.save(&extracted_full).await.unwrap();

        let mut paused = Article::new("ds-1", "bugle", "https://bugle.example.com/3");
        paused.status = PipelineStatus::Paused;
        paused.paused_reason = Some(PauseReason::NullText);
        repo.save(&paused).await.unwrap();

        let candidate = Article::new("ds-1", "bugle", "https://bugle.example.com/4");
        repo.save(&candidate).await.unwrap();

        let null_text = repo.list_null_text().await.unwrap();
        assert_eq!(null_text.len(), 1);
        assert_eq!(null_text[0].0, extracted_empty.id);
    }

    #[tokio::test]
    async fn test_count_stalled() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselArticleRepository::new(pool);

        let now = Utc::now();
        let mut stalled = Article::new("ds-1", "bugle", "https://bugle.example.com/slow");
        stalled.status = PipelineStatus::Extracted;
        stalled.stage_entered_at = now - Duration::hours(30);
        repo.save(&stalled).await.unwrap();

        let mut fresh = Article::new("ds-1", "bugle", "https://bugle.example.com/fast");
        fresh.status = PipelineStatus::Extracted;
        fresh.stage_entered_at = now - Duration::hours(2);
        repo.save(&fresh).await.unwrap();

        let cutoff = now - Duration::hours(24);
        let count = repo
            .count_stalled(PipelineStatus::Extracted, cutoff)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
