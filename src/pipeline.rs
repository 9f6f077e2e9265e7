//! Pipeline state machine for article lifecycle.
//!
//! Forward path: candidate -> extracted -> cleaned -> verified, with
//! side transitions to paused and (candidate-only) expired. All
//! transitions go through a compare-and-set update conditioned on the
//! expected current status; the losing side of a race gets a
//! `StateConflict` and must re-read.

use std::sync::Arc;

use chrono::Utc;

use crate::error::EngineError;
use crate::models::{PauseReason, PipelineStatus};
use crate::repository::DieselArticleRepository;
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// Whether the state machine permits `from -> to`.
///
/// Forward transitions require the immediately preceding stage; no
/// skipping. Terminal states accept nothing. Resumption of paused
/// records is an external operation and is not modeled here.
pub fn is_valid_transition(from: PipelineStatus, to: PipelineStatus) -> bool {
    use PipelineStatus::*;
    match (from, to) {
        (Candidate, Extracted) => true,
        (Extracted, Cleaned) => true,
        (Cleaned, Verified) => true,
        (Candidate, Expired) => true,
        (Candidate | Extracted | Cleaned, Paused) => true,
        _ => false,
    }
}

/// The next forward stage, if any.
pub fn forward_target(from: PipelineStatus) -> Option<PipelineStatus> {
    match from {
        PipelineStatus::Candidate => Some(PipelineStatus::Extracted),
        PipelineStatus::Extracted => Some(PipelineStatus::Cleaned),
        PipelineStatus::Cleaned => Some(PipelineStatus::Verified),
        _ => None,
    }
}

/// Applies validated, compare-and-set transitions to persisted article
/// records and emits one telemetry event per attempt.
#[derive(Clone)]
pub struct PipelineStateMachine {
    articles: DieselArticleRepository,
    telemetry: Arc<dyn TelemetrySink>,
}

impl PipelineStateMachine {
    pub fn new(articles: DieselArticleRepository, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            articles,
            telemetry,
        }
    }

    /// Advance an article one forward stage. The caller states which
    /// stage it believes the record is in; if the record has moved, the
    /// call fails with `StateConflict` and nothing is written.
    pub async fn advance(
        &self,
        article_id: &str,
        from: PipelineStatus,
    ) -> Result<PipelineStatus, EngineError> {
        let to = forward_target(from).ok_or(EngineError::InvalidTransition {
            from,
            to: from,
        })?;
        self.apply(article_id, from, to, None).await?;
        Ok(to)
    }

    /// Suspend a record with a reason code.
    pub async fn pause(
        &self,
        article_id: &str,
        from: PipelineStatus,
        reason: PauseReason,
    ) -> Result<(), EngineError> {
        self.apply(article_id, from, PipelineStatus::Paused, Some(reason))
            .await
    }

    async fn apply(
        &self,
        article_id: &str,
        from: PipelineStatus,
        to: PipelineStatus,
        reason: Option<PauseReason>,
    ) -> Result<(), EngineError> {
        if !is_valid_transition(from, to) {
            return Err(EngineError::InvalidTransition { from, to });
        }

        let now = Utc::now();
        let updated = self
            .articles
            .transition(article_id, from, to, reason, now)
            .await?;

        let outcome = if updated { "ok" } else { "conflict" };
        self.telemetry
            .emit(&TelemetryEvent::transition(article_id, to, outcome));

        if !updated {
            return Err(EngineError::StateConflict {
                record_id: article_id.to_string(),
                expected: from,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Article;
    use crate::repository::testing::setup_test_db;
    use crate::telemetry::RecordingTelemetrySink;

    #[test]
    fn test_forward_transitions_only_from_preceding_stage() {
        use PipelineStatus::*;
        assert!(is_valid_transition(Candidate, Extracted));
        assert!(is_valid_transition(Extracted, Cleaned));
        assert!(is_valid_transition(Cleaned, Verified));

        // No stage skipping.
        assert!(!is_valid_transition(Candidate, Cleaned));
        assert!(!is_valid_transition(Candidate, Verified));
        assert!(!is_valid_transition(Extracted, Verified));

        // No backwards movement.
        assert!(!is_valid_transition(Cleaned, Extracted));
        assert!(!is_valid_transition(Extracted, Candidate));
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        use PipelineStatus::*;
        for from in [Verified, Paused, Expired] {
            for to in [Candidate, Extracted, Cleaned, Verified, Paused, Expired] {
                assert!(!is_valid_transition(from, to), "{from} -> {to} allowed");
            }
        }
    }

    #[test]
    fn test_expired_only_from_candidate() {
        use PipelineStatus::*;
        assert!(is_valid_transition(Candidate, Expired));
        assert!(!is_valid_transition(Extracted, Expired));
        assert!(!is_valid_transition(Cleaned, Expired));
    }

    async fn setup_machine() -> (
        PipelineStateMachine,
        DieselArticleRepository,
        Arc<RecordingTelemetrySink>,
        tempfile::TempDir,
    ) {
        let (pool, dir) = setup_test_db().await;
        let repo = DieselArticleRepository::new(pool);
        let sink = Arc::new(RecordingTelemetrySink::default());
        let machine = PipelineStateMachine::new(repo.clone(), sink.clone());
        (machine, repo, sink, dir)
    }

    #[tokio::test]
    async fn test_advance_through_all_stages() {
        let (machine, repo, _sink, _dir) = setup_machine().await;

        let article = Article::new("ds-1", "bugle", "https://bugle.example.com/story");
        repo.save(&article).await.unwrap();

        assert_eq!(
            machine
                .advance(&article.id, PipelineStatus::Candidate)
                .await
                .unwrap(),
            PipelineStatus::Extracted
        );
        assert_eq!(
            machine
                .advance(&article.id, PipelineStatus::Extracted)
                .await
                .unwrap(),
            PipelineStatus::Cleaned
        );
        assert_eq!(
            machine
                .advance(&article.id, PipelineStatus::Cleaned)
                .await
                .unwrap(),
            PipelineStatus::Verified
        );

        let fetched = repo.get(&article.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, PipelineStatus::Verified);
        assert_eq!(fetched.extraction_attempts, 1);
        assert_eq!(fetched.cleaning_attempts, 1);
        assert_eq!(fetched.verification_attempts, 1);
    }

    #[tokio::test]
    async fn test_racing_workers_one_wins_one_conflicts() {
        let (machine, repo, _sink, _dir) = setup_machine().await;

        let mut article = Article::new("ds-1", "bugle", "https://bugle.example.com/story");
        article.status = PipelineStatus::Extracted;
        repo.save(&article).await.unwrap();

        let (first, second) = tokio::join!(
            machine.advance(&article.id, PipelineStatus::Extracted),
            machine.advance(&article.id, PipelineStatus::Extracted),
        );

        let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);

        let loser = if first.is_err() { first } else { second };
        match loser.unwrap_err() {
            EngineError::StateConflict { record_id, .. } => assert_eq!(record_id, article.id),
            other => panic!("expected StateConflict, got {other}"),
        }

        // Exactly one attempt landed.
        let fetched = repo.get(&article.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, PipelineStatus::Cleaned);
        assert_eq!(fetched.cleaning_attempts, 1);
    }

    #[tokio::test]
    async fn test_pause_records_reason() {
        let (machine, repo, sink, _dir) = setup_machine().await;

        let mut article = Article::new("ds-1", "bugle", "https://bugle.example.com/story");
        article.status = PipelineStatus::Extracted;
        repo.save(&article).await.unwrap();

        machine
            .pause(&article.id, PipelineStatus::Extracted, PauseReason::NullText)
            .await
            .unwrap();

        let fetched = repo.get(&article.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, PipelineStatus::Paused);
        assert_eq!(fetched.paused_reason, Some(PauseReason::NullText));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, "ok");
    }

    #[tokio::test]
    async fn test_pause_terminal_state_rejected() {
        let (machine, repo, _sink, _dir) = setup_machine().await;

        let mut article = Article::new("ds-1", "bugle", "https://bugle.example.com/story");
        article.status = PipelineStatus::Verified;
        repo.save(&article).await.unwrap();

        let err = machine
            .pause(&article.id, PipelineStatus::Verified, PauseReason::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        let fetched = repo.get(&article.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, PipelineStatus::Verified);
    }
}
