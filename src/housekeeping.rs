//! Periodic housekeeping sweep over pipeline records.
//!
//! Three concerns: pause extracted/cleaned articles whose body is null
//! or empty, expire candidates past their age window, and report
//! stalled records. Every action goes through the same compare-and-set
//! transitions as the pipeline workers, so the sweep is idempotent and
//! safe to run while workers are active.

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::models::{PauseReason, PipelineStatus};
use crate::pipeline::PipelineStateMachine;
use crate::repository::{DieselArticleRepository, DieselCandidateRepository};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// Sweep thresholds. All have operational defaults; the CLI overrides
/// them per invocation.
#[derive(Debug, Clone)]
pub struct HousekeepingConfig {
    /// Candidates older than this are expired.
    pub candidate_expiration: Duration,
    /// An article still in `candidate` longer than this counts as an
    /// extraction stall.
    pub extraction_stall: Duration,
    /// Still in `extracted`: cleaning stall.
    pub cleaning_stall: Duration,
    /// Still in `cleaned`: verification stall.
    pub verification_stall: Duration,
    /// Report what would change without writing anything.
    pub dry_run: bool,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            candidate_expiration: Duration::days(7),
            extraction_stall: Duration::hours(24),
            cleaning_stall: Duration::hours(24),
            verification_stall: Duration::hours(24),
            dry_run: false,
        }
    }
}

/// What one sweep did (or, in dry-run mode, would have done).
#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    pub null_text_paused: u64,
    pub expired_candidates: u64,
    /// Articles still in `candidate` past the extraction threshold.
    pub stalled_extraction: u64,
    /// Articles still in `extracted` past the cleaning threshold.
    pub stalled_cleaning: u64,
    /// Articles still in `cleaned` past the verification threshold.
    pub stalled_verification: u64,
    /// Records the sweep tried and failed to act on.
    pub record_failures: u64,
}

/// Runs the maintenance sweep.
pub struct HousekeepingSweeper {
    articles: DieselArticleRepository,
    candidates: DieselCandidateRepository,
    machine: PipelineStateMachine,
    telemetry: std::sync::Arc<dyn TelemetrySink>,
    config: HousekeepingConfig,
}

impl HousekeepingSweeper {
    pub fn new(
        articles: DieselArticleRepository,
        candidates: DieselCandidateRepository,
        machine: PipelineStateMachine,
        telemetry: std::sync::Arc<dyn TelemetrySink>,
        config: HousekeepingConfig,
    ) -> Self {
        Self {
            articles,
            candidates,
            machine,
            telemetry,
            config,
        }
    }

    /// One full sweep. Per-record failures are counted, not fatal.
    pub async fn run_sweep(&self) -> Result<SweepReport, EngineError> {
        let now = Utc::now();
        let mut report = SweepReport::default();

        // Null-text pause.
        let null_text = self.articles.list_null_text().await?;
        if self.config.dry_run {
            report.null_text_paused = null_text.len() as u64;
        } else {
            for (id, status) in null_text {
                match self.machine.pause(&id, status, PauseReason::NullText).await {
                    Ok(()) => report.null_text_paused += 1,
                    // A worker moved the record first; its new state
                    // will be reconsidered on the next sweep.
                    Err(EngineError::StateConflict { .. }) => {}
                    Err(err) => {
                        warn!(article_id = %id, error = %err, "null-text pause failed");
                        report.record_failures += 1;
                    }
                }
            }
        }

        // Candidate expiration.
        let cutoff = now - self.config.candidate_expiration;
        report.expired_candidates = if self.config.dry_run {
            self.candidates.count_expirable(cutoff).await?
        } else {
            let expired = self.candidates.expire_older_than(cutoff, now).await?;
            for id in &expired {
                self.telemetry.emit(&TelemetryEvent::transition(
                    &id.to_string(),
                    PipelineStatus::Expired,
                    "ok",
                ));
            }
            expired.len() as u64
        };

        // Stall reporting. Counted only; an operator decides whether a
        // stalled record needs intervention.
        report.stalled_extraction = self
            .articles
            .count_stalled(PipelineStatus::Candidate, now - self.config.extraction_stall)
            .await?;
        report.stalled_cleaning = self
            .articles
            .count_stalled(PipelineStatus::Extracted, now - self.config.cleaning_stall)
            .await?;
        report.stalled_verification = self
            .articles
            .count_stalled(PipelineStatus::Cleaned, now - self.config.verification_stall)
            .await?;

        let outcome = if self.config.dry_run { "dry-run" } else { "ok" };
        self.telemetry
            .emit(&TelemetryEvent::housekeeping("sweep", outcome));

        info!(
            null_text_paused = report.null_text_paused,
            expired_candidates = report.expired_candidates,
            stalled_extraction = report.stalled_extraction,
            stalled_cleaning = report.stalled_cleaning,
            stalled_verification = report.stalled_verification,
            record_failures = report.record_failures,
            dry_run = self.config.dry_run,
            "housekeeping sweep finished"
        );
        Ok(report)
    }
}
