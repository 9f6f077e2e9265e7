//! Domain models for sources, candidate links, and articles.
//!
//! These are the persistence-agnostic types used across the engine.
//! Database records live in `repository::diesel_models` and convert
//! into these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A source never tracks more than this many discovered sections.
pub const MAX_SECTIONS_PER_SOURCE: usize = 10;

/// Lifecycle status shared by candidate links and articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStatus {
    Candidate,
    Extracted,
    Cleaned,
    Verified,
    Paused,
    Expired,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Candidate => "candidate",
            PipelineStatus::Extracted => "extracted",
            PipelineStatus::Cleaned => "cleaned",
            PipelineStatus::Verified => "verified",
            PipelineStatus::Paused => "paused",
            PipelineStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "candidate" => Some(PipelineStatus::Candidate),
            "extracted" => Some(PipelineStatus::Extracted),
            "cleaned" => Some(PipelineStatus::Cleaned),
            "verified" => Some(PipelineStatus::Verified),
            "paused" => Some(PipelineStatus::Paused),
            "expired" => Some(PipelineStatus::Expired),
            _ => None,
        }
    }

    /// Terminal states accept no further automatic transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Verified | PipelineStatus::Paused | PipelineStatus::Expired
        )
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason code recorded when a record is transitioned to `paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    NullText,
    Manual,
}

impl PauseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseReason::NullText => "null-text",
            PauseReason::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "null-text" => Some(PauseReason::NullText),
            "manual" => Some(PauseReason::Manual),
            _ => None,
        }
    }
}

/// Per-section discovery statistics attached to a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub url: String,
    pub first_discovered: DateTime<Utc>,
    pub last_success: Option<DateTime<Utc>>,
    pub success_count: u32,
    pub failure_count: u32,
    /// Running average of article links found per successful fetch.
    pub avg_articles: f64,
}

impl SectionRecord {
    pub fn new(url: String, now: DateTime<Utc>) -> Self {
        Self {
            url,
            first_discovered: now,
            last_success: None,
            success_count: 0,
            failure_count: 0,
            avg_articles: 0.0,
        }
    }

    /// Record a successful section fetch and fold the article count into
    /// the running average.
    pub fn record_success(&mut self, articles_found: usize, now: DateTime<Utc>) {
        self.success_count += 1;
        self.last_success = Some(now);
        let n = self.success_count as f64;
        self.avg_articles += (articles_found as f64 - self.avg_articles) / n;
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
    }
}

/// Bounded list of discovered sections.
///
/// Capped at [`MAX_SECTIONS_PER_SOURCE`]; inserts beyond the cap are
/// dropped, existing entries are merged rather than replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionList(Vec<SectionRecord>);

impl SectionList {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectionRecord> {
        self.0.iter()
    }

    pub fn urls(&self) -> Vec<String> {
        self.0.iter().map(|s| s.url.clone()).collect()
    }

    pub fn get(&self, url: &str) -> Option<&SectionRecord> {
        self.0.iter().find(|s| s.url == url)
    }

    /// Add a newly discovered section URL. Returns true if it was
    /// inserted; false if it already existed or the list is full.
    pub fn insert_new(&mut self, url: &str, now: DateTime<Utc>) -> bool {
        if self.0.iter().any(|s| s.url == url) {
            return false;
        }
        if self.0.len() >= MAX_SECTIONS_PER_SOURCE {
            return false;
        }
        self.0.push(SectionRecord::new(url.to_string(), now));
        true
    }

    pub fn record_success(&mut self, url: &str, articles_found: usize, now: DateTime<Utc>) {
        if let Some(section) = self.0.iter_mut().find(|s| s.url == url) {
            section.record_success(articles_found, now);
        }
    }

    pub fn record_failure(&mut self, url: &str) {
        if let Some(section) = self.0.iter_mut().find(|s| s.url == url) {
            section.record_failure();
        }
    }
}

/// A crawlable origin. Sources are registered externally and only
/// disabled, never deleted.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub homepage_url: String,
    pub discovery_enabled: bool,
    pub section_discovery_enabled: bool,
    pub sections: SectionList,
    pub discovery_interval_minutes: u32,
    pub consecutive_failures: u32,
    pub last_discovery: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Source {
    pub fn new(id: String, name: String, homepage_url: String) -> Self {
        Self {
            id,
            name,
            homepage_url,
            discovery_enabled: true,
            section_discovery_enabled: true,
            sections: SectionList::default(),
            discovery_interval_minutes: 60,
            consecutive_failures: 0,
            last_discovery: None,
            created_at: Utc::now(),
        }
    }
}

/// A URL observed as a potential article, scoped to one dataset and one
/// source. `(dataset_id, url)` is unique; the same URL in two datasets
/// is two independent rows.
#[derive(Debug, Clone)]
pub struct CandidateLink {
    pub id: i32,
    pub dataset_id: String,
    pub source_id: String,
    /// Normalized URL: no fragment, no tracking query parameters.
    pub url: String,
    pub status: PipelineStatus,
    pub discovered_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

impl CandidateLink {
    pub fn new(dataset_id: &str, source_id: &str, url: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            dataset_id: dataset_id.to_string(),
            source_id: source_id.to_string(),
            url: url.to_string(),
            status: PipelineStatus::Candidate,
            discovered_at: now,
            status_changed_at: now,
        }
    }
}

/// Downstream record produced once a candidate is accepted for
/// extraction.
#[derive(Debug, Clone)]
pub struct Article {
    pub id: String,
    pub dataset_id: String,
    pub source_id: String,
    pub url: String,
    pub status: PipelineStatus,
    pub body: Option<String>,
    pub paused_reason: Option<PauseReason>,
    /// Time the record entered its *current* status. Reset on every
    /// transition; housekeeping compares this against stall thresholds.
    pub stage_entered_at: DateTime<Utc>,
    pub extraction_attempts: u32,
    pub cleaning_attempts: u32,
    pub verification_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn new(dataset_id: &str, source_id: &str, url: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            dataset_id: dataset_id.to_string(),
            source_id: source_id.to_string(),
            url: url.to_string(),
            status: PipelineStatus::Candidate,
            body: None,
            paused_reason: None,
            stage_entered_at: now,
            extraction_attempts: 0,
            cleaning_attempts: 0,
            verification_attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An operator project. Candidate links are isolated per dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Dataset {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            PipelineStatus::Candidate,
            PipelineStatus::Extracted,
            PipelineStatus::Cleaned,
            PipelineStatus::Verified,
            PipelineStatus::Paused,
            PipelineStatus::Expired,
        ] {
            assert_eq!(PipelineStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(PipelineStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(PipelineStatus::Verified.is_terminal());
        assert!(PipelineStatus::Paused.is_terminal());
        assert!(PipelineStatus::Expired.is_terminal());
        assert!(!PipelineStatus::Candidate.is_terminal());
        assert!(!PipelineStatus::Extracted.is_terminal());
        assert!(!PipelineStatus::Cleaned.is_terminal());
    }

    #[test]
    fn test_section_list_cap() {
        let now = Utc::now();
        let mut sections = SectionList::default();
        for i in 0..MAX_SECTIONS_PER_SOURCE {
            assert!(sections.insert_new(&format!("https://example.com/s{i}"), now));
        }
        assert_eq!(sections.len(), MAX_SECTIONS_PER_SOURCE);
        assert!(!sections.insert_new("https://example.com/overflow", now));
        assert_eq!(sections.len(), MAX_SECTIONS_PER_SOURCE);
    }

    #[test]
    fn test_section_list_merge_not_replace() {
        let now = Utc::now();
        let mut sections = SectionList::default();
        sections.insert_new("https://example.com/news", now);
        sections.record_success("https://example.com/news", 10, now);

        // Re-discovering the same URL keeps the existing stats.
        assert!(!sections.insert_new("https://example.com/news", now));
        let record = sections.get("https://example.com/news").unwrap();
        assert_eq!(record.success_count, 1);
        assert_eq!(record.avg_articles, 10.0);
    }

    #[test]
    fn test_running_average() {
        let now = Utc::now();
        let mut record = SectionRecord::new("https://example.com/news".to_string(), now);
        record.record_success(10, now);
        record.record_success(20, now);
        assert_eq!(record.avg_articles, 15.0);
        record.record_success(30, now);
        assert_eq!(record.avg_articles, 20.0);
        assert_eq!(record.success_count, 3);
    }

    #[test]
    fn test_pause_reason_round_trip() {
        for reason in [PauseReason::NullText, PauseReason::Manual] {
            assert_eq!(PauseReason::from_str(reason.as_str()), Some(reason));
        }
        assert_eq!(PauseReason::from_str("something-else"), None);
    }
}
