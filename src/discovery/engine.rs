//! Discovery engine: turns registered sources into candidate links.
//!
//! One pass per source: fetch the homepage, find feeds and section
//! fronts, pull article links from each, then record the attempt
//! outcome against the source's scheduling state. Per-source failures
//! are absorbed so one broken origin cannot sink the whole run.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::OnceLock;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::discovery::{feed, normalize_url, sections, CancelFlag};
use crate::error::EngineError;
use crate::models::{CandidateLink, Source};
use crate::proxy::Fetcher;
use crate::repository::{
    DieselCandidateRepository, DieselDatasetRepository, DieselSourceRepository,
};
use crate::scheduler::{self, SchedulerConfig};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// At most this many feeds are fetched per source per pass.
const MAX_FEEDS_PER_SOURCE: usize = 3;

/// Knobs for one discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub dataset_id: String,
    /// Only process sources that are due per their interval and
    /// failure backoff. The default pass is unconditional over enabled
    /// sources; outcomes are recorded identically in both modes.
    pub due_only: bool,
    /// Process at most this many sources.
    pub source_limit: Option<usize>,
    /// Sources fetched concurrently.
    pub concurrency: usize,
}

/// Summary of one discovery run.
#[derive(Debug, Default, Clone)]
pub struct DiscoveryReport {
    pub sources_considered: usize,
    pub sources_succeeded: usize,
    pub sources_failed: usize,
    pub sources_skipped: usize,
    pub new_candidates: u64,
}

enum SourceOutcome {
    Succeeded { new_candidates: u64 },
    Failed,
    Skipped,
}

/// Orchestrates discovery across sources within one dataset.
pub struct DiscoveryEngine {
    sources: DieselSourceRepository,
    candidates: DieselCandidateRepository,
    datasets: DieselDatasetRepository,
    fetcher: Arc<dyn Fetcher>,
    telemetry: Arc<dyn TelemetrySink>,
    scheduler: SchedulerConfig,
    cancel: CancelFlag,
}

impl DiscoveryEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sources: DieselSourceRepository,
        candidates: DieselCandidateRepository,
        datasets: DieselDatasetRepository,
        fetcher: Arc<dyn Fetcher>,
        telemetry: Arc<dyn TelemetrySink>,
        scheduler: SchedulerConfig,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            sources,
            candidates,
            datasets,
            fetcher,
            telemetry,
            scheduler,
            cancel,
        }
    }

    /// Run one discovery pass. An unknown dataset aborts the run; a
    /// failing source only marks its own outcome.
    pub async fn run(&self, options: &DiscoveryOptions) -> Result<DiscoveryReport, EngineError> {
        let dataset = self.datasets.require(&options.dataset_id).await?;
        let now = Utc::now();

        let mut report = DiscoveryReport::default();
        let mut eligible = Vec::new();

        for source in self.sources.get_all().await? {
            if !source.discovery_enabled {
                continue;
            }
            report.sources_considered += 1;

            if Url::parse(&source.homepage_url).is_err() {
                warn!(
                    source_id = %source.id,
                    homepage = %source.homepage_url,
                    "source has malformed homepage URL, skipping"
                );
                self.telemetry
                    .emit(&TelemetryEvent::discovery(&source.id, &dataset.id, "skipped:malformed"));
                report.sources_skipped += 1;
                continue;
            }

            if options.due_only && !scheduler::is_due(&source, now, &self.scheduler) {
                debug!(source_id = %source.id, "source not due, skipping");
                report.sources_skipped += 1;
                continue;
            }

            eligible.push(source);
        }

        if let Some(limit) = options.source_limit {
            eligible.truncate(limit);
        }

        let concurrency = options.concurrency.max(1);
        let outcomes: Vec<SourceOutcome> = stream::iter(eligible)
            .map(|source| self.discover_source(&dataset.id, source))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                SourceOutcome::Succeeded { new_candidates } => {
                    report.sources_succeeded += 1;
                    report.new_candidates += new_candidates;
                }
                SourceOutcome::Failed => report.sources_failed += 1,
                SourceOutcome::Skipped => report.sources_skipped += 1,
            }
        }

        info!(
            dataset_id = %dataset.id,
            succeeded = report.sources_succeeded,
            failed = report.sources_failed,
            skipped = report.sources_skipped,
            new_candidates = report.new_candidates,
            "discovery run finished"
        );
        Ok(report)
    }

    /// One source, one pass. Fetch errors and per-row database errors
    /// are absorbed into the outcome; only outcome recording itself can
    /// leave the source's counters stale, and that is logged.
    async fn discover_source(&self, dataset_id: &str, mut source: Source) -> SourceOutcome {
        let now = Utc::now();

        if self.cancel.is_cancelled() {
            return SourceOutcome::Skipped;
        }

        let homepage = match self.fetcher.fetch(&source.homepage_url).await {
            Ok(page) => page,
            Err(err) => {
                warn!(source_id = %source.id, error = %err, "homepage fetch failed");
                self.record_outcome(dataset_id, &source.id, now, false, 0).await;
                return SourceOutcome::Failed;
            }
        };

        let mut links: Vec<String> = Vec::new();

        // Article links exposed directly on the homepage.
        links.extend(extract_article_links(&homepage.body, &source.homepage_url));

        // Feed entries.
        for feed_url in self.find_feeds(&homepage.body, &source.homepage_url).await {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.fetcher.fetch(&feed_url).await {
                Ok(page) => links.extend(feed::extract_entry_links(&page.body, &feed_url)),
                Err(err) => debug!(source_id = %source.id, feed_url, error = %err, "feed fetch failed"),
            }
        }

        // Section fronts.
        if source.section_discovery_enabled {
            for url in sections::discover_sections(&homepage.body, &source.homepage_url) {
                source.sections.insert_new(&url, now);
            }

            for section_url in source.sections.urls() {
                if self.cancel.is_cancelled() {
                    break;
                }
                match self.fetcher.fetch(&section_url).await {
                    Ok(page) => {
                        let found = extract_article_links(&page.body, &section_url);
                        source.sections.record_success(&section_url, found.len(), now);
                        links.extend(found);
                    }
                    Err(err) => {
                        debug!(source_id = %source.id, section_url, error = %err, "section fetch failed");
                        source.sections.record_failure(&section_url);
                    }
                }
            }

            if let Err(err) = self
                .sources
                .update_sections(&source.id, &source.sections)
                .await
            {
                warn!(source_id = %source.id, error = %err, "failed to persist section stats");
            }
        }

        let new_candidates = self.store_candidates(dataset_id, &source, links, now).await;
        self.record_outcome(dataset_id, &source.id, now, true, new_candidates)
            .await;

        SourceOutcome::Succeeded { new_candidates }
    }

    /// Feed URLs for a source: `<link rel="alternate">` declarations on
    /// the homepage, or well-known paths when the homepage declares
    /// none. Probed paths are not fetched here; the caller fetches and
    /// an unparseable body simply yields no entries.
    async fn find_feeds(&self, homepage_html: &str, base_url: &str) -> Vec<String> {
        let mut feeds = extract_declared_feeds(homepage_html, base_url);
        if feeds.is_empty() {
            if let Ok(base) = Url::parse(base_url) {
                feeds = feed::WELL_KNOWN_FEED_PATHS
                    .iter()
                    .filter_map(|path| base.join(path).ok())
                    .map(|u| u.to_string())
                    .collect();
            }
        }
        feeds.truncate(MAX_FEEDS_PER_SOURCE);
        feeds
    }

    /// Normalize, dedupe, and persist candidate links. Returns the
    /// number of rows actually inserted.
    async fn store_candidates(
        &self,
        dataset_id: &str,
        source: &Source,
        links: Vec<String>,
        now: chrono::DateTime<Utc>,
    ) -> u64 {
        let known = match self.candidates.existing_urls(&source.id, dataset_id).await {
            Ok(known) => known,
            Err(err) => {
                warn!(source_id = %source.id, error = %err, "failed to load known URLs");
                HashSet::new()
            }
        };

        let mut seen = HashSet::new();
        let mut inserted = 0u64;
        for raw in links {
            let url = normalize_url(&raw);
            if known.contains(&url) || !seen.insert(url.clone()) {
                continue;
            }
            let link = CandidateLink::new(dataset_id, &source.id, &url, now);
            match self.candidates.insert_new(&link).await {
                // The unique index still guards against races with
                // other workers; a lost race just counts as known.
                Ok(true) => inserted += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(source_id = %source.id, url, error = %err, "candidate insert failed")
                }
            }
        }
        inserted
    }

    async fn record_outcome(
        &self,
        dataset_id: &str,
        source_id: &str,
        now: chrono::DateTime<Utc>,
        success: bool,
        new_candidates: u64,
    ) {
        if let Err(err) = self
            .sources
            .record_discovery_outcome(source_id, now, success)
            .await
        {
            warn!(source_id, error = %err, "failed to record discovery outcome");
        }

        let outcome = if success {
            format!("ok:{new_candidates}")
        } else {
            "error".to_string()
        };
        self.telemetry
            .emit(&TelemetryEvent::discovery(source_id, dataset_id, &outcome));
    }
}

/// `<link rel="alternate">` feed declarations in homepage HTML.
fn extract_declared_feeds(html: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let selector = Selector::parse(
        "link[rel=\"alternate\"][type=\"application/rss+xml\"], \
         link[rel=\"alternate\"][type=\"application/atom+xml\"]",
    )
    .unwrap_or_else(|_| unreachable!("static selector"));

    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .map(|u| u.to_string())
        .collect()
}

fn date_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"/20\d{2}/").unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

/// Same-host links that look like individual articles: a hyphenated
/// slug in the last path segment, or a `/YYYY/` date segment.
pub fn extract_article_links(html: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let Some(base_host) = base.host_str().map(str::to_lowercase) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let selector =
        Selector::parse("a[href]").unwrap_or_else(|_| unreachable!("static selector"));

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        if resolved.host_str().map(str::to_lowercase).as_deref() != Some(base_host.as_str()) {
            continue;
        }
        if !looks_like_article(resolved.path()) {
            continue;
        }
        let url = resolved.to_string();
        if seen.insert(url.clone()) {
            links.push(url);
        }
    }
    links
}

fn looks_like_article(path: &str) -> bool {
    if date_path_pattern().is_match(path) {
        return true;
    }
    let last = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    last.contains('-') && last.len() >= 12
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::models::Dataset;
    use crate::proxy::FetchedPage;
    use crate::repository::testing::setup_test_db;
    use crate::telemetry::RecordingTelemetrySink;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned-page fetcher for engine tests.
    #[derive(Default)]
    struct MockFetcher {
        pages: HashMap<String, String>,
        fetched: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        fn with_page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }

        fn fetched_urls(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            self.fetched.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(body) => Ok(FetchedPage {
                    url: url.to_string(),
                    status: 200,
                    body: body.clone(),
                }),
                None => Err(FetchError::Network(format!("no route to {url}"))),
            }
        }
    }

    const HOMEPAGE: &str = r#"
        <html><head>
            <link rel="alternate" type="application/rss+xml" href="/main.rss">
        </head><body>
            <nav>
                <a href="/sports">Sports</a>
                <a href="https://elsewhere.example.com/news">Syndicated</a>
            </nav>
            <main>
                <a href="/2025/08/mayor-resigns-amid-scandal">Mayor resigns</a>
            </main>
        </body></html>
    "#;

    const SPORTS_PAGE: &str = r#"
        <html><body>
            <a href="/sports/home-team-wins-big-final">Home team wins</a>
            <a href="/sports">Section home</a>
        </body></html>
    "#;

    const FEED_BODY: &str = r#"<?xml version="1.0"?>
        <rss version="2.0"><channel><title>Bugle</title>
            <item><link>https://bugle.example.com/from-the-feed-today</link></item>
        </channel></rss>"#;

    struct Fixture {
        engine: DiscoveryEngine,
        sources: DieselSourceRepository,
        candidates: DieselCandidateRepository,
        sink: Arc<RecordingTelemetrySink>,
        cancel: CancelFlag,
        _dir: tempfile::TempDir,
    }

    async fn setup(fetcher: Arc<dyn Fetcher>) -> Fixture {
        let (pool, dir) = setup_test_db().await;
        let sources = DieselSourceRepository::new(pool.clone());
        let candidates = DieselCandidateRepository::new(pool.clone());
        let datasets = DieselDatasetRepository::new(pool.clone());
        let sink = Arc::new(RecordingTelemetrySink::default());
        let cancel = CancelFlag::new();

        datasets
            .save(&Dataset::new("ds-1".to_string(), "Dataset One".to_string()))
            .await
            .unwrap();

        let engine = DiscoveryEngine::new(
            sources.clone(),
            candidates.clone(),
            datasets,
            fetcher,
            sink.clone(),
            SchedulerConfig::default(),
            cancel.clone(),
        );
        Fixture {
            engine,
            sources,
            candidates,
            sink,
            cancel,
            _dir: dir,
        }
    }

    fn options() -> DiscoveryOptions {
        DiscoveryOptions {
            dataset_id: "ds-1".to_string(),
            due_only: false,
            source_limit: None,
            concurrency: 2,
        }
    }

    fn bugle() -> Source {
        Source::new(
            "bugle".to_string(),
            "Daily Bugle".to_string(),
            "https://bugle.example.com/".to_string(),
        )
    }

    #[test]
    fn test_article_link_heuristic() {
        assert!(looks_like_article("/2025/08/anything"));
        assert!(looks_like_article("/sports/home-team-wins-big-final"));
        assert!(!looks_like_article("/sports"));
        assert!(!looks_like_article("/about-us"));
    }

    #[tokio::test]
    async fn test_full_pass_collects_feed_section_and_homepage_links() {
        let fetcher = MockFetcher::default()
            .with_page("https://bugle.example.com/", HOMEPAGE)
            .with_page("https://bugle.example.com/main.rss", FEED_BODY)
            .with_page("https://bugle.example.com/sports", SPORTS_PAGE);
        let fixture = setup(Arc::new(fetcher)).await;
        fixture.sources.save(&bugle()).await.unwrap();

        let report = fixture.engine.run(&options()).await.unwrap();
        assert_eq!(report.sources_succeeded, 1);
        assert_eq!(report.sources_failed, 0);
        assert_eq!(report.new_candidates, 3);

        for url in [
            "https://bugle.example.com/2025/08/mayor-resigns-amid-scandal",
            "https://bugle.example.com/from-the-feed-today",
            "https://bugle.example.com/sports/home-team-wins-big-final",
        ] {
            assert!(
                fixture.candidates.get("ds-1", url).await.unwrap().is_some(),
                "missing candidate {url}"
            );
        }

        // Section stats were persisted.
        let source = fixture.sources.get("bugle").await.unwrap().unwrap();
        let section = source
            .sections
            .get("https://bugle.example.com/sports")
            .unwrap();
        assert_eq!(section.success_count, 1);
        assert_eq!(section.avg_articles, 1.0);

        // Success resets scheduling state.
        assert_eq!(source.consecutive_failures, 0);
        assert!(source.last_discovery.is_some());
    }

    #[tokio::test]
    async fn test_second_pass_inserts_nothing_new() {
        let fetcher = MockFetcher::default()
            .with_page("https://bugle.example.com/", HOMEPAGE)
            .with_page("https://bugle.example.com/main.rss", FEED_BODY)
            .with_page("https://bugle.example.com/sports", SPORTS_PAGE);
        let fixture = setup(Arc::new(fetcher)).await;
        fixture.sources.save(&bugle()).await.unwrap();

        let first = fixture.engine.run(&options()).await.unwrap();
        assert_eq!(first.new_candidates, 3);

        let second = fixture.engine.run(&options()).await.unwrap();
        assert_eq!(second.new_candidates, 0);
        assert_eq!(second.sources_succeeded, 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_increments_source_counter() {
        let fixture = setup(Arc::new(MockFetcher::default())).await;
        fixture.sources.save(&bugle()).await.unwrap();

        let report = fixture.engine.run(&options()).await.unwrap();
        assert_eq!(report.sources_failed, 1);
        assert_eq!(report.new_candidates, 0);

        let source = fixture.sources.get("bugle").await.unwrap().unwrap();
        assert_eq!(source.consecutive_failures, 1);
        assert!(source.last_discovery.is_some());

        let events = fixture.sink.events();
        assert!(events.iter().any(|e| e.outcome == "error"));
    }

    #[tokio::test]
    async fn test_unknown_dataset_aborts_run() {
        let fixture = setup(Arc::new(MockFetcher::default())).await;
        let err = fixture
            .engine
            .run(&DiscoveryOptions {
                dataset_id: "nope".to_string(),
                ..options()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DatasetNotFound { .. }));
    }

    #[tokio::test]
    async fn test_malformed_homepage_skipped_not_failed() {
        let fixture = setup(Arc::new(MockFetcher::default())).await;
        let mut broken = bugle();
        broken.id = "broken".to_string();
        broken.homepage_url = "not a url".to_string();
        fixture.sources.save(&broken).await.unwrap();

        let report = fixture.engine.run(&options()).await.unwrap();
        assert_eq!(report.sources_skipped, 1);
        assert_eq!(report.sources_failed, 0);

        let events = fixture.sink.events();
        assert!(events.iter().any(|e| e.outcome == "skipped:malformed"));
    }

    #[tokio::test]
    async fn test_due_only_skips_not_due_sources() {
        let fetcher = MockFetcher::default().with_page("https://bugle.example.com/", HOMEPAGE);
        let fixture = setup(Arc::new(fetcher)).await;

        let mut disabled = bugle();
        disabled.id = "disabled".to_string();
        disabled.discovery_enabled = false;
        fixture.sources.save(&disabled).await.unwrap();

        let mut recent = bugle();
        recent.last_discovery = Some(Utc::now());
        fixture.sources.save(&recent).await.unwrap();

        let report = fixture
            .engine
            .run(&DiscoveryOptions {
                due_only: true,
                ..options()
            })
            .await
            .unwrap();
        // Disabled sources are not even considered; the recent one is
        // considered but not due.
        assert_eq!(report.sources_considered, 1);
        assert_eq!(report.sources_skipped, 1);
        assert_eq!(report.sources_succeeded, 0);
    }

    #[tokio::test]
    async fn test_default_pass_ignores_interval_but_not_disabled() {
        let fetcher = MockFetcher::default()
            .with_page("https://bugle.example.com/", HOMEPAGE)
            .with_page("https://bugle.example.com/main.rss", FEED_BODY)
            .with_page("https://bugle.example.com/sports", SPORTS_PAGE);
        let fixture = setup(Arc::new(fetcher)).await;

        let mut recent = bugle();
        recent.last_discovery = Some(Utc::now());
        fixture.sources.save(&recent).await.unwrap();

        let mut disabled = bugle();
        disabled.id = "disabled".to_string();
        disabled.discovery_enabled = false;
        fixture.sources.save(&disabled).await.unwrap();

        // The default pass is unconditional: the recently-discovered
        // source is processed, the disabled one never is.
        let report = fixture.engine.run(&options()).await.unwrap();
        assert_eq!(report.sources_considered, 1);
        assert_eq!(report.sources_succeeded, 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_fetches_nothing() {
        let fetcher = Arc::new(
            MockFetcher::default().with_page("https://bugle.example.com/", HOMEPAGE),
        );
        let fixture = setup(fetcher.clone()).await;
        fixture.sources.save(&bugle()).await.unwrap();

        fixture.cancel.cancel();
        let report = fixture.engine.run(&options()).await.unwrap();

        assert!(fetcher.fetched_urls().is_empty());
        // An interrupted source is reported as skipped, not succeeded.
        assert_eq!(report.sources_skipped, 1);
        assert_eq!(report.sources_succeeded, 0);
    }

    #[tokio::test]
    async fn test_source_limit_truncates() {
        let fetcher = MockFetcher::default();
        let fixture = setup(Arc::new(fetcher)).await;

        for i in 0..3 {
            let mut source = bugle();
            source.id = format!("source-{i}");
            source.homepage_url = format!("https://s{i}.example.com/");
            fixture.sources.save(&source).await.unwrap();
        }

        let report = fixture
            .engine
            .run(&DiscoveryOptions {
                source_limit: Some(2),
                ..options()
            })
            .await
            .unwrap();
        assert_eq!(report.sources_failed, 2);
    }
}
