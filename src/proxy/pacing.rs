//! Per-domain request pacing with adaptive backoff.
//!
//! Tracks request timing per domain and adapts delays based on
//! responses: backs off on 429/503, gradually recovers on success.
//! This is in-process pacing only; cross-process backoff is the
//! scheduler's persisted per-source policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

/// Configuration for pacing behavior.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Base delay between requests to the same domain.
    pub base_delay: Duration,
    /// Minimum delay (floor).
    pub min_delay: Duration,
    /// Maximum delay (ceiling for backoff).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff on throttling.
    pub backoff_multiplier: f64,
    /// Multiplier for recovery on success (< 1.0 to decrease delay).
    pub recovery_multiplier: f64,
    /// Consecutive successes before reducing delay.
    pub recovery_threshold: u32,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.8,
            recovery_threshold: 5,
        }
    }
}

/// State for a single domain.
#[derive(Debug, Clone)]
struct DomainState {
    current_delay: Duration,
    last_request: Option<Instant>,
    consecutive_successes: u32,
    in_backoff: bool,
}

impl DomainState {
    fn new(base_delay: Duration) -> Self {
        Self {
            current_delay: base_delay,
            last_request: None,
            consecutive_successes: 0,
            in_backoff: false,
        }
    }

    /// Time until this domain is ready for another request.
    fn time_until_ready(&self) -> Duration {
        match self.last_request {
            Some(last) => {
                let elapsed = last.elapsed();
                if elapsed >= self.current_delay {
                    Duration::ZERO
                } else {
                    self.current_delay - elapsed
                }
            }
            None => Duration::ZERO,
        }
    }
}

/// Adaptive per-domain pacer shared by all discovery workers behind one
/// egress path.
#[derive(Debug)]
pub struct DomainPacer {
    config: PacingConfig,
    domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

impl DomainPacer {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config,
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Extract the pacing key (host) from a URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Wait until the domain is ready, then mark the request as
    /// started. Returns the domain key for later outcome reporting.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let domain = Self::extract_domain(url)?;

        let wait_time = {
            let domains = self.domains.read().await;
            domains
                .get(&domain)
                .map(|s| s.time_until_ready())
                .unwrap_or(Duration::ZERO)
        };

        if wait_time > Duration::ZERO {
            debug!("Pacing {}: waiting {:?}", domain, wait_time);
            tokio::time::sleep(wait_time).await;
        }

        {
            let mut domains = self.domains.write().await;
            let state = domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(self.config.base_delay));
            state.last_request = Some(Instant::now());
        }

        Some(domain)
    }

    /// Report a successful request - may decrease delay.
    pub async fn report_success(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.consecutive_successes += 1;

            if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
                let new_delay = Duration::from_secs_f64(
                    state.current_delay.as_secs_f64() * self.config.recovery_multiplier,
                );
                state.current_delay = new_delay.max(self.config.min_delay);

                if state.current_delay <= self.config.base_delay {
                    state.in_backoff = false;
                    state.current_delay = self.config.base_delay;
                    debug!("Domain {} recovered from backoff", domain);
                }

                state.consecutive_successes = 0;
            }
        }
    }

    /// Report a definite throttling response (429 or 503) - increases
    /// delay.
    pub async fn report_throttled(&self, domain: &str, status_code: u16) {
        let mut domains = self.domains.write().await;
        let state = domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(self.config.base_delay));

        state.consecutive_successes = 0;
        state.in_backoff = true;

        let new_delay = Duration::from_secs_f64(
            state.current_delay.as_secs_f64() * self.config.backoff_multiplier,
        );
        state.current_delay = new_delay.min(self.config.max_delay);

        warn!(
            "Throttled by {} (HTTP {}), backing off to {:?}",
            domain, status_code, state.current_delay
        );
    }

    /// Report a server error (5xx other than 503) - mild backoff.
    pub async fn report_server_error(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            let new_delay = Duration::from_secs_f64(state.current_delay.as_secs_f64() * 1.5);
            state.current_delay = new_delay.min(self.config.max_delay);
            debug!(
                "Server error for {}, delay increased to {:?}",
                domain, state.current_delay
            );
        }
    }

    /// Current delay for a domain, for inspection.
    pub async fn current_delay(&self, domain: &str) -> Duration {
        let domains = self.domains.read().await;
        domains
            .get(domain)
            .map(|s| s.current_delay)
            .unwrap_or(self.config.base_delay)
    }
}

impl Default for DomainPacer {
    fn default() -> Self {
        Self::new(PacingConfig::default())
    }
}
