//! Source scheduling policy: discovery intervals and failure backoff.
//!
//! The scheduler only evaluates; the caller records the attempt outcome
//! afterward via the source repository, so backoff state lives on the
//! Source row and survives process restarts.

use chrono::{DateTime, Duration, Utc};

use crate::models::Source;

/// Scheduling policy knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Ceiling for the failure backoff multiplier.
    pub max_backoff_multiplier: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_backoff_multiplier: 8,
        }
    }
}

/// Backoff multiplier: doubles per consecutive failure up to the cap,
/// resets to 1x on the next success.
pub fn backoff_multiplier(consecutive_failures: u32, config: &SchedulerConfig) -> u32 {
    let cap = config.max_backoff_multiplier.max(1);
    // Shift saturates well before any realistic failure count.
    let doubled = 1u32 << consecutive_failures.min(16);
    doubled.min(cap)
}

/// The interval a source must wait between discovery passes, stretched
/// by its failure backoff.
pub fn effective_interval(source: &Source, config: &SchedulerConfig) -> Duration {
    let base = Duration::minutes(source.discovery_interval_minutes as i64);
    base * backoff_multiplier(source.consecutive_failures, config) as i32
}

/// Whether the source is due for another discovery pass.
///
/// Only consulted when a pass opts into gating (`--due-only`); the
/// default pass skips this check but still records timestamps and
/// failure counters afterward.
pub fn is_due(source: &Source, now: DateTime<Utc>, config: &SchedulerConfig) -> bool {
    if !source.discovery_enabled {
        return false;
    }
    match source.last_discovery {
        None => true,
        Some(last) => now - last >= effective_interval(source, config),
    }
}
