//! Best-effort telemetry emission.
//!
//! Every discovery attempt and pipeline transition emits one structured
//! event to a write-only sink. Emission must never block or fail the
//! operation it describes; sinks swallow their own errors.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::PipelineStatus;

/// One structured telemetry event.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    /// What happened: a discovery attempt, a stage transition, or a
    /// housekeeping action.
    pub stage: String,
    pub record_id: String,
    pub dataset_id: Option<String>,
    pub outcome: String,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn discovery(source_id: &str, dataset_id: &str, outcome: &str) -> Self {
        Self {
            stage: "discovery".to_string(),
            record_id: source_id.to_string(),
            dataset_id: Some(dataset_id.to_string()),
            outcome: outcome.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn transition(record_id: &str, to: PipelineStatus, outcome: &str) -> Self {
        Self {
            stage: format!("transition:{to}"),
            record_id: record_id.to_string(),
            dataset_id: None,
            outcome: outcome.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn housekeeping(category: &str, outcome: &str) -> Self {
        Self {
            stage: format!("housekeeping:{category}"),
            record_id: String::new(),
            dataset_id: None,
            outcome: outcome.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Write-only sink for telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Record one event. Implementations must be non-blocking and
    /// infallible from the caller's point of view.
    fn emit(&self, event: &TelemetryEvent);
}

/// Default sink: structured tracing records under the `telemetry`
/// target, picked up by whatever subscriber the deployment configures.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn emit(&self, event: &TelemetryEvent) {
        tracing::info!(
            target: "telemetry",
            stage = %event.stage,
            record_id = %event.record_id,
            dataset_id = event.dataset_id.as_deref().unwrap_or("-"),
            outcome = %event.outcome,
            timestamp = %event.timestamp.to_rfc3339(),
            "telemetry event"
        );
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct RecordingTelemetrySink {
    events: std::sync::Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetrySink {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl TelemetrySink for RecordingTelemetrySink {
    fn emit(&self, event: &TelemetryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_captures_events() {
        let sink = RecordingTelemetrySink::default();
        sink.emit(&TelemetryEvent::discovery("bugle", "ds-1", "ok:3"));
        sink.emit(&TelemetryEvent::transition(
            "article-1",
            PipelineStatus::Cleaned,
            "ok",
        ));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].stage, "discovery");
        assert_eq!(events[0].dataset_id.as_deref(), Some("ds-1"));
        assert_eq!(events[1].stage, "transition:cleaned");
    }
}
