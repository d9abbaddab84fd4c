//! Record of recent fallbacks taken by the search pipeline

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Mutex;

/// Events older than this are pruned on every write
const RETENTION_HOURS: i64 = 24;
const MAX_ERROR_CHARS: usize = 200;

/// One fallback taken while answering a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradationEvent {
    pub timestamp: DateTime<Utc>,
    /// Component that failed, e.g. "vector" or "reranker"
    pub component: String,
    /// What the pipeline did instead
    pub fallback: String,
    pub error: String,
}

/// Bounded in-memory log of degradation events
#[derive(Debug, Default)]
pub struct DegradationLog {
    events: Mutex<Vec<DegradationEvent>>,
}

impl DegradationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, component: &str, fallback: &str, error: &str) {
        self.record_at(Utc::now(), component, fallback, error);
    }

    fn record_at(&self, timestamp: DateTime<Utc>, component: &str, fallback: &str, error: &str) {
        tracing::warn!(
            component = component,
            fallback = fallback,
            "Degradation: {} -> {}: {}",
            component,
            fallback,
            error
        );

        let event = DegradationEvent {
            timestamp,
            component: component.to_string(),
            fallback: fallback.to_string(),
            error: error.chars().take(MAX_ERROR_CHARS).collect(),
        };

        // A poisoned log only loses history; searching continues
        let Ok(mut events) = self.events.lock() else {
            return;
        };
        let cutoff = Utc::now() - Duration::hours(RETENTION_HOURS);
        events.retain(|e| e.timestamp > cutoff);
        events.push(event);
    }

    /// Events from the last `hours` hours, oldest first
    pub fn recent(&self, hours: i64) -> Vec<DegradationEvent> {
        let cutoff = Utc::now() - Duration::hours(hours);
        self.events
            .lock()
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.timestamp > cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every event, returning how many there were
    pub fn clear(&self) -> usize {
        self.events
            .lock()
            .map(|mut events| {
                let count = events.len();
                events.clear();
                count
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_and_truncates() {
        let log = DegradationLog::new();
        log.record("vector", "keyword_only", &"x".repeat(500));

        let events = log.recent(24);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].component, "vector");
        assert_eq!(events[0].error.chars().count(), 200);
    }

    #[test]
    fn test_prunes_old_events() {
        let log = DegradationLog::new();
        log.record_at(Utc::now() - Duration::hours(30), "reranker", "hybrid_order", "stale");
        log.record("reranker", "hybrid_order", "timeout");

        let events = log.recent(48);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error, "timeout");
    }

    #[test]
    fn test_recent_window_and_clear() {
        let log = DegradationLog::new();
        log.record_at(Utc::now() - Duration::hours(3), "keyword", "vector_only", "old");
        log.record("keyword", "vector_only", "new");

        assert_eq!(log.recent(1).len(), 1);
        assert_eq!(log.recent(24).len(), 2);
        assert_eq!(log.clear(), 2);
        assert!(log.recent(24).is_empty());
    }
}
