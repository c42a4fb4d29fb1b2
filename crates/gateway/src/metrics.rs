use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking dispatch outcomes.
///
/// All counters use relaxed ordering for maximum throughput. For a
/// consistent point-in-time view, call [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Requests received, including unparseable ones.
    pub received: AtomicU64,
    /// Requests answered with replies.
    pub succeeded: AtomicU64,
    /// Requests rejected by a quota.
    pub quota_denied: AtomicU64,
    /// Requests whose computation rejected its input.
    pub validation_failed: AtomicU64,
    /// Requests that failed for any other reason.
    pub unexpected_failed: AtomicU64,
    /// Rows computed across all successful requests.
    pub rows_computed: AtomicU64,
}

impl DispatchMetrics {
    pub fn increment_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_quota_denied(&self) {
        self.quota_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_validation_failed(&self) {
        self.validation_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_unexpected_failed(&self) {
        self.unexpected_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `rows` to the computed-rows counter.
    pub fn add_rows_computed(&self, rows: u64) {
        self.rows_computed.fetch_add(rows, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            quota_denied: self.quota_denied.load(Ordering::Relaxed),
            validation_failed: self.validation_failed.load(Ordering::Relaxed),
            unexpected_failed: self.unexpected_failed.load(Ordering::Relaxed),
            rows_computed: self.rows_computed.load(Ordering::Relaxed),
        }
    }
}

/// A plain data snapshot of [`DispatchMetrics`] at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub succeeded: u64,
    pub quota_denied: u64,
    pub validation_failed: u64,
    pub unexpected_failed: u64,
    pub rows_computed: u64,
}

impl MetricsSnapshot {
    /// Requests that ended in any failure.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.quota_denied + self.validation_failed + self.unexpected_failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let snap = DispatchMetrics::default().snapshot();
        assert_eq!(snap, MetricsSnapshot::default());
        assert_eq!(snap.failed(), 0);
    }

    #[test]
    fn increment_and_snapshot() {
        let m = DispatchMetrics::default();
        m.increment_received();
        m.increment_received();
        m.increment_received();
        m.increment_succeeded();
        m.increment_quota_denied();
        m.increment_validation_failed();
        m.add_rows_computed(7);

        let snap = m.snapshot();
        assert_eq!(snap.received, 3);
        assert_eq!(snap.succeeded, 1);
        assert_eq!(snap.quota_denied, 1);
        assert_eq!(snap.validation_failed, 1);
        assert_eq!(snap.unexpected_failed, 0);
        assert_eq!(snap.rows_computed, 7);
        assert_eq!(snap.failed(), 2);
    }

    #[test]
    fn snapshot_serializes_as_flat_object() {
        let m = DispatchMetrics::default();
        m.increment_unexpected_failed();
        let json = serde_json::to_value(m.snapshot()).unwrap();
        assert_eq!(json["unexpected_failed"], 1);
        assert_eq!(json["received"], 0);
    }
}
