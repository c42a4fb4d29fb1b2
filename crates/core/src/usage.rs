use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scope::ScopeKey;
use crate::types::{Identity, RequestId};

/// One accepted request's contribution to daily usage.
///
/// Records are append-only: they are written once, after a request passes
/// quota checks, and never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Unique identifier for this record (UUID v4).
    pub id: String,
    /// Request that produced this record.
    pub request_id: RequestId,
    /// Identity the usage is charged to.
    pub identity: Identity,
    /// Canonical [`ScopeKey`] string the record aggregates under.
    pub scope_key: String,
    /// Number of rows in the request.
    pub row_count: u64,
    /// When the request was received.
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    /// Build a record for `row_count` rows charged to `scope`.
    #[must_use]
    pub fn new(
        scope: &ScopeKey,
        request_id: impl Into<RequestId>,
        row_count: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            identity: scope.identity.clone(),
            scope_key: scope.canonical(),
            row_count,
            timestamp,
        }
    }
}

/// Quantity aggregated over the usage records of one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageMetric {
    /// Sum of `row_count` over all records.
    RowCount,
    /// Number of records, i.e. accepted requests.
    Requests,
}

impl UsageMetric {
    /// Return a string representation of the metric.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RowCount => "row_count",
            Self::Requests => "requests",
        }
    }

    /// This record's contribution to the metric.
    #[must_use]
    pub fn contribution(&self, record: &UsageRecord) -> u64 {
        match self {
            Self::RowCount => record.row_count,
            Self::Requests => 1,
        }
    }
}

impl std::fmt::Display for UsageMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn scope() -> ScopeKey {
        ScopeKey::new("alice", "f", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
    }

    #[test]
    fn record_carries_scope() {
        let rec = UsageRecord::new(&scope(), "req-1", 42, Utc::now());
        assert_eq!(rec.scope_key, "alice/f/2024-01-02");
        assert_eq!(rec.identity.as_str(), "alice");
        assert_eq!(rec.row_count, 42);
        assert!(!rec.id.is_empty());
    }

    #[test]
    fn metric_contribution() {
        let rec = UsageRecord::new(&scope(), "req-1", 42, Utc::now());
        assert_eq!(UsageMetric::RowCount.contribution(&rec), 42);
        assert_eq!(UsageMetric::Requests.contribution(&rec), 1);
    }

    #[test]
    fn metric_as_str() {
        assert_eq!(UsageMetric::RowCount.as_str(), "row_count");
        assert_eq!(UsageMetric::Requests.to_string(), "requests");
    }
}
