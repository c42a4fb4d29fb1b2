use async_trait::async_trait;

use rowgate_core::{ScopeKey, UsageMetric, UsageRecord};

use crate::error::UsageError;

/// Outcome of [`UsageStore::append_within`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The record was stored. `total` is the scope's row count including it.
    Appended { total: u64 },
    /// Nothing was stored. `total` is the row count the record would have
    /// brought the scope to.
    Rejected { total: u64 },
}

impl Admission {
    #[must_use]
    pub fn total(self) -> u64 {
        match self {
            Self::Appended { total } | Self::Rejected { total } => total,
        }
    }
}

/// Trait for persisting usage records and aggregating them per scope.
///
/// Aggregation is a sum over an append-only record set. Concurrent appends
/// for the same scope must all be retained, and `aggregate` must reflect
/// every completed append. Limit enforcement goes through
/// [`append_within`](UsageStore::append_within), which must read and write
/// the scope as one step so two callers can never both fit under a limit
/// that only one of them fits under.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Aggregate `metric` over every record stored for `scope`.
    /// Returns 0 when the scope has no records.
    async fn aggregate(&self, scope: &ScopeKey, metric: UsageMetric) -> Result<u64, UsageError>;

    /// Durably persist one usage record.
    async fn append(&self, record: UsageRecord) -> Result<(), UsageError>;

    /// Persist `record` only if the row count of its scope, including the
    /// record, stays at or below `limit`. Atomic with respect to every other
    /// `append_within` on the same scope.
    async fn append_within(
        &self,
        record: UsageRecord,
        limit: u64,
    ) -> Result<Admission, UsageError>;

    /// Short backend label for logs.
    fn backend(&self) -> &'static str;
}

/// Store that records nothing. `aggregate` always returns 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageStore;

#[async_trait]
impl UsageStore for NoopUsageStore {
    async fn aggregate(&self, _scope: &ScopeKey, _metric: UsageMetric) -> Result<u64, UsageError> {
        Ok(0)
    }

    async fn append(&self, _record: UsageRecord) -> Result<(), UsageError> {
        Ok(())
    }

    async fn append_within(
        &self,
        record: UsageRecord,
        limit: u64,
    ) -> Result<Admission, UsageError> {
        let total = record.row_count;
        if total > limit {
            return Ok(Admission::Rejected { total });
        }
        Ok(Admission::Appended { total })
    }

    fn backend(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;

    #[tokio::test]
    async fn noop_aggregate_ignores_appends() {
        let store = NoopUsageStore;
        let scope = ScopeKey::new("alice", "f", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        assert_eq!(store.aggregate(&scope, UsageMetric::RowCount).await.unwrap(), 0);
        for _ in 0..3 {
            store
                .append(UsageRecord::new(&scope, "req", 500, Utc::now()))
                .await
                .unwrap();
            assert_eq!(store.aggregate(&scope, UsageMetric::RowCount).await.unwrap(), 0);
            assert_eq!(store.aggregate(&scope, UsageMetric::Requests).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn noop_append_within_only_sees_the_record() {
        let store = NoopUsageStore;
        let scope = ScopeKey::new("alice", "f", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        let admitted = store
            .append_within(UsageRecord::new(&scope, "a", 40, Utc::now()), 50)
            .await
            .unwrap();
        assert_eq!(admitted, Admission::Appended { total: 40 });

        let rejected = store
            .append_within(UsageRecord::new(&scope, "b", 60, Utc::now()), 50)
            .await
            .unwrap();
        assert_eq!(rejected, Admission::Rejected { total: 60 });
        assert_eq!(rejected.total(), 60);
    }

    #[test]
    fn noop_backend_label() {
        assert_eq!(NoopUsageStore.backend(), "none");
    }
}
