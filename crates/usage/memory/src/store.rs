use async_trait::async_trait;
use dashmap::DashMap;

use rowgate_core::{ScopeKey, UsageMetric, UsageRecord};
use rowgate_usage::error::UsageError;
use rowgate_usage::store::{Admission, UsageStore};

/// In-memory usage store using `DashMap`. Suitable for development and testing.
///
/// Records are grouped per canonical scope key. Appends take the shard's
/// write lock, so concurrent appends to one scope are serialized and none
/// is lost. `append_within` sums and pushes under that same lock.
#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    records: DashMap<String, Vec<UsageRecord>>,
}

impl MemoryUsageStore {
    /// Create a new empty in-memory usage store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of every record stored for `scope`, in append order.
    pub fn records(&self, scope: &ScopeKey) -> Vec<UsageRecord> {
        self.records
            .get(&scope.canonical())
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Total number of records across all scopes.
    pub fn len(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    /// Whether no record has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn aggregate(&self, scope: &ScopeKey, metric: UsageMetric) -> Result<u64, UsageError> {
        let total = self
            .records
            .get(&scope.canonical())
            .map_or(0, |records| {
                records.iter().map(|r| metric.contribution(r)).sum()
            });
        Ok(total)
    }

    async fn append(&self, record: UsageRecord) -> Result<(), UsageError> {
        self.records
            .entry(record.scope_key.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn append_within(
        &self,
        record: UsageRecord,
        limit: u64,
    ) -> Result<Admission, UsageError> {
        let mut records = self.records.entry(record.scope_key.clone()).or_default();
        let used: u64 = records
            .iter()
            .map(|r| UsageMetric::RowCount.contribution(r))
            .sum();
        let total = used.saturating_add(record.row_count);
        if total > limit {
            return Ok(Admission::Rejected { total });
        }
        records.push(record);
        Ok(Admission::Appended { total })
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
