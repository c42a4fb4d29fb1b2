use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, Script};
use tracing::instrument;

use rowgate_core::{ScopeKey, UsageMetric, UsageRecord};
use rowgate_usage::error::UsageError;
use rowgate_usage::store::{Admission, UsageStore};

use crate::config::RedisUsageConfig;
use crate::scripts;

/// Redis-backed implementation of [`UsageStore`].
///
/// Every scope owns two keys: a list holding the JSON-encoded records and a
/// hash of running totals (`row_count`, `requests`). Both are written by one
/// Lua script so the totals never drift from the list.
pub struct RedisUsageStore {
    pool: Pool,
    prefix: String,
}

impl RedisUsageStore {
    /// Create a new `RedisUsageStore` from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisUsageConfig) -> Result<Self, UsageError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| UsageError::Connection(e.to_string()))?
            .map_err(|e| UsageError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
        })
    }

    fn records_key(&self, scope_key: &str) -> String {
        format!("{}:usage:{scope_key}:records", self.prefix)
    }

    fn totals_key(&self, scope_key: &str) -> String {
        format!("{}:usage:{scope_key}:totals", self.prefix)
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, UsageError> {
        self.pool
            .get()
            .await
            .map_err(|e| UsageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl UsageStore for RedisUsageStore {
    #[instrument(name = "usage.redis.aggregate", skip(self), fields(scope = %scope))]
    async fn aggregate(&self, scope: &ScopeKey, metric: UsageMetric) -> Result<u64, UsageError> {
        let key = self.totals_key(&scope.canonical());
        let mut conn = self.conn().await?;
        let total: Option<u64> = conn
            .hget(&key, metric.as_str())
            .await
            .map_err(|e| UsageError::Backend(e.to_string()))?;
        Ok(total.unwrap_or(0))
    }

    #[instrument(name = "usage.redis.append", skip_all, fields(scope = %record.scope_key))]
    async fn append(&self, record: UsageRecord) -> Result<(), UsageError> {
        let encoded =
            serde_json::to_string(&record).map_err(|e| UsageError::Serialization(e.to_string()))?;

        let mut conn = self.conn().await?;
        let script = Script::new(scripts::APPEND_RECORD);
        let _: i64 = script
            .key(self.records_key(&record.scope_key))
            .key(self.totals_key(&record.scope_key))
            .arg(encoded)
            .arg(record.row_count)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| UsageError::Backend(e.to_string()))?;

        Ok(())
    }

    #[instrument(name = "usage.redis.append_within", skip_all, fields(scope = %record.scope_key, limit = limit))]
    async fn append_within(
        &self,
        record: UsageRecord,
        limit: u64,
    ) -> Result<Admission, UsageError> {
        let encoded =
            serde_json::to_string(&record).map_err(|e| UsageError::Serialization(e.to_string()))?;

        let mut conn = self.conn().await?;
        let script = Script::new(scripts::APPEND_WITHIN_LIMIT);
        let (appended, total): (i64, i64) = script
            .key(self.records_key(&record.scope_key))
            .key(self.totals_key(&record.scope_key))
            .arg(encoded)
            .arg(record.row_count)
            .arg(limit)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| UsageError::Backend(e.to_string()))?;

        let total = u64::try_from(total)
            .map_err(|_| UsageError::Serialization(format!("negative total: {total}")))?;
        Ok(if appended == 1 {
            Admission::Appended { total }
        } else {
            Admission::Rejected { total }
        })
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_share_scope_and_prefix() {
        let store = RedisUsageStore::new(&RedisUsageConfig::default()).unwrap();
        assert_eq!(
            store.records_key("alice/f/2024-01-02"),
            "rowgate:usage:alice/f/2024-01-02:records"
        );
        assert_eq!(
            store.totals_key("alice/f/2024-01-02"),
            "rowgate:usage:alice/f/2024-01-02:totals"
        );
    }

    #[test]
    fn rejects_invalid_url() {
        let result = RedisUsageStore::new(&RedisUsageConfig::new("not-a-redis-url"));
        assert!(matches!(result, Err(UsageError::Connection(_))));
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;

    fn test_config() -> RedisUsageConfig {
        RedisUsageConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            prefix: format!("rowgate-test-{}", uuid::Uuid::new_v4()),
            ..RedisUsageConfig::default()
        }
    }

    #[tokio::test]
    async fn store_conformance() {
        let store = RedisUsageStore::new(&test_config()).expect("pool creation should succeed");
        rowgate_usage::testing::run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }
}
