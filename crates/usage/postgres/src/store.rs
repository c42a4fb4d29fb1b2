use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use rowgate_core::{ScopeKey, UsageMetric, UsageRecord};
use rowgate_usage::error::UsageError;
use rowgate_usage::store::{Admission, UsageStore};

use crate::config::PostgresUsageConfig;
use crate::migrations;

/// Build `PgConnectOptions` from a [`PostgresUsageConfig`], applying SSL
/// settings when configured.
pub(crate) fn build_connect_options(
    config: &PostgresUsageConfig,
) -> Result<sqlx::postgres::PgConnectOptions, UsageError> {
    let mut options: sqlx::postgres::PgConnectOptions = config
        .url
        .parse()
        .map_err(|e: sqlx::Error| UsageError::Connection(e.to_string()))?;

    if let Some(ref mode) = config.ssl_mode {
        let ssl_mode = match mode.as_str() {
            "disable" => sqlx::postgres::PgSslMode::Disable,
            "prefer" => sqlx::postgres::PgSslMode::Prefer,
            "require" => sqlx::postgres::PgSslMode::Require,
            "verify-ca" => sqlx::postgres::PgSslMode::VerifyCa,
            "verify-full" => sqlx::postgres::PgSslMode::VerifyFull,
            other => {
                return Err(UsageError::Connection(format!("unknown ssl_mode: {other}")));
            }
        };
        options = options.ssl_mode(ssl_mode);
    }

    if let Some(ref path) = config.ssl_root_cert {
        options = options.ssl_root_cert(path);
    }

    Ok(options)
}

/// PostgreSQL-backed implementation of [`UsageStore`].
///
/// Each record is one row; aggregates are `SUM`/`COUNT` over the rows of a
/// scope key. Plain `INSERT`s never conflict, so concurrent appends from
/// several gateway replicas are all retained. `append_within` runs its sum
/// and insert in one transaction holding a transaction-scoped advisory lock
/// on the scope key, which serializes limit checks across replicas.
pub struct PostgresUsageStore {
    pool: PgPool,
    table: String,
}

impl PostgresUsageStore {
    /// Create a new store, connecting to `PostgreSQL` and running migrations.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::Connection`] if pool creation fails, or
    /// [`UsageError::Backend`] if migrations fail.
    pub async fn new(config: &PostgresUsageConfig) -> Result<Self, UsageError> {
        let connect_options = build_connect_options(config)?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect_with(connect_options)
            .await
            .map_err(|e| UsageError::Connection(e.to_string()))?;

        Self::from_pool(pool, config).await
    }

    /// Create from an existing pool. Runs migrations on creation.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::Backend`] if migrations fail.
    pub async fn from_pool(pool: PgPool, config: &PostgresUsageConfig) -> Result<Self, UsageError> {
        migrations::run_migrations(&pool, config)
            .await
            .map_err(|e| UsageError::Backend(e.to_string()))?;

        Ok(Self {
            pool,
            table: config.usage_table(),
        })
    }

    fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (id, request_id, identity, scope_key, row_count, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            self.table
        )
    }

    async fn insert<'e, E>(&self, executor: E, record: &UsageRecord) -> Result<(), UsageError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row_count = i64::try_from(record.row_count).map_err(|_| {
            UsageError::Serialization(format!("row count out of range: {}", record.row_count))
        })?;

        sqlx::query(&self.insert_sql())
            .bind(&record.id)
            .bind(record.request_id.as_str())
            .bind(record.identity.as_str())
            .bind(&record.scope_key)
            .bind(row_count)
            .bind(record.timestamp)
            .execute(executor)
            .await
            .map_err(|e| UsageError::Backend(e.to_string()))?;
        Ok(())
    }
}

fn backend_error(e: sqlx::Error) -> UsageError {
    UsageError::Backend(e.to_string())
}

#[async_trait]
impl UsageStore for PostgresUsageStore {
    #[instrument(name = "usage.postgres.aggregate", skip(self), fields(scope = %scope))]
    async fn aggregate(&self, scope: &ScopeKey, metric: UsageMetric) -> Result<u64, UsageError> {
        let expr = match metric {
            UsageMetric::RowCount => "COALESCE(SUM(row_count), 0)::BIGINT",
            UsageMetric::Requests => "COUNT(*)",
        };
        let sql = format!("SELECT {expr} FROM {} WHERE scope_key = $1", self.table);

        let total = sqlx::query_scalar::<_, i64>(&sql)
            .bind(scope.canonical())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| UsageError::Backend(e.to_string()))?;

        u64::try_from(total)
            .map_err(|_| UsageError::Serialization(format!("negative aggregate: {total}")))
    }

    #[instrument(name = "usage.postgres.append", skip_all, fields(scope = %record.scope_key))]
    async fn append(&self, record: UsageRecord) -> Result<(), UsageError> {
        self.insert(&self.pool, &record).await
    }

    #[instrument(
        name = "usage.postgres.append_within",
        skip_all,
        fields(scope = %record.scope_key, limit = limit)
    )]
    async fn append_within(
        &self,
        record: UsageRecord,
        limit: u64,
    ) -> Result<Admission, UsageError> {
        let mut tx = self.pool.begin().await.map_err(backend_error)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&record.scope_key)
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;

        let sql = format!(
            "SELECT COALESCE(SUM(row_count), 0)::BIGINT FROM {} WHERE scope_key = $1",
            self.table
        );
        let used = sqlx::query_scalar::<_, i64>(&sql)
            .bind(&record.scope_key)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend_error)?;
        let used = u64::try_from(used)
            .map_err(|_| UsageError::Serialization(format!("negative aggregate: {used}")))?;

        let total = used.saturating_add(record.row_count);
        if total > limit {
            tx.rollback().await.map_err(backend_error)?;
            return Ok(Admission::Rejected { total });
        }

        self.insert(&mut *tx, &record).await?;
        tx.commit().await.map_err(backend_error)?;
        Ok(Admission::Appended { total })
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_ssl_mode() {
        let config = PostgresUsageConfig {
            ssl_mode: Some("sometimes".into()),
            ..PostgresUsageConfig::default()
        };
        let err = build_connect_options(&config).unwrap_err();
        assert!(err.to_string().contains("unknown ssl_mode"));
    }

    #[test]
    fn rejects_malformed_url() {
        let config = PostgresUsageConfig::new("not a url");
        assert!(matches!(
            build_connect_options(&config),
            Err(UsageError::Connection(_))
        ));
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;

    fn test_config() -> PostgresUsageConfig {
        PostgresUsageConfig {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/rowgate_test".to_string()),
            table_prefix: format!("test_{}_", uuid::Uuid::new_v4().simple()),
            ..PostgresUsageConfig::default()
        }
    }

    #[tokio::test]
    async fn store_conformance() {
        let store = PostgresUsageStore::new(&test_config())
            .await
            .expect("pool creation should succeed");
        rowgate_usage::testing::run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }
}
