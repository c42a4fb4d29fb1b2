use std::sync::Arc;

use rowgate_core::{QuotaConfig, UsageBackendKind};
use rowgate_usage::UsageStore;
use rowgate_usage_memory::MemoryUsageStore;
#[cfg(feature = "postgres")]
use rowgate_usage_postgres::{PostgresUsageConfig, PostgresUsageStore};
#[cfg(feature = "redis")]
use rowgate_usage_redis::{RedisUsageConfig, RedisUsageStore};

use crate::config::UsageConfig;
use crate::error::ServerError;

/// Create the usage store selected by `quotas.backend`.
///
/// Returns `None` for the `none` backend. Persistent backends that need a
/// connection are initialized eagerly; for postgres this runs migrations.
#[allow(clippy::unused_async)]
pub async fn create_usage_store(
    quotas: &QuotaConfig,
    usage: &UsageConfig,
) -> Result<Option<Arc<dyn UsageStore>>, ServerError> {
    let store: Arc<dyn UsageStore> = match quotas.backend {
        UsageBackendKind::None => return Ok(None),
        UsageBackendKind::Memory => Arc::new(MemoryUsageStore::new()),
        #[cfg(feature = "postgres")]
        UsageBackendKind::Postgres => {
            let url = usage.url.as_deref().ok_or_else(|| {
                ServerError::Config("postgres usage backend requires [usage] url".into())
            })?;

            let mut pg_config = PostgresUsageConfig::new(url);
            if let Some(ref prefix) = usage.prefix {
                pg_config = pg_config.with_prefix(prefix);
            }
            if let Some(size) = usage.pool_size {
                pg_config = pg_config.with_pool_size(size);
            }
            if let Some(ref schema) = usage.schema {
                pg_config.schema.clone_from(schema);
            }
            pg_config.ssl_mode.clone_from(&usage.ssl_mode);
            pg_config.ssl_root_cert.clone_from(&usage.ssl_root_cert);

            Arc::new(PostgresUsageStore::new(&pg_config).await?)
        }
        #[cfg(feature = "redis")]
        UsageBackendKind::Redis => {
            let url = usage.url.as_deref().ok_or_else(|| {
                ServerError::Config("redis usage backend requires [usage] url".into())
            })?;

            let mut redis_config = RedisUsageConfig::new(url);
            if let Some(ref prefix) = usage.prefix {
                redis_config.prefix.clone_from(prefix);
            }
            if let Some(size) = usage.pool_size {
                redis_config.pool_size = size as usize;
            }
            if let Some(secs) = usage.connection_timeout_seconds {
                redis_config.connection_timeout = std::time::Duration::from_secs(secs);
            }

            Arc::new(RedisUsageStore::new(&redis_config)?)
        }
        #[allow(unreachable_patterns)]
        other => {
            return Err(ServerError::Config(format!(
                "usage backend {other} is not compiled in; enable the `{other}` feature"
            )));
        }
    };

    Ok(Some(store))
}
