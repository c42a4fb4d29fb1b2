use sqlx::PgPool;

use crate::config::PostgresUsageConfig;

/// Create the usage table and its scope index if they do not exist.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresUsageConfig) -> Result<(), sqlx::Error> {
    let table = config.usage_table();

    let create_table = format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id          TEXT PRIMARY KEY,
            request_id  TEXT NOT NULL,
            identity    TEXT NOT NULL,
            scope_key   TEXT NOT NULL,
            row_count   BIGINT NOT NULL,
            recorded_at TIMESTAMPTZ NOT NULL
        )"
    );

    let create_scope_idx = format!(
        "CREATE INDEX IF NOT EXISTS {}usage_scope_key_idx ON {table} (scope_key)",
        config.table_prefix
    );

    sqlx::query(&create_table).execute(pool).await?;
    sqlx::query(&create_scope_idx).execute(pool).await?;

    Ok(())
}
