//! Key/value bookkeeping for the store itself (schema version, seed marker).

use anyhow::Result;
use sqlx::SqliteExecutor;

/// Highest migration number applied to this database
pub(crate) const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Version of the seed set last written to this database
pub(crate) const SEED_VERSION_KEY: &str = "seed_version";

pub(crate) async fn ensure_table<'c, E>(executor: E) -> Result<()>
where
    E: SqliteExecutor<'c>,
{
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
    "#,
    )
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn get<'c, E>(executor: E, key: &str) -> Result<Option<String>>
where
    E: SqliteExecutor<'c>,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM store_meta WHERE key = ?")
        .bind(key)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|(value,)| value))
}

pub(crate) async fn set<'c, E>(executor: E, key: &str, value: &str) -> Result<()>
where
    E: SqliteExecutor<'c>,
{
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO store_meta (key, value, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
    "#,
    )
    .bind(key)
    .bind(value)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

/// Read a numeric marker. Missing or unparsable values read as 0.
pub(crate) async fn get_version<'c, E>(executor: E, key: &str) -> Result<u32>
where
    E: SqliteExecutor<'c>,
{
    let value = get(executor, key).await?;
    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
}
