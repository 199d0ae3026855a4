use anyhow::{bail, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    QueryBuilder, Sqlite, SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::meta::{self, SCHEMA_VERSION_KEY};
use super::migrations::{self, MigrationReport};
use super::seed::{self, SeedOutcome};
use super::types::{is_cantopen_message, is_lock_message, ContentPatch, DatabaseError, StoreOptions};

// ============================================================================
// Database
// ============================================================================

/// Pooled handle to the content database.
///
/// Opening runs the full bootstrap: schema migrations, then seeding. Cloning
/// shares the same pool.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database with default options and bootstrap it
    ///
    /// # Errors
    ///
    /// See [`Database::open_with`].
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        Self::open_with(path, &StoreOptions::default()).await
    }

    /// Open (creating if needed) the database at `path` and bootstrap it.
    ///
    /// `":memory:"` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::CannotOpen` if the file cannot be opened or
    /// created, `DatabaseError::InstanceLocked` if it is locked,
    /// `DatabaseError::Migration` if a required migration fails and
    /// `DatabaseError::Other` for other engine errors. Optional migrations and
    /// seeding only log on failure.
    pub async fn open_with(path: &str, options: &StoreOptions) -> Result<Self, DatabaseError> {
        // Pre-create the file owner-only so it never exists with umask permissions
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::OpenOptionsExt;
            let db_path = std::path::Path::new(path);
            if !db_path.exists() && db_path.parent().is_some_and(|p| p.exists()) {
                // If creation fails, SQLite reports the error at connect_with.
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok();
            }
        }

        // The path is handed over as a filename, never parsed as a URL
        let base = if path == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(DatabaseError::from_sqlx)?
        } else {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        };
        let connect_options = base
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(options.busy_timeout)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                if is_cantopen_message(&e.to_string()) {
                    DatabaseError::CannotOpen {
                        path: path.to_string(),
                        source: e,
                    }
                } else {
                    DatabaseError::from_sqlx(e)
                }
            })?;

        let db = Self { pool };
        let report = db.migrate().await?;
        if let Some(version) = report.failed {
            tracing::warn!(
                version,
                schema_version = report.to_version,
                "Schema is behind, continuing with partial migration"
            );
        }

        match seed::apply(&db.pool, options.seed_policy).await {
            Ok(SeedOutcome::Seeded { articles, quizzes }) => {
                tracing::debug!(articles, quizzes, "Seed data written");
            }
            Ok(SeedOutcome::Skipped) => {}
            Err(e) => tracing::warn!(error = %e, "Seeding failed, continuing without defaults"),
        }

        tracing::info!(
            path = %path,
            schema_version = report.to_version,
            "Content database ready"
        );
        Ok(db)
    }

    /// Run any pending schema migrations. Already-applied ones are skipped.
    ///
    /// # Errors
    ///
    /// Fatal migration failures map onto `DatabaseError`.
    pub async fn migrate(&self) -> Result<MigrationReport, DatabaseError> {
        migrations::run(&self.pool).await.map_err(|e| {
            // Migration errors can also be lock-related
            if is_lock_message(&format!("{e:#}")) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(format!("{e:#}"))
            }
        })
    }

    /// Schema version recorded in `store_meta`
    pub async fn schema_version(&self) -> Result<u32> {
        meta::get_version(&self.pool, SCHEMA_VERSION_KEY).await
    }

    /// Column names of `table` in declaration order (empty if it does not exist)
    pub async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        migrations::table_columns(&mut conn, table).await
    }

    /// Close every pooled connection. Pending operations finish first.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================================================================
    // Shared Row Operations
    // ========================================================================

    /// Apply `patch` to the row `id` of `table`, returning rows affected.
    pub(crate) async fn update_row(
        &self,
        table: &str,
        id: &str,
        patch: &ContentPatch,
    ) -> Result<u64> {
        if patch.kind().table() != table {
            bail!("patch for {} applied to {}", patch.kind(), table);
        }
        if patch.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!("UPDATE {table} SET "));
        let mut assignments = builder.separated(", ");
        for (column, value) in patch.fields() {
            // Column names come from ContentKind::columns(), never from input
            assignments.push(format!("{column} = "));
            assignments.push_bind_unseparated(value.to_string());
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id.to_string());

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Delete the row `id` of `table`, returning rows affected.
    pub(crate) async fn delete_row(&self, table: &str, id: &str) -> Result<u64> {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
