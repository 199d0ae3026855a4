//! Numbered schema migrations.
//!
//! Each migration runs in its own transaction and bumps `schema_version` in
//! `store_meta` when it commits. Migrations check the schema before changing
//! it, so they are no-ops against a database that already has their effect
//! (including databases created before versioning existed).
//!
//! Only [`Migration::fatal`] steps abort bootstrap. A failing optional step is
//! logged and leaves the version where it was, so the next start retries it.

use anyhow::{bail, Result};
use sqlx::{SqliteConnection, SqlitePool};

use super::meta::{self, SCHEMA_VERSION_KEY};
use super::types::{DEFAULT_CATEGORY, DEFAULT_LEVEL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    CreateBaseTables,
    AddArticleTaxonomy,
    BackfillArticleTaxonomy,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    /// Whether a failure aborts bootstrap
    pub fatal: bool,
    step: Step,
}

/// All migrations in application order
pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create articles and quizzes tables",
        fatal: true,
        step: Step::CreateBaseTables,
    },
    Migration {
        version: 2,
        description: "add category and level columns to articles",
        fatal: false,
        step: Step::AddArticleTaxonomy,
    },
    Migration {
        version: 3,
        description: "backfill null article category and level",
        fatal: false,
        step: Step::BackfillArticleTaxonomy,
    },
];

/// Schema version of a fully migrated database
pub const LATEST_VERSION: u32 = 3;

/// What a migration run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub applied: Vec<u32>,
    /// Optional migration that failed and stopped the run
    pub failed: Option<u32>,
}

impl MigrationReport {
    pub fn is_current(&self) -> bool {
        self.to_version >= LATEST_VERSION
    }
}

/// Bring the schema up to [`LATEST_VERSION`].
///
/// # Errors
///
/// Fails if `store_meta` cannot be created or read, or if a fatal
/// migration fails. Optional migration failures are reported in
/// [`MigrationReport::failed`] instead.
pub(crate) async fn run(pool: &SqlitePool) -> Result<MigrationReport> {
    meta::ensure_table(pool).await?;
    let from_version = meta::get_version(pool, SCHEMA_VERSION_KEY).await?;

    let mut report = MigrationReport {
        from_version,
        to_version: from_version,
        ..Default::default()
    };

    for migration in MIGRATIONS.iter().filter(|m| m.version > from_version) {
        match apply(pool, migration).await {
            Ok(()) => {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "Applied migration"
                );
                report.applied.push(migration.version);
                report.to_version = migration.version;
            }
            Err(e) if migration.fatal => {
                return Err(e.context(format!(
                    "migration {} ({}) failed",
                    migration.version, migration.description
                )));
            }
            Err(e) => {
                tracing::warn!(
                    version = migration.version,
                    description = migration.description,
                    error = %e,
                    "Optional migration failed, will retry on next start"
                );
                report.failed = Some(migration.version);
                break;
            }
        }
    }

    Ok(report)
}

async fn apply(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;
    match migration.step {
        Step::CreateBaseTables => create_base_tables(&mut *tx).await?,
        Step::AddArticleTaxonomy => add_article_taxonomy(&mut *tx).await?,
        Step::BackfillArticleTaxonomy => backfill_article_taxonomy(&mut *tx).await?,
    }
    meta::set(&mut *tx, SCHEMA_VERSION_KEY, &migration.version.to_string()).await?;
    tx.commit().await?;
    Ok(())
}

async fn create_base_tables(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL
        )
    "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quizzes (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            question TEXT NOT NULL,
            answer TEXT NOT NULL
        )
    "#,
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn add_article_taxonomy(conn: &mut SqliteConnection) -> Result<()> {
    let existing = table_columns(&mut *conn, "articles").await?;
    if existing.is_empty() {
        bail!("articles table is missing");
    }

    for column in ["category", "level"] {
        if existing.iter().any(|c| c == column) {
            tracing::debug!(column, "Column already present, skipping");
            continue;
        }
        sqlx::query(&format!("ALTER TABLE articles ADD COLUMN {column} TEXT"))
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

async fn backfill_article_taxonomy(conn: &mut SqliteConnection) -> Result<()> {
    let category = sqlx::query("UPDATE articles SET category = ? WHERE category IS NULL")
        .bind(DEFAULT_CATEGORY)
        .execute(&mut *conn)
        .await?;
    let level = sqlx::query("UPDATE articles SET level = ? WHERE level IS NULL")
        .bind(DEFAULT_LEVEL)
        .execute(&mut *conn)
        .await?;

    let filled = category.rows_affected() + level.rows_affected();
    if filled > 0 {
        tracing::info!(filled, "Backfilled article category/level defaults");
    }
    Ok(())
}

/// Column names of `table`, in declaration order. Empty if the table is absent.
pub(crate) async fn table_columns(conn: &mut SqliteConnection, table: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?) ORDER BY cid")
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}
