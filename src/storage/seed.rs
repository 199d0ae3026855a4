//! Default learning content written on first use.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

use super::meta::{self, SEED_VERSION_KEY};

/// Bump when the seed set below changes so existing stores pick it up.
pub const SEED_VERSION: u32 = 1;

/// Row count at or below which the `threshold` policy re-seeds.
pub const SEED_THRESHOLD: i64 = 2;

/// (id, title, content, category, level)
const SEED_ARTICLES: &[(&str, &str, &str, &str, &str)] = &[
    (
        "seed-article-1",
        "Why Sorting Waste Matters",
        "Mixed waste cannot be recycled efficiently. Separating organics, recyclables and residual waste at the source keeps recyclable material clean and cuts the volume sent to landfill.",
        "General",
        "Beginner",
    ),
    (
        "seed-article-2",
        "Composting at Home",
        "Food scraps and garden trimmings make up a large share of household waste. A simple compost bin that balances greens (nitrogen) and browns (carbon) turns them into soil conditioner within a few months.",
        "Organic",
        "Beginner",
    ),
    (
        "seed-article-3",
        "Handling Electronic Waste",
        "Batteries, phones and small appliances contain heavy metals and valuable materials. Take them to designated e-waste collection points instead of the household bin.",
        "Hazardous",
        "Intermediate",
    ),
];

/// (id, title, question, answer)
const SEED_QUIZZES: &[(&str, &str, &str, &str)] = &[
    (
        "seed-quiz-1",
        "Recycling Basics",
        "Should greasy pizza boxes go in the paper recycling?",
        "No. Grease contaminates paper fibres; put soiled parts in organics or residual waste.",
    ),
    (
        "seed-quiz-2",
        "Composting",
        "Name one 'brown' material for a compost bin.",
        "Dry leaves, cardboard or straw.",
    ),
    (
        "seed-quiz-3",
        "Hazardous Waste",
        "Where should used batteries be disposed of?",
        "At a battery or e-waste collection point, never in the household bin.",
    ),
];

/// When bootstrap writes the default content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedPolicy {
    /// Seed once, recorded by a `seed_version` marker in `store_meta`
    #[default]
    Marker,
    /// Seed whenever `articles` holds [`SEED_THRESHOLD`] rows or fewer
    Threshold,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded { articles: usize, quizzes: usize },
    Skipped,
}

/// Write the seed set if `policy` calls for it.
///
/// Rows are upserted by id, so seeding twice never duplicates anything.
pub(crate) async fn apply(pool: &SqlitePool, policy: SeedPolicy) -> Result<SeedOutcome> {
    let due = match policy {
        SeedPolicy::Never => false,
        SeedPolicy::Marker => meta::get_version(pool, SEED_VERSION_KEY).await? < SEED_VERSION,
        SeedPolicy::Threshold => {
            let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
                .fetch_one(pool)
                .await?;
            count.0 <= SEED_THRESHOLD
        }
    };

    if !due {
        tracing::debug!(?policy, "Seed data not due");
        return Ok(SeedOutcome::Skipped);
    }

    let mut tx = pool.begin().await?;
    upsert_seed_rows(&mut *tx).await?;
    meta::set(&mut *tx, SEED_VERSION_KEY, &SEED_VERSION.to_string()).await?;
    tx.commit().await?;

    tracing::info!(
        ?policy,
        articles = SEED_ARTICLES.len(),
        quizzes = SEED_QUIZZES.len(),
        "Seeded default content"
    );
    Ok(SeedOutcome::Seeded {
        articles: SEED_ARTICLES.len(),
        quizzes: SEED_QUIZZES.len(),
    })
}

async fn upsert_seed_rows(conn: &mut SqliteConnection) -> Result<()> {
    for &(id, title, content, category, level) in SEED_ARTICLES {
        sqlx::query(
            r#"
            INSERT INTO articles (id, title, content, category, level)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                category = excluded.category,
                level = excluded.level
        "#,
        )
        .bind(id)
        .bind(title)
        .bind(content)
        .bind(category)
        .bind(level)
        .execute(&mut *conn)
        .await?;
    }

    for &(id, title, question, answer) in SEED_QUIZZES {
        sqlx::query(
            r#"
            INSERT INTO quizzes (id, title, question, answer)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                question = excluded.question,
                answer = excluded.answer
        "#,
        )
        .bind(id)
        .bind(title)
        .bind(question)
        .bind(answer)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Ids of every seeded article
pub fn seed_article_ids() -> impl Iterator<Item = &'static str> {
    SEED_ARTICLES.iter().map(|row| row.0)
}

/// Ids of every seeded quiz
pub fn seed_quiz_ids() -> impl Iterator<Item = &'static str> {
    SEED_QUIZZES.iter().map(|row| row.0)
}
