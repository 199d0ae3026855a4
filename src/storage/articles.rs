use anyhow::Result;

use super::schema::Database;
use super::types::{Article, ContentPatch, DEFAULT_CATEGORY, DEFAULT_LEVEL};

/// Rows written before the taxonomy backfill ran may still hold NULLs.
/// The first two binds are always the default category and level.
const ARTICLE_SELECT: &str = r#"
    SELECT id, title, content,
           COALESCE(category, ?) AS category,
           COALESCE(level, ?) AS level
    FROM articles
"#;

impl Database {
    // ========================================================================
    // Article Queries
    // ========================================================================

    /// All articles in insertion order
    pub async fn list_articles(&self) -> Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(&format!("{ARTICLE_SELECT} ORDER BY rowid"))
            .bind(DEFAULT_CATEGORY)
            .bind(DEFAULT_LEVEL)
            .fetch_all(&self.pool)
            .await?;
        tracing::debug!(count = articles.len(), "list_articles");
        Ok(articles)
    }

    /// A single article by id, or `None` if no row matches
    pub async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>(&format!("{ARTICLE_SELECT} WHERE id = ?"))
            .bind(DEFAULT_CATEGORY)
            .bind(DEFAULT_LEVEL)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    pub async fn count_articles(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    // ========================================================================
    // Article Mutations
    // ========================================================================

    /// Insert a new article. Fails if the id is already taken.
    pub async fn insert_article(&self, article: &Article) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO articles (id, title, content, category, level)
            VALUES (?, ?, ?, ?, ?)
        "#,
        )
        .bind(&article.id)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.category)
        .bind(&article.level)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Apply a partial update, returning the number of rows changed (0 or 1)
    pub async fn update_article(&self, id: &str, patch: &ContentPatch) -> Result<u64> {
        self.update_row("articles", id, patch).await
    }

    /// Delete an article, returning the number of rows removed (0 or 1)
    pub async fn delete_article(&self, id: &str) -> Result<u64> {
        self.delete_row("articles", id).await
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{
        Article, ContentKind, ContentPatch, Database, SeedPolicy, StoreOptions, DEFAULT_CATEGORY,
        DEFAULT_LEVEL,
    };
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        let options = StoreOptions {
            seed_policy: SeedPolicy::Never,
            ..Default::default()
        };
        Database::open_with(":memory:", &options).await.unwrap()
    }

    fn test_article(id: &str, title: &str) -> Article {
        Article {
            id: id.to_string(),
            title: title.to_string(),
            content: format!("Body of {title}"),
            category: "Recycling".to_string(),
            level: "Beginner".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_article() {
        let db = test_db().await;
        let article = test_article("a1", "Plastics");
        db.insert_article(&article).await.unwrap();

        assert_eq!(db.get_article("a1").await.unwrap(), Some(article));
    }

    #[tokio::test]
    async fn test_get_missing_article_is_none() {
        let db = test_db().await;
        assert_eq!(db.get_article("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_articles_insertion_order() {
        let db = test_db().await;
        db.insert_article(&test_article("b", "Second")).await.unwrap();
        db.insert_article(&test_article("a", "First")).await.unwrap();

        let ids: Vec<_> = db
            .list_articles()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_list_empty_table() {
        let db = test_db().await;
        assert!(db.list_articles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_duplicate_id_fails() {
        let db = test_db().await;
        db.insert_article(&test_article("a1", "One")).await.unwrap();
        assert!(db.insert_article(&test_article("a1", "Two")).await.is_err());
    }

    #[tokio::test]
    async fn test_update_article_sets_only_patched_columns() {
        let db = test_db().await;
        db.insert_article(&test_article("a1", "Old")).await.unwrap();

        let patch = ContentPatch::new(ContentKind::Articles)
            .set("title", "New")
            .unwrap()
            .set("level", "Advanced")
            .unwrap();
        assert_eq!(db.update_article("a1", &patch).await.unwrap(), 1);

        let article = db.get_article("a1").await.unwrap().unwrap();
        assert_eq!(article.title, "New");
        assert_eq!(article.level, "Advanced");
        assert_eq!(article.content, "Body of Old");
        assert_eq!(article.category, "Recycling");
    }

    #[tokio::test]
    async fn test_update_missing_article_affects_nothing() {
        let db = test_db().await;
        let patch = ContentPatch::new(ContentKind::Articles)
            .set("title", "New")
            .unwrap();
        assert_eq!(db.update_article("ghost", &patch).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_article() {
        let db = test_db().await;
        db.insert_article(&test_article("a1", "One")).await.unwrap();

        assert_eq!(db.delete_article("a1").await.unwrap(), 1);
        assert_eq!(db.delete_article("a1").await.unwrap(), 0);
        assert_eq!(db.count_articles().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_null_taxonomy_reads_as_defaults() {
        let db = test_db().await;
        sqlx::query("INSERT INTO articles (id, title, content) VALUES ('raw', 'Raw', 'Body')")
            .execute(&db.pool)
            .await
            .unwrap();

        let article = db.get_article("raw").await.unwrap().unwrap();
        assert_eq!(article.category, DEFAULT_CATEGORY);
        assert_eq!(article.level, DEFAULT_LEVEL);

        let listed = db.list_articles().await.unwrap();
        assert_eq!(listed, vec![article]);
    }
}
