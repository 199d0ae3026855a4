use anyhow::Result;

use super::schema::Database;
use super::types::{ContentPatch, Quiz};

impl Database {
    // ========================================================================
    // Quiz Operations
    // ========================================================================

    /// All quizzes in insertion order
    pub async fn list_quizzes(&self) -> Result<Vec<Quiz>> {
        let quizzes = sqlx::query_as::<_, Quiz>(
            "SELECT id, title, question, answer FROM quizzes ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        tracing::debug!(count = quizzes.len(), "list_quizzes");
        Ok(quizzes)
    }

    pub async fn get_quiz(&self, id: &str) -> Result<Option<Quiz>> {
        let quiz = sqlx::query_as::<_, Quiz>(
            "SELECT id, title, question, answer FROM quizzes WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(quiz)
    }

    pub async fn count_quizzes(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM quizzes")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn insert_quiz(&self, quiz: &Quiz) -> Result<()> {
        sqlx::query("INSERT INTO quizzes (id, title, question, answer) VALUES (?, ?, ?, ?)")
            .bind(&quiz.id)
            .bind(&quiz.title)
            .bind(&quiz.question)
            .bind(&quiz.answer)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_quiz(&self, id: &str, patch: &ContentPatch) -> Result<u64> {
        self.update_row("quizzes", id, patch).await
    }

    pub async fn delete_quiz(&self, id: &str) -> Result<u64> {
        self.delete_row("quizzes", id).await
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{ContentKind, ContentPatch, Database, Quiz};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn test_quiz(id: &str) -> Quiz {
        Quiz {
            id: id.to_string(),
            title: "Sorting".to_string(),
            question: "Where do glass jars go?".to_string(),
            answer: "Glass container".to_string(),
        }
    }

    #[tokio::test]
    async fn test_seeded_quizzes_listed() {
        let db = test_db().await;
        let quizzes = db.list_quizzes().await.unwrap();
        assert!(!quizzes.is_empty());
        assert!(quizzes.iter().all(|q| q.id.starts_with("seed-quiz-")));
    }

    #[tokio::test]
    async fn test_quiz_crud() {
        let db = test_db().await;
        let before = db.count_quizzes().await.unwrap();

        db.insert_quiz(&test_quiz("q1")).await.unwrap();
        assert_eq!(db.count_quizzes().await.unwrap(), before + 1);

        let patch = ContentPatch::new(ContentKind::Quizzes)
            .set("answer", "Glass bank")
            .unwrap();
        assert_eq!(db.update_quiz("q1", &patch).await.unwrap(), 1);
        let quiz = db.get_quiz("q1").await.unwrap().unwrap();
        assert_eq!(quiz.answer, "Glass bank");
        assert_eq!(quiz.question, "Where do glass jars go?");

        assert_eq!(db.delete_quiz("q1").await.unwrap(), 1);
        assert_eq!(db.get_quiz("q1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_missing_quiz_affects_nothing() {
        let db = test_db().await;
        assert_eq!(db.delete_quiz("ghost").await.unwrap(), 0);
    }
}
