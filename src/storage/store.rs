//! The public content store API.
//!
//! A [`ContentStore`] is built once at startup and cloned into whatever needs
//! it. Nothing touches the disk until the first operation (or an explicit
//! [`ContentStore::initialize`]); concurrent first callers share a single
//! in-flight bootstrap.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::schema::Database;
use super::types::{
    Article, Content, ContentKind, ContentPatch, DatabaseError, NewContent, Quiz, StoreError,
    StoreOptions,
};

/// Name of the database file inside the data directory. Not configurable.
pub const DATABASE_FILE_NAME: &str = "wastewise.db";

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

struct Inner {
    location: Location,
    options: StoreOptions,
    db: OnceCell<Database>,
}

/// Lazily bootstrapped store for articles and quizzes
#[derive(Clone)]
pub struct ContentStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore")
            .field("location", &self.inner.location)
            .field("options", &self.inner.options)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl ContentStore {
    /// Store backed by `data_dir/wastewise.db`. Does not open anything yet.
    pub fn open(data_dir: impl AsRef<Path>, options: StoreOptions) -> Self {
        let path = data_dir.as_ref().join(DATABASE_FILE_NAME);
        Self::with_location(Location::File(path), options)
    }

    /// Store backed by a private in-memory database
    pub fn in_memory(options: StoreOptions) -> Self {
        Self::with_location(Location::Memory, options)
    }

    fn with_location(location: Location, options: StoreOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                location,
                options,
                db: OnceCell::new(),
            }),
        }
    }

    /// Path of the database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        match &self.inner.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.db.initialized()
    }

    /// Run bootstrap if it has not run yet. Idempotent.
    ///
    /// # Errors
    ///
    /// `StoreError::Initialization` if the database cannot be opened or its
    /// base tables cannot be created. A failed attempt is retried on the
    /// next call.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        self.database().await.map(|_| ())
    }

    /// The bootstrapped database handle, opening it on first use.
    pub async fn database(&self) -> Result<&Database, StoreError> {
        self.inner
            .db
            .get_or_try_init(|| self.bootstrap())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Content store initialization failed");
                StoreError::Initialization(e)
            })
    }

    async fn bootstrap(&self) -> Result<Database, DatabaseError> {
        let path = match &self.inner.location {
            Location::File(path) => path
                .to_str()
                .ok_or_else(|| DatabaseError::InvalidPath(path.clone()))?,
            Location::Memory => ":memory:",
        };
        tracing::debug!(path = %path, "Bootstrapping content store");
        Database::open_with(path, &self.inner.options).await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn articles(&self) -> Result<Vec<Article>, StoreError> {
        let db = self.database().await?;
        db.list_articles()
            .await
            .map_err(|e| query_failed(ContentKind::Articles, e))
    }

    pub async fn quizzes(&self) -> Result<Vec<Quiz>, StoreError> {
        let db = self.database().await?;
        db.list_quizzes()
            .await
            .map_err(|e| query_failed(ContentKind::Quizzes, e))
    }

    /// Every row of `kind`. An empty table yields an empty vector.
    pub async fn list(&self, kind: ContentKind) -> Result<Vec<Content>, StoreError> {
        Ok(match kind {
            ContentKind::Articles => self
                .articles()
                .await?
                .into_iter()
                .map(Content::Article)
                .collect(),
            ContentKind::Quizzes => self
                .quizzes()
                .await?
                .into_iter()
                .map(Content::Quiz)
                .collect(),
        })
    }

    /// The row `id` of `kind`, or `None` when it does not exist
    pub async fn get(&self, kind: ContentKind, id: &str) -> Result<Option<Content>, StoreError> {
        let db = self.database().await?;
        let found = match kind {
            ContentKind::Articles => db.get_article(id).await.map(|a| a.map(Content::Article)),
            ContentKind::Quizzes => db.get_quiz(id).await.map(|q| q.map(Content::Quiz)),
        };
        found.map_err(|e| query_failed(kind, e))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert a new row and return its generated id.
    ///
    /// Articles without a category or level get `"General"` / `"Beginner"`.
    pub async fn create(&self, content: impl Into<NewContent>) -> Result<String, StoreError> {
        let content = content.into();
        let kind = content.kind();
        let db = self.database().await?;
        let id = generate_id();

        let result = match content {
            NewContent::Article(new) => db.insert_article(&new.into_article(id.clone())).await,
            NewContent::Quiz(new) => db.insert_quiz(&new.into_quiz(id.clone())).await,
        };
        result.map_err(|e| {
            tracing::error!(%kind, error = %e, "Insert failed");
            StoreError::InsertFailed {
                kind,
                source: e.into(),
            }
        })?;

        tracing::debug!(%kind, id = %id, "Created content");
        Ok(id)
    }

    /// Apply `patch` to row `id`.
    ///
    /// An empty patch (including one that only named `id`) executes nothing.
    /// A missing row is not an error.
    pub async fn update(
        &self,
        kind: ContentKind,
        id: &str,
        patch: ContentPatch,
    ) -> Result<(), StoreError> {
        if patch.kind() != kind {
            return Err(StoreError::KindMismatch {
                expected: kind,
                actual: patch.kind(),
            });
        }
        let db = self.database().await?;
        if patch.is_empty() {
            tracing::debug!(%kind, id, "Empty patch, nothing to update");
            return Ok(());
        }

        let result = match kind {
            ContentKind::Articles => db.update_article(id, &patch).await,
            ContentKind::Quizzes => db.update_quiz(id, &patch).await,
        };
        let affected = result.map_err(|e| {
            tracing::error!(%kind, id, error = %e, "Update failed");
            StoreError::UpdateFailed {
                kind,
                source: e.into(),
            }
        })?;

        if affected == 0 {
            tracing::debug!(%kind, id, "Update matched no rows");
        }
        Ok(())
    }

    /// Delete row `id`. A missing row is not an error.
    pub async fn delete(&self, kind: ContentKind, id: &str) -> Result<(), StoreError> {
        let db = self.database().await?;
        let result = match kind {
            ContentKind::Articles => db.delete_article(id).await,
            ContentKind::Quizzes => db.delete_quiz(id).await,
        };
        let affected = result.map_err(|e| {
            tracing::error!(%kind, id, error = %e, "Delete failed");
            StoreError::DeleteFailed {
                kind,
                source: e.into(),
            }
        })?;

        if affected == 0 {
            tracing::debug!(%kind, id, "Delete matched no rows");
        }
        Ok(())
    }
}

fn query_failed(kind: ContentKind, e: anyhow::Error) -> StoreError {
    tracing::error!(%kind, error = %e, "Query failed");
    StoreError::QueryFailed {
        kind,
        source: e.into(),
    }
}

/// Time-ordered, collision-safe identifier
fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewArticle, NewQuiz, SeedPolicy};

    fn empty_store() -> ContentStore {
        ContentStore::in_memory(StoreOptions {
            seed_policy: SeedPolicy::Never,
            ..Default::default()
        })
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_open_uses_fixed_file_name() {
        let store = ContentStore::open("/data", StoreOptions::default());
        assert_eq!(store.path(), Some(Path::new("/data/wastewise.db")));
        assert!(!store.is_initialized());
    }

    #[tokio::test]
    async fn test_first_operation_initializes() {
        let store = empty_store();
        assert!(!store.is_initialized());
        assert!(store.articles().await.unwrap().is_empty());
        assert!(store.is_initialized());
    }

    #[tokio::test]
    async fn test_create_quiz_and_get() {
        let store = empty_store();
        let id = store
            .create(NewQuiz {
                title: "Glass".to_string(),
                question: "Are mirrors recyclable with bottles?".to_string(),
                answer: "No".to_string(),
            })
            .await
            .unwrap();

        let quiz = store
            .get(ContentKind::Quizzes, &id)
            .await
            .unwrap()
            .and_then(Content::into_quiz)
            .unwrap();
        assert_eq!(quiz.id, id);
        assert_eq!(quiz.answer, "No");
    }

    #[tokio::test]
    async fn test_get_wrong_kind_is_none() {
        let store = empty_store();
        let id = store.create(NewArticle::new("T", "C")).await.unwrap();
        assert!(store.get(ContentKind::Quizzes, &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_kind_mismatch_rejected() {
        let store = empty_store();
        let patch = ContentPatch::new(ContentKind::Quizzes)
            .set("answer", "x")
            .unwrap();
        let err = store
            .update(ContentKind::Articles, "a", patch)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::KindMismatch { .. }));
    }

    #[tokio::test]
    async fn test_list_wraps_rows() {
        let store = empty_store();
        store.create(NewArticle::new("T", "C")).await.unwrap();
        let rows = store.list(ContentKind::Articles).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind(), ContentKind::Articles);
        assert_eq!(rows[0].title(), "T");
    }

    #[tokio::test]
    async fn test_unopenable_path_is_initialization_error() {
        let store = ContentStore::open(
            "/nonexistent-wastewise-dir/nested",
            StoreOptions::default(),
        );
        let err = store.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Initialization(DatabaseError::CannotOpen { .. })
        ));
        assert!(!err.to_string().contains("locked"));
        assert!(!store.is_initialized());
    }
}
