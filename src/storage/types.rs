use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use super::seed::SeedPolicy;

/// Category stored for articles created without one.
pub const DEFAULT_CATEGORY: &str = "General";

/// Level stored for articles created without one.
pub const DEFAULT_LEVEL: &str = "Beginner";

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while opening or bootstrapping the database
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("The content database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// The database file cannot be opened or created
    #[error("Cannot open content database at {path}")]
    CannotOpen {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    /// A required migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The database path cannot be handed to SQLite
    #[error("Database path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6) surface through these messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
}

/// SQLITE_CANTOPEN (14): missing directory, no permission, not a file.
pub(crate) fn is_cantopen_message(message: &str) -> bool {
    message.to_lowercase().contains("unable to open database file")
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by [`ContentStore`](super::ContentStore) operations.
///
/// Storage failures carry the engine error as their `source()`, but the
/// display text stays generic so raw SQLite messages never reach the UI.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to initialize content store: {0}")]
    Initialization(#[source] DatabaseError),

    #[error("query failed for {kind}")]
    QueryFailed {
        kind: ContentKind,
        #[source]
        source: BoxError,
    },

    #[error("insert failed for {kind}")]
    InsertFailed {
        kind: ContentKind,
        #[source]
        source: BoxError,
    },

    #[error("update failed for {kind}")]
    UpdateFailed {
        kind: ContentKind,
        #[source]
        source: BoxError,
    },

    #[error("delete failed for {kind}")]
    DeleteFailed {
        kind: ContentKind,
        #[source]
        source: BoxError,
    },

    #[error("unknown content kind: {0}")]
    UnknownKind(String),

    #[error("{kind} has no field named `{field}`")]
    UnknownField { kind: ContentKind, field: String },

    #[error("field `{field}` must be a string")]
    InvalidValue { field: String },

    #[error("patch must be a JSON object")]
    InvalidPatch,

    #[error("patch targets {actual} but the operation targets {expected}")]
    KindMismatch {
        expected: ContentKind,
        actual: ContentKind,
    },
}

// ============================================================================
// Content Kind
// ============================================================================

/// The record category an operation targets. Each kind maps to one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Articles,
    Quizzes,
}

impl ContentKind {
    pub const ALL: [ContentKind; 2] = [ContentKind::Articles, ContentKind::Quizzes];

    pub fn table(self) -> &'static str {
        match self {
            ContentKind::Articles => "articles",
            ContentKind::Quizzes => "quizzes",
        }
    }

    /// Columns a patch may set. `id` is never among them.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            ContentKind::Articles => &["title", "content", "category", "level"],
            ContentKind::Quizzes => &["title", "question", "answer"],
        }
    }

    fn column(self, name: &str) -> Option<&'static str> {
        self.columns().iter().copied().find(|c| *c == name)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for ContentKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "articles" | "article" => Ok(ContentKind::Articles),
            "quizzes" | "quiz" => Ok(ContentKind::Quizzes),
            _ => Err(StoreError::UnknownKind(s.to_string())),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Learning article row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub level: String,
}

/// Quiz row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Quiz {
    pub id: String,
    pub title: String,
    pub question: String,
    pub answer: String,
}

/// A row of either kind, as returned by the kind-generic reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Content {
    Article(Article),
    Quiz(Quiz),
}

impl Content {
    pub fn id(&self) -> &str {
        match self {
            Content::Article(a) => &a.id,
            Content::Quiz(q) => &q.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Content::Article(a) => &a.title,
            Content::Quiz(q) => &q.title,
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            Content::Article(_) => ContentKind::Articles,
            Content::Quiz(_) => ContentKind::Quizzes,
        }
    }

    pub fn into_article(self) -> Option<Article> {
        match self {
            Content::Article(a) => Some(a),
            Content::Quiz(_) => None,
        }
    }

    pub fn into_quiz(self) -> Option<Quiz> {
        match self {
            Content::Quiz(q) => Some(q),
            Content::Article(_) => None,
        }
    }
}

/// Fields for a new article. Missing `category`/`level` fall back to
/// [`DEFAULT_CATEGORY`] and [`DEFAULT_LEVEL`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
}

impl NewArticle {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            category: None,
            level: None,
        }
    }

    pub(crate) fn into_article(self, id: String) -> Article {
        Article {
            id,
            title: self.title,
            content: self.content,
            category: self
                .category
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            level: self.level.unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
        }
    }
}

/// Fields for a new quiz
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewQuiz {
    pub title: String,
    pub question: String,
    pub answer: String,
}

impl NewQuiz {
    pub(crate) fn into_quiz(self, id: String) -> Quiz {
        Quiz {
            id,
            title: self.title,
            question: self.question,
            answer: self.answer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewContent {
    Article(NewArticle),
    Quiz(NewQuiz),
}

impl NewContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            NewContent::Article(_) => ContentKind::Articles,
            NewContent::Quiz(_) => ContentKind::Quizzes,
        }
    }
}

impl From<NewArticle> for NewContent {
    fn from(article: NewArticle) -> Self {
        NewContent::Article(article)
    }
}

impl From<NewQuiz> for NewContent {
    fn from(quiz: NewQuiz) -> Self {
        NewContent::Quiz(quiz)
    }
}

// ============================================================================
// Partial Updates
// ============================================================================

/// A validated set of column assignments for one kind.
///
/// Column names are only ever taken from [`ContentKind::columns`], so a patch
/// can be spliced into an UPDATE statement without further escaping. An `id`
/// key is dropped on the way in: identifiers are immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPatch {
    kind: ContentKind,
    fields: Vec<(&'static str, String)>,
}

impl ContentPatch {
    pub fn new(kind: ContentKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    /// Assign `value` to `field`. A later assignment to the same field wins.
    pub fn set(mut self, field: &str, value: impl Into<String>) -> Result<Self, StoreError> {
        if field == "id" {
            return Ok(self);
        }
        let column = self
            .kind
            .column(field)
            .ok_or_else(|| StoreError::UnknownField {
                kind: self.kind,
                field: field.to_string(),
            })?;
        let value = value.into();
        match self.fields.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
        Ok(self)
    }

    /// Build a patch from a JSON object such as `{"title": "Compost 101"}`.
    pub fn from_json(kind: ContentKind, value: &serde_json::Value) -> Result<Self, StoreError> {
        let object = value.as_object().ok_or(StoreError::InvalidPatch)?;
        let mut patch = Self::new(kind);
        for (field, value) in object {
            if field == "id" {
                continue;
            }
            let text = value.as_str().ok_or_else(|| StoreError::InvalidValue {
                field: field.clone(),
            })?;
            patch = patch.set(field, text)?;
        }
        Ok(patch)
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.fields.iter().map(|(c, v)| (*c, v.as_str()))
    }
}

// ============================================================================
// Store Options
// ============================================================================

/// Connection and bootstrap settings for a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Upper bound on pooled SQLite connections
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before failing
    pub busy_timeout: Duration,
    pub seed_policy: SeedPolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_millis(5000),
            seed_policy: SeedPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_parses_singular_and_plural() {
        assert_eq!("articles".parse::<ContentKind>().unwrap(), ContentKind::Articles);
        assert_eq!("Article".parse::<ContentKind>().unwrap(), ContentKind::Articles);
        assert_eq!(" quiz ".parse::<ContentKind>().unwrap(), ContentKind::Quizzes);
        assert!(matches!(
            "videos".parse::<ContentKind>(),
            Err(StoreError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_new_article_applies_defaults() {
        let article = NewArticle::new("T", "C").into_article("a1".to_string());
        assert_eq!(article.category, DEFAULT_CATEGORY);
        assert_eq!(article.level, DEFAULT_LEVEL);
    }

    #[test]
    fn test_new_article_keeps_explicit_values() {
        let new = NewArticle {
            category: Some("Recycling".to_string()),
            level: Some("Advanced".to_string()),
            ..NewArticle::new("T", "C")
        };
        let article = new.into_article("a1".to_string());
        assert_eq!(article.category, "Recycling");
        assert_eq!(article.level, "Advanced");
    }

    #[test]
    fn test_patch_strips_id() {
        let patch = ContentPatch::new(ContentKind::Articles)
            .set("id", "other")
            .unwrap()
            .set("title", "T2")
            .unwrap();
        let fields: Vec<_> = patch.fields().collect();
        assert_eq!(fields, vec![("title", "T2")]);
    }

    #[test]
    fn test_patch_of_only_id_is_empty() {
        let patch = ContentPatch::from_json(ContentKind::Quizzes, &json!({"id": "x"})).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn test_patch_rejects_column_of_other_kind() {
        let err = ContentPatch::new(ContentKind::Quizzes)
            .set("category", "Recycling")
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownField { .. }));
    }

    #[test]
    fn test_patch_last_assignment_wins() {
        let patch = ContentPatch::new(ContentKind::Quizzes)
            .set("answer", "a")
            .unwrap()
            .set("answer", "b")
            .unwrap();
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.fields().next(), Some(("answer", "b")));
    }

    #[test]
    fn test_patch_from_json_rejects_null_and_non_objects() {
        let err = ContentPatch::from_json(ContentKind::Articles, &json!({"category": null}))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { .. }));

        let err = ContentPatch::from_json(ContentKind::Articles, &json!(["title"])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPatch));
    }

    #[test]
    fn test_store_error_display_hides_source() {
        let err = StoreError::InsertFailed {
            kind: ContentKind::Articles,
            source: "UNIQUE constraint failed: articles.id".into(),
        };
        assert_eq!(err.to_string(), "insert failed for articles");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_lock_messages_detected() {
        assert!(is_lock_message("error returned from database: database is locked"));
        assert!(!is_lock_message("(code: 14) unable to open database file"));
        assert!(!is_lock_message("no such table: articles"));
    }

    #[test]
    fn test_cantopen_is_not_a_lock() {
        let message = "error returned from database: (code: 14) unable to open database file";
        assert!(is_cantopen_message(message));
        assert!(!is_cantopen_message("database is locked"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn patch_never_carries_id(value in ".*") {
                let patch = ContentPatch::new(ContentKind::Articles)
                    .set("id", value.clone())
                    .unwrap()
                    .set("content", value)
                    .unwrap();
                prop_assert!(patch.fields().all(|(c, _)| c != "id"));
                prop_assert_eq!(patch.len(), 1);
            }

            #[test]
            fn unknown_columns_rejected(field in "[a-z_]{1,16}") {
                prop_assume!(field != "id");
                let result = ContentPatch::new(ContentKind::Quizzes).set(&field, "v");
                if ContentKind::Quizzes.columns().contains(&field.as_str()) {
                    prop_assert!(result.is_ok());
                } else {
                    let is_unknown = matches!(result, Err(StoreError::UnknownField { .. }));
                    prop_assert!(is_unknown);
                }
            }
        }
    }
}
