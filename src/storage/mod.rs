mod articles;
mod meta;
mod migrations;
mod quizzes;
mod schema;
mod seed;
mod store;
mod types;

pub use migrations::{MigrationReport, LATEST_VERSION};
pub use schema::Database;
pub use seed::{seed_article_ids, seed_quiz_ids, SeedOutcome, SeedPolicy, SEED_THRESHOLD, SEED_VERSION};
pub use store::{ContentStore, DATABASE_FILE_NAME};
pub use types::{
    Article, Content, ContentKind, ContentPatch, DatabaseError, NewArticle, NewContent, NewQuiz,
    Quiz, StoreError, StoreOptions, DEFAULT_CATEGORY, DEFAULT_LEVEL,
};
