use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use wastewise::config::Config;
use wastewise::storage::{
    ContentKind, ContentPatch, ContentStore, NewArticle, NewQuiz, StoreError, LATEST_VERSION,
};

/// Get the config directory path (~/.config/wastewise/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("wastewise"))
}

/// Remove the database file and its WAL/shared-memory siblings.
fn reset_database(db_path: &Path) -> Result<()> {
    let mut removed = false;
    for suffix in ["", "-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        let path = PathBuf::from(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete '{}'", path.display()))?;
            removed = true;
        }
    }
    if removed {
        println!("Database reset.");
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "wastewise", about = "Waste-management learning content store")]
struct Args {
    /// Config file (defaults to ~/.config/wastewise/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the database (overrides config)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create and migrate the database, then print the schema version
    Init,
    /// List every article or quiz
    List { kind: ContentKind },
    /// Show a single article or quiz
    Get { kind: ContentKind, id: String },
    /// Create an article or quiz and print its id
    #[command(subcommand)]
    Create(CreateCommand),
    /// Update fields of an article or quiz
    Update {
        kind: ContentKind,
        id: String,
        /// Field assignment, e.g. --set title="Compost 101" (repeatable)
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        assignments: Vec<String>,
        /// Fields as a JSON object, e.g. --json '{"level":"Advanced"}'
        #[arg(long, conflicts_with = "assignments")]
        json: Option<String>,
    },
    /// Delete an article or quiz
    Delete { kind: ContentKind, id: String },
}

#[derive(Subcommand, Debug)]
enum CreateCommand {
    Article {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        level: Option<String>,
    },
    Quiz {
        #[arg(long)]
        title: String,
        #[arg(long)]
        question: String,
        #[arg(long)]
        answer: String,
    },
}

fn build_patch(
    kind: ContentKind,
    assignments: &[String],
    json: Option<&str>,
) -> Result<ContentPatch> {
    if let Some(json) = json {
        let value: serde_json::Value =
            serde_json::from_str(json).context("--json is not valid JSON")?;
        return Ok(ContentPatch::from_json(kind, &value)?);
    }

    let mut patch = ContentPatch::new(kind);
    for assignment in assignments {
        let Some((field, value)) = assignment.split_once('=') else {
            bail!("Expected FIELD=VALUE, got '{}'", assignment);
        };
        patch = patch.set(field.trim(), value)?;
    }
    Ok(patch)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(store: &ContentStore, command: Command) -> Result<()> {
    match command {
        Command::Init => {
            let db = store.database().await?;
            let version = db.schema_version().await?;
            println!(
                "Database ready at schema version {} (latest {})",
                version, LATEST_VERSION
            );
        }
        Command::List { kind } => {
            print_json(&store.list(kind).await?)?;
        }
        Command::Get { kind, id } => match store.get(kind, &id).await? {
            Some(content) => print_json(&content)?,
            None => {
                eprintln!("No {} with id '{}'", kind, id);
                std::process::exit(1);
            }
        },
        Command::Create(CreateCommand::Article {
            title,
            content,
            category,
            level,
        }) => {
            let id = store
                .create(NewArticle {
                    title,
                    content,
                    category,
                    level,
                })
                .await?;
            println!("{}", id);
        }
        Command::Create(CreateCommand::Quiz {
            title,
            question,
            answer,
        }) => {
            let id = store
                .create(NewQuiz {
                    title,
                    question,
                    answer,
                })
                .await?;
            println!("{}", id);
        }
        Command::Update {
            kind,
            id,
            assignments,
            json,
        } => {
            let patch = build_patch(kind, &assignments, json.as_deref())?;
            if patch.is_empty() {
                eprintln!("Nothing to update.");
            }
            store.update(kind, &id, patch).await?;
        }
        Command::Delete { kind, id } => {
            store.delete(kind, &id).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data_dir_or(&config_dir));
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        tracing::info!(path = %data_dir.display(), "Created data directory");
    }

    // Keep the data directory user-only on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(&data_dir, perms) {
            tracing::warn!(
                path = %data_dir.display(),
                error = %e,
                "Failed to set data directory permissions to 0700"
            );
        }
    }

    let store = ContentStore::open(&data_dir, config.store_options());

    if args.reset_db {
        if let Some(db_path) = store.path() {
            reset_database(db_path)?;
        }
    }

    match run(&store, args.command).await {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<StoreError>() {
            Some(StoreError::Initialization(inner)) => {
                eprintln!("Error: {}", inner);
                std::process::exit(1);
            }
            Some(store_err) => {
                // Generic message; the cause was already logged
                eprintln!("Error: {}", store_err);
                std::process::exit(1);
            }
            None => Err(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_update_assignments() {
        let args = Args::try_parse_from([
            "wastewise",
            "update",
            "article",
            "abc",
            "--set",
            "title=Compost 101",
            "--set",
            "level=Advanced",
        ])
        .unwrap();
        let Command::Update {
            kind, assignments, ..
        } = args.command
        else {
            panic!("expected update command");
        };
        assert_eq!(kind, ContentKind::Articles);
        assert_eq!(assignments.len(), 2);
    }

    #[test]
    fn test_cli_rejects_unknown_kind() {
        assert!(Args::try_parse_from(["wastewise", "list", "videos"]).is_err());
    }

    #[test]
    fn test_build_patch_from_assignments_strips_id() {
        let patch = build_patch(
            ContentKind::Articles,
            &["id=other".to_string(), "title=T2".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(patch.fields().collect::<Vec<_>>(), vec![("title", "T2")]);
    }

    #[test]
    fn test_build_patch_value_may_contain_equals() {
        let patch = build_patch(ContentKind::Quizzes, &["answer=a=b".to_string()], None).unwrap();
        assert_eq!(patch.fields().next(), Some(("answer", "a=b")));
    }

    #[test]
    fn test_build_patch_rejects_missing_equals() {
        assert!(build_patch(ContentKind::Quizzes, &["answer".to_string()], None).is_err());
    }

    #[test]
    fn test_build_patch_from_json() {
        let patch =
            build_patch(ContentKind::Articles, &[], Some(r#"{"level":"Advanced"}"#)).unwrap();
        assert_eq!(patch.fields().next(), Some(("level", "Advanced")));
    }

    #[test]
    fn test_reset_database_removes_wal_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("wastewise.db");
        for suffix in ["", "-wal", "-shm"] {
            std::fs::write(format!("{}{}", db_path.display(), suffix), b"x").unwrap();
        }

        reset_database(&db_path).unwrap();
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
