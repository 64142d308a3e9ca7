mod models;

pub use models::*;

use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;

pub type DbPool = SqlitePool;

/// Strip `--` comment lines, so a `;` inside a comment never splits a statement
fn strip_comments(sql: &str) -> String {
    sql.lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Execute a SQL migration file statement by statement
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in strip_comments(sql).split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

pub async fn init(url: &str, config: &DatabaseConfig) -> Result<DbPool> {
    info!("Initializing database at {}", url);

    let options = SqliteConnectOptions::from_str(url)?
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await?;

    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// Single-connection in-memory database with the schema applied
pub async fn init_memory() -> Result<DbPool> {
    // Every connection to `sqlite::memory:` is a separate database, so pin the pool to one
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: Identities (one table, tagged by role)
    execute_sql(pool, include_str!("../../migrations/001_identities.sql")).await?;

    // Migration 002: Pending registrations
    execute_sql(pool, include_str!("../../migrations/002_pending_registrations.sql")).await?;

    // Migration 003: Enrollment roster
    execute_sql(pool, include_str!("../../migrations/003_roster.sql")).await?;

    // Migration 004: Connection requests
    execute_sql(pool, include_str!("../../migrations/004_connection_requests.sql")).await?;

    // Migration 005: Direct messages
    execute_sql(pool, include_str!("../../migrations/005_messages.sql")).await?;

    // Migration 006: Directory profile details
    execute_sql(pool, include_str!("../../migrations/006_profile_details.sql")).await?;

    // Migration 007: Posts, likes and comments
    execute_sql(pool, include_str!("../../migrations/007_posts.sql")).await?;

    // Migration 008: Q&A board
    execute_sql(pool, include_str!("../../migrations/008_qna.sql")).await?;

    info!("Migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "connection_requests",
                "identities",
                "messages",
                "pending_registrations",
                "post_comments",
                "post_likes",
                "posts",
                "profile_details",
                "qna_answers",
                "qna_questions",
                "roster_entries"
            ]
        );
    }

    #[tokio::test]
    async fn test_semicolon_in_comment_does_not_split_statement() {
        let pool = init_memory().await.unwrap();
        execute_sql(
            &pool,
            "-- scratch table; used only here\nCREATE TABLE scratch (id TEXT);\n-- trailing; comment",
        )
        .await
        .unwrap();
        assert!(!strip_comments("-- a; b\nSELECT 1").contains(';'));
    }

    #[tokio::test]
    async fn test_file_database_initializes() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::default();
        let url = config.resolve_url(dir.path());
        let pool = init(&url, &config).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM identities")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
