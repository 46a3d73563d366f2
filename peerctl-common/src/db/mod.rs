//! Database access
//!
//! Pool initialization and table creation for the peerctl schema. Tables are
//! created idempotently at startup; the schema is the source of truth for
//! the entities described in the models module of the service crate.

use std::path::Path;

use sqlx::SqlitePool;

use crate::error::Result;

pub mod schema;

/// Initialize database connection pool and create tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create an in-memory pool with the full schema, used by tests
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePool::connect("sqlite::memory:").await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create all peerctl tables if they do not exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    for statement in schema::TABLES {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_initializes() {
        let pool = init_memory_pool().await.expect("schema should apply");

        // twice must be a no-op
        init_tables(&pool).await.expect("idempotent init");

        let count: (i64,) =
            sqlx::query_as("SELECT count(*) FROM sqlite_master WHERE type = 'table'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(count.0 >= 13);
    }
}
