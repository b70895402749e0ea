use crate::backend::ContributionStore;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{migrate::MigrateDatabase, sqlite::{SqlitePool, SqlitePoolOptions}, Row, Sqlite};
use std::collections::HashMap;

/// Local, per-device storage for the voter's own contributions.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    /// A private in-memory database.
    ///
    /// Every SQLite connection to `:memory:` opens its own database, so the
    /// pool is pinned to a single connection that is never recycled.
    pub async fn in_memory() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_contributions (
                poll_id TEXT NOT NULL,
                option_id TEXT NOT NULL,
                votes INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (poll_id, option_id)
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    // Total votes this device cast on a poll
    pub async fn poll_total(&self, poll_id: &str) -> Result<u32, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(votes), 0) AS total
            FROM user_contributions
            WHERE poll_id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("total").max(0) as u32)
    }
}

#[async_trait]
impl ContributionStore for Database {
    async fn load_contributions(
        &self,
        poll_id: &str,
    ) -> Result<HashMap<String, u32>, Box<dyn std::error::Error + Send + Sync>> {
        let contributions = sqlx::query(
            r#"
            SELECT option_id, votes
            FROM user_contributions
            WHERE poll_id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| {
            (
                row.get::<String, _>("option_id"),
                row.get::<i64, _>("votes").max(0) as u32,
            )
        })
        .collect();

        Ok(contributions)
    }

    // Last writer wins: another session on the same device may overwrite these rows.
    async fn save_contributions(
        &self,
        poll_id: &str,
        contributions: &HashMap<String, u32>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();

        for (option_id, votes) in contributions {
            sqlx::query(
                r#"
                INSERT INTO user_contributions (poll_id, option_id, votes, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(poll_id, option_id)
                DO UPDATE SET votes = excluded.votes, updated_at = excluded.updated_at
                "#,
            )
            .bind(poll_id)
            .bind(option_id)
            .bind(i64::from(*votes))
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
