// src/store/response_store.rs

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::response::{ResponseSubmission, StoredResponse},
};

/// Storage for submitted answers. The session engine never reads it.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Appends one submission and returns its row id.
    async fn store(&self, submission: &ResponseSubmission) -> Result<i64, AppError>;

    /// All submissions of one test-taker, oldest first.
    async fn responses_for(&self, user_id: &str) -> Result<Vec<StoredResponse>, AppError>;
}

/// `ResponseStore` on the `responses` table of a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteResponseStore {
    pool: SqlitePool,
}

impl SqliteResponseStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Applies the bundled migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ResponseStore for SqliteResponseStore {
    async fn store(&self, submission: &ResponseSubmission) -> Result<i64, AppError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO responses
                (user_id, section, question_id, response_type, response_data, time_taken_ms, auto_submitted)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&submission.user_id)
        .bind(&submission.section)
        .bind(&submission.question_id)
        .bind(&submission.response_type)
        .bind(&submission.response_data)
        .bind(submission.time_taken_ms)
        .bind(submission.auto_submitted)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to store response: {:?}", e);
            AppError::from(e)
        })?;

        Ok(id)
    }

    async fn responses_for(&self, user_id: &str) -> Result<Vec<StoredResponse>, AppError> {
        let rows = sqlx::query_as::<_, StoredResponse>(
            r#"
            SELECT
                id, user_id, section, question_id, response_type,
                response_data, time_taken_ms, auto_submitted, created_at
            FROM responses
            WHERE user_id = ?
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn memory_store() -> SqliteResponseStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteResponseStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn typed(user: &str, data: &str) -> ResponseSubmission {
        ResponseSubmission {
            user_id: user.to_string(),
            section: "E".to_string(),
            question_id: "E-1".to_string(),
            response_type: "text".to_string(),
            response_data: Some(data.to_string()),
            time_taken_ms: Some(1200),
            auto_submitted: false,
        }
    }

    #[tokio::test]
    async fn keystroke_submissions_are_all_kept() {
        let store = memory_store().await;

        let first = store.store(&typed("u1", "T")).await.unwrap();
        let second = store.store(&typed("u1", "Th")).await.unwrap();
        store.store(&typed("u2", "other")).await.unwrap();

        assert!(second > first);
        let rows = store.responses_for("u1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].response_data.as_deref(), Some("Th"));
        assert_eq!(rows[0].time_taken_ms, Some(1200));
        assert!(!rows[0].auto_submitted);
    }
}
