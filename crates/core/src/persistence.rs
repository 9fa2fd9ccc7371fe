//! Durable storage for the learned classifier state and the pending feedback
//! buffer.

use crate::classifier::ClassifierState;
use crate::models::FeedbackSample;
use parking_lot::Mutex;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use storage::models::{ClassifierState as StateRow, Feedback as FeedbackRow};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    async fn load_state(&self) -> Result<Option<ClassifierState>, StoreError>;
    async fn save_state(&self, state: &ClassifierState) -> Result<(), StoreError>;
    /// Appends one sample and returns the number of pending samples.
    async fn append_feedback(&self, sample: &FeedbackSample) -> Result<usize, StoreError>;
    /// Pending samples, oldest first.
    async fn pending_feedback(&self) -> Result<Vec<FeedbackSample>, StoreError>;
    async fn pending_count(&self) -> Result<usize, StoreError>;
    /// Saves `state` and drops the `consumed` oldest samples as one
    /// all-or-nothing write.
    async fn commit_training(
        &self,
        state: &ClassifierState,
        consumed: usize,
    ) -> Result<(), StoreError>;
}

pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn upsert_state<'e, E>(executor: E, state: &ClassifierState) -> Result<(), StoreError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let json = serde_json::to_string(state)?;
        sqlx::query(
            r#"
            INSERT INTO classifier_state (id, schema_version, state_json, sample_count, trained_at)
            VALUES (1, ?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                schema_version=excluded.schema_version,
                state_json=excluded.state_json,
                sample_count=excluded.sample_count,
                trained_at=excluded.trained_at
            "#,
        )
        .bind(i64::from(state.schema_version))
        .bind(json)
        .bind(state.sample_count as i64)
        .bind(state.trained_at)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StateStore for SqliteStateStore {
    async fn load_state(&self) -> Result<Option<ClassifierState>, StoreError> {
        let row = sqlx::query_as::<_, StateRow>(
            "SELECT schema_version, state_json, sample_count, trained_at FROM classifier_state WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(serde_json::from_str(&row.state_json)?)),
            None => Ok(None),
        }
    }

    async fn save_state(&self, state: &ClassifierState) -> Result<(), StoreError> {
        Self::upsert_state(&self.pool, state).await
    }

    async fn append_feedback(&self, sample: &FeedbackSample) -> Result<usize, StoreError> {
        let json = serde_json::to_string(&sample.features)?;
        sqlx::query("INSERT INTO feedback (features_json, is_relevant) VALUES (?1, ?2)")
            .bind(json)
            .bind(sample.is_relevant)
            .execute(&self.pool)
            .await?;
        self.pending_count().await
    }

    async fn pending_feedback(&self) -> Result<Vec<FeedbackSample>, StoreError> {
        let rows = sqlx::query_as::<_, FeedbackRow>(
            "SELECT id, features_json, is_relevant, created_at FROM feedback ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| -> Result<FeedbackSample, StoreError> {
                Ok(FeedbackSample {
                    features: serde_json::from_str(&row.features_json)?,
                    is_relevant: row.is_relevant,
                })
            })
            .collect()
    }

    async fn pending_count(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }

    async fn commit_training(
        &self,
        state: &ClassifierState,
        consumed: usize,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_state(&mut *tx, state).await?;
        sqlx::query("DELETE FROM feedback WHERE id IN (SELECT id FROM feedback ORDER BY id LIMIT ?1)")
            .bind(consumed as i64)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Process-local store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<ClassifierState>>,
    feedback: Mutex<Vec<FeedbackSample>>,
    fail_writes: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with `StoreError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("writes disabled".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl StateStore for MemoryStateStore {
    async fn load_state(&self) -> Result<Option<ClassifierState>, StoreError> {
        Ok(self.state.lock().clone())
    }

    async fn save_state(&self, state: &ClassifierState) -> Result<(), StoreError> {
        self.check_writable()?;
        *self.state.lock() = Some(state.clone());
        Ok(())
    }

    async fn append_feedback(&self, sample: &FeedbackSample) -> Result<usize, StoreError> {
        self.check_writable()?;
        let mut feedback = self.feedback.lock();
        feedback.push(sample.clone());
        Ok(feedback.len())
    }

    async fn pending_feedback(&self) -> Result<Vec<FeedbackSample>, StoreError> {
        Ok(self.feedback.lock().clone())
    }

    async fn pending_count(&self) -> Result<usize, StoreError> {
        Ok(self.feedback.lock().len())
    }

    async fn commit_training(
        &self,
        state: &ClassifierState,
        consumed: usize,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut feedback = self.feedback.lock();
        let consumed = consumed.min(feedback.len());
        feedback.drain(..consumed);
        *self.state.lock() = Some(state.clone());
        Ok(())
    }
}
