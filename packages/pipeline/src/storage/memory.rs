//! In-memory storage backend.
//!
//! Implements the same contracts as the Postgres backend over plain maps,
//! for unit tests and dry runs. Checkpoint ordering follows registration
//! order, matching the `ORDER BY created_at` of the database backend.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{CheckpointStore, JobStore};
use crate::types::{
    CheckpointRecord, CheckpointStatus, ClassifiedJobRecord, ScrapedJobRecord, Stage, StatusCounts,
};

#[derive(Default)]
struct Inner {
    // Registration-ordered per stage.
    checkpoints: HashMap<Stage, Vec<CheckpointRecord>>,
    scraped: HashMap<String, ScrapedJobRecord>,
    classified: HashMap<String, ClassifiedJobRecord>,
}

#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status of one checkpoint, for assertions in tests.
    pub async fn checkpoint_status(&self, stage: Stage, key: &str) -> Option<CheckpointStatus> {
        let inner = self.inner.lock().await;
        inner
            .checkpoints
            .get(&stage)
            .and_then(|records| records.iter().find(|r| r.key == key))
            .map(|r| r.status)
    }

    /// Attempt count of one checkpoint, for assertions in tests.
    pub async fn checkpoint_attempts(&self, stage: Stage, key: &str) -> Option<u32> {
        let inner = self.inner.lock().await;
        inner
            .checkpoints
            .get(&stage)
            .and_then(|records| records.iter().find(|r| r.key == key))
            .map(|r| r.attempts)
    }
}

#[async_trait]
impl CheckpointStore for MemoryStorage {
    async fn register(&self, stage: Stage, keys: &[String]) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let records = inner.checkpoints.entry(stage).or_default();
        let mut inserted = 0;
        for key in keys {
            if !records.iter().any(|r| &r.key == key) {
                records.push(CheckpointRecord::pending(key.clone()));
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn pending(&self, stage: Stage) -> Result<Vec<CheckpointRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .checkpoints
            .get(&stage)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.status == CheckpointStatus::Pending)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn mark(
        &self,
        stage: Stage,
        key: &str,
        status: CheckpointStatus,
        attempts: u32,
        error: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(record) = inner
            .checkpoints
            .entry(stage)
            .or_default()
            .iter_mut()
            .find(|r| r.key == key)
        {
            // Done is permanent.
            if record.status == CheckpointStatus::Done {
                return Ok(());
            }
            record.status = status;
            record.attempts += attempts;
            record.last_attempt_at = Some(Utc::now());
            record.error = error.map(str::to_string);
        }
        Ok(())
    }

    async fn counts(&self, stage: Stage) -> Result<StatusCounts> {
        let inner = self.inner.lock().await;
        let mut counts = StatusCounts::default();
        if let Some(records) = inner.checkpoints.get(&stage) {
            for record in records {
                match record.status {
                    CheckpointStatus::Pending => counts.pending += 1,
                    CheckpointStatus::Done => counts.done += 1,
                    CheckpointStatus::FailedRetryable => counts.failed_retryable += 1,
                    CheckpointStatus::FailedTerminal => counts.failed_terminal += 1,
                }
            }
        }
        Ok(counts)
    }

    async fn requeue_retryable(&self, stage: Stage) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let mut requeued = 0;
        if let Some(records) = inner.checkpoints.get_mut(&stage) {
            for record in records {
                if record.status == CheckpointStatus::FailedRetryable {
                    record.status = CheckpointStatus::Pending;
                    record.error = None;
                    requeued += 1;
                }
            }
        }
        Ok(requeued)
    }
}

#[async_trait]
impl JobStore for MemoryStorage {
    async fn save_scraped(&self, record: &ScrapedJobRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.scraped.insert(record.url.clone(), record.clone());
        Ok(())
    }

    async fn get_scraped(&self, url: &str) -> Result<Option<ScrapedJobRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.scraped.get(url).cloned())
    }

    async fn count_scraped(&self) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.scraped.len() as u64)
    }

    async fn save_classified(&self, record: &ClassifiedJobRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.classified.insert(record.url.clone(), record.clone());
        Ok(())
    }

    async fn get_classified(&self, url: &str) -> Result<Option<ClassifiedJobRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.classified.get(url).cloned())
    }

    async fn count_classified(&self) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.classified.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_is_set_on_insert() {
        let store = MemoryStorage::new();
        let keys = vec!["a".to_string(), "b".to_string()];
        assert_eq!(store.register(Stage::ScrapeJobPages, &keys).await.unwrap(), 2);

        store
            .mark(Stage::ScrapeJobPages, "a", CheckpointStatus::Done, 1, None)
            .await
            .unwrap();

        // Re-registering must not resurrect the done record.
        assert_eq!(store.register(Stage::ScrapeJobPages, &keys).await.unwrap(), 0);
        assert_eq!(
            store.checkpoint_status(Stage::ScrapeJobPages, "a").await,
            Some(CheckpointStatus::Done)
        );
    }

    #[tokio::test]
    async fn done_never_regresses() {
        let store = MemoryStorage::new();
        store
            .register(Stage::Classify, &["x".to_string()])
            .await
            .unwrap();
        store
            .mark(Stage::Classify, "x", CheckpointStatus::Done, 1, None)
            .await
            .unwrap();
        store
            .mark(
                Stage::Classify,
                "x",
                CheckpointStatus::FailedRetryable,
                1,
                Some("late failure"),
            )
            .await
            .unwrap();

        assert_eq!(
            store.checkpoint_status(Stage::Classify, "x").await,
            Some(CheckpointStatus::Done)
        );
    }

    #[tokio::test]
    async fn requeue_moves_only_retryable() {
        let store = MemoryStorage::new();
        store
            .register(
                Stage::Classify,
                &["a".to_string(), "b".to_string(), "c".to_string()],
            )
            .await
            .unwrap();
        store
            .mark(Stage::Classify, "a", CheckpointStatus::FailedRetryable, 3, Some("429"))
            .await
            .unwrap();
        store
            .mark(Stage::Classify, "b", CheckpointStatus::FailedTerminal, 1, Some("404"))
            .await
            .unwrap();

        assert_eq!(store.requeue_retryable(Stage::Classify).await.unwrap(), 1);
        let counts = store.counts(Stage::Classify).await.unwrap();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.failed_terminal, 1);
        // Attempts survive the re-queue.
        assert_eq!(store.checkpoint_attempts(Stage::Classify, "a").await, Some(3));
    }
}
