//! Persistence seams for checkpoints and job records.
//!
//! All mutations are single-document upserts keyed by the item's natural
//! key (its URL), so the store's own atomic upsert provides the necessary
//! mutual exclusion — no application-level locking around checkpoints.

pub mod memory;
pub mod postgres;
pub mod seed_file;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use seed_file::SeedFile;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    CheckpointRecord, CheckpointStatus, ClassifiedJobRecord, ScrapedJobRecord, Stage, StatusCounts,
};

/// Per-stage completion markers.
///
/// Invariants every implementation upholds:
/// - at most one record per (stage, key);
/// - `register` never disturbs an existing record (set-on-insert);
/// - `mark` never regresses a `Done` record;
/// - records are never deleted.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Register keys as pending work for a stage. Existing records are left
    /// untouched. Returns how many keys were newly registered.
    async fn register(&self, stage: Stage, keys: &[String]) -> Result<u64>;

    /// The remaining work set: all pending records for a stage.
    async fn pending(&self, stage: Stage) -> Result<Vec<CheckpointRecord>>;

    /// Record the outcome of one processing pass over `key`, adding
    /// `attempts` to its attempt count. A no-op for records already `Done`.
    async fn mark(
        &self,
        stage: Stage,
        key: &str,
        status: CheckpointStatus,
        attempts: u32,
        error: Option<&str>,
    ) -> Result<()>;

    /// Per-status counts for a stage.
    async fn counts(&self, stage: Stage) -> Result<StatusCounts>;

    /// Move every `FailedRetryable` record of a stage back to `Pending`
    /// (operator-driven re-queue). Returns how many were re-queued.
    async fn requeue_retryable(&self, stage: Stage) -> Result<u64>;
}

/// Scraped and classified job records, keyed by source URL.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save_scraped(&self, record: &ScrapedJobRecord) -> Result<()>;
    async fn get_scraped(&self, url: &str) -> Result<Option<ScrapedJobRecord>>;
    async fn count_scraped(&self) -> Result<u64>;

    async fn save_classified(&self, record: &ClassifiedJobRecord) -> Result<()>;
    async fn get_classified(&self, url: &str) -> Result<Option<ClassifiedJobRecord>>;
    async fn count_classified(&self) -> Result<u64>;
}
