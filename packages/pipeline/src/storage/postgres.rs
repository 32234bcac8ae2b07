use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::{CheckpointStore, JobStore};
use crate::types::{
    CheckpointRecord, CheckpointStatus, ClassifiedJobRecord, ScrapedJobRecord, Stage, StatusCounts,
};

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for PostgresStorage {
    async fn register(&self, stage: Stage, keys: &[String]) -> Result<u64> {
        let mut inserted = 0;
        for key in keys {
            let result = sqlx::query(
                r#"
                INSERT INTO checkpoints (stage, key, status, attempts)
                VALUES ($1, $2, 'pending', 0)
                ON CONFLICT (stage, key) DO NOTHING
                "#,
            )
            .bind(stage.as_str())
            .bind(key)
            .execute(&self.pool)
            .await
            .context("Failed to register checkpoint")?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn pending(&self, stage: Stage) -> Result<Vec<CheckpointRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT key, status, attempts, last_attempt_at, error
            FROM checkpoints
            WHERE stage = $1 AND status = 'pending'
            ORDER BY created_at
            "#,
        )
        .bind(stage.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load pending checkpoints")?;

        rows.into_iter()
            .map(|r| {
                let raw_status: String = r.get("status");
                let status = CheckpointStatus::parse(&raw_status)
                    .with_context(|| format!("unknown checkpoint status `{raw_status}`"))?;
                Ok(CheckpointRecord {
                    key: r.get("key"),
                    status,
                    attempts: r.get::<i32, _>("attempts") as u32,
                    last_attempt_at: r.get("last_attempt_at"),
                    error: r.get("error"),
                })
            })
            .collect()
    }

    async fn mark(
        &self,
        stage: Stage,
        key: &str,
        status: CheckpointStatus,
        attempts: u32,
        error: Option<&str>,
    ) -> Result<()> {
        // The status != 'done' guard keeps Done permanent even when two
        // workers race on a re-queued duplicate.
        sqlx::query(
            r#"
            UPDATE checkpoints
            SET status = $3,
                attempts = attempts + $4,
                last_attempt_at = NOW(),
                error = $5
            WHERE stage = $1 AND key = $2 AND status != 'done'
            "#,
        )
        .bind(stage.as_str())
        .bind(key)
        .bind(status.as_str())
        .bind(attempts as i32)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to mark checkpoint")?;
        Ok(())
    }

    async fn counts(&self, stage: Stage) -> Result<StatusCounts> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS n
            FROM checkpoints
            WHERE stage = $1
            GROUP BY status
            "#,
        )
        .bind(stage.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to count checkpoints")?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status: String = row.get("status");
            let n = row.get::<i64, _>("n") as u64;
            match CheckpointStatus::parse(&status) {
                Some(CheckpointStatus::Pending) => counts.pending = n,
                Some(CheckpointStatus::Done) => counts.done = n,
                Some(CheckpointStatus::FailedRetryable) => counts.failed_retryable = n,
                Some(CheckpointStatus::FailedTerminal) => counts.failed_terminal = n,
                None => tracing::warn!(stage = %stage, status, "unknown checkpoint status"),
            }
        }
        Ok(counts)
    }

    async fn requeue_retryable(&self, stage: Stage) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE checkpoints
            SET status = 'pending', error = NULL
            WHERE stage = $1 AND status = 'failed_retryable'
            "#,
        )
        .bind(stage.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to requeue retryable checkpoints")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl JobStore for PostgresStorage {
    async fn save_scraped(&self, record: &ScrapedJobRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scraped_jobs (url, data, scraped_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (url) DO UPDATE
            SET data = EXCLUDED.data, scraped_at = EXCLUDED.scraped_at
            "#,
        )
        .bind(&record.url)
        .bind(serde_json::to_value(&record.data)?)
        .bind(record.scraped_at)
        .execute(&self.pool)
        .await
        .context("Failed to save scraped job")?;
        Ok(())
    }

    async fn get_scraped(&self, url: &str) -> Result<Option<ScrapedJobRecord>> {
        let row = sqlx::query(
            r#"
            SELECT url, data, scraped_at
            FROM scraped_jobs
            WHERE url = $1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get scraped job")?;

        row.map(|r| {
            Ok(ScrapedJobRecord {
                url: r.get("url"),
                data: serde_json::from_value(r.get("data"))
                    .context("Failed to decode scraped job data")?,
                scraped_at: r.get("scraped_at"),
            })
        })
        .transpose()
    }

    async fn count_scraped(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM scraped_jobs")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count scraped jobs")?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    async fn save_classified(&self, record: &ClassifiedJobRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO classified_jobs (url, document, classified_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (url) DO UPDATE
            SET document = EXCLUDED.document, classified_at = EXCLUDED.classified_at
            "#,
        )
        .bind(&record.url)
        .bind(serde_json::to_value(&record.document)?)
        .bind(record.classified_at)
        .execute(&self.pool)
        .await
        .context("Failed to save classified job")?;
        Ok(())
    }

    async fn get_classified(&self, url: &str) -> Result<Option<ClassifiedJobRecord>> {
        let row = sqlx::query(
            r#"
            SELECT url, document, classified_at
            FROM classified_jobs
            WHERE url = $1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get classified job")?;

        row.map(|r| {
            Ok(ClassifiedJobRecord {
                url: r.get("url"),
                document: serde_json::from_value(r.get("document"))
                    .context("Failed to decode classified job document")?,
                classified_at: r.get("classified_at"),
            })
        })
        .transpose()
    }

    async fn count_classified(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM classified_jobs")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count classified jobs")?;
        Ok(row.get::<i64, _>("n") as u64)
    }
}
