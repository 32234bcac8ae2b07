//! Classification stage: run one scraped job through the model and persist
//! the validated result.

use async_trait::async_trait;
use std::sync::Arc;

use crate::classify::{ClassifyError, JobClassifier, MAX_CLASSIFY_ATTEMPTS};
use crate::rate_limit::SlidingWindowLimiter;
use crate::runner::{UnitOfWork, UnitOutcome};
use crate::storage::{CheckpointStore, JobStore};
use crate::types::{ClassifiedJobRecord, Stage};

pub struct ClassifyUnit {
    classifier: Arc<dyn JobClassifier>,
    limiter: Arc<SlidingWindowLimiter>,
    jobs: Arc<dyn JobStore>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl ClassifyUnit {
    pub fn new(
        classifier: Arc<dyn JobClassifier>,
        limiter: Arc<SlidingWindowLimiter>,
        jobs: Arc<dyn JobStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            classifier,
            limiter,
            jobs,
            checkpoints,
        }
    }
}

#[async_trait]
impl UnitOfWork for ClassifyUnit {
    async fn process(&self, url: &str) -> UnitOutcome {
        let record = match self.jobs.get_scraped(url).await {
            Ok(Some(record)) => record,
            // A classify checkpoint without its scraped record means the
            // upstream write was lost; nothing here will fix that.
            Ok(None) => return UnitOutcome::terminal("scraped record missing", 1),
            Err(e) => {
                return UnitOutcome::retryable(format!("failed to load scraped job: {e}"), 1);
            }
        };

        self.limiter.acquire().await;

        match self.classifier.classify(url, &record.data).await {
            Ok(document) => {
                let classified = ClassifiedJobRecord::new(url, document);
                if let Err(e) = self.jobs.save_classified(&classified).await {
                    return UnitOutcome::retryable(format!("failed to save classification: {e}"), 1);
                }
                if let Err(e) = self
                    .checkpoints
                    .register(Stage::Index, std::slice::from_ref(&classified.url))
                    .await
                {
                    return UnitOutcome::retryable(
                        format!("failed to queue for indexing: {e}"),
                        1,
                    );
                }
                tracing::debug!(url = %url, "job classified");
                UnitOutcome::Done
            }
            Err(ClassifyError::Api(reason)) => {
                UnitOutcome::retryable(reason, MAX_CLASSIFY_ATTEMPTS)
            }
            // Malformed output is deterministic for a given input; the
            // checkpoint stays retryable so a later pass (possibly with a
            // different model) can re-submit, but this pass moves on.
            Err(error @ (ClassifyError::Parse { .. } | ClassifyError::Shape(_))) => {
                UnitOutcome::retryable(error.to_string(), 1)
            }
        }
    }
}
