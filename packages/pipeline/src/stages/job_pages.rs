//! Job-page stage: fetch one job detail page, extract the posting, persist
//! it, and queue it for classification.

use async_trait::async_trait;
use std::sync::Arc;

use crate::extract::extract_job;
use crate::fetch::{fetch_with_retry, FetchError, FetchProfile, PageFetcher};
use crate::rate_limit::SlidingWindowLimiter;
use crate::runner::{UnitOfWork, UnitOutcome};
use crate::storage::{CheckpointStore, JobStore};
use crate::types::{ScrapedJobRecord, Stage};

pub struct JobPageUnit {
    fetcher: Arc<dyn PageFetcher>,
    limiter: Arc<SlidingWindowLimiter>,
    jobs: Arc<dyn JobStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    profile: FetchProfile,
}

impl JobPageUnit {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        limiter: Arc<SlidingWindowLimiter>,
        jobs: Arc<dyn JobStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            jobs,
            checkpoints,
            profile: FetchProfile::job_detail(),
        }
    }
}

#[async_trait]
impl UnitOfWork for JobPageUnit {
    async fn process(&self, url: &str) -> UnitOutcome {
        let outcome =
            fetch_with_retry(self.fetcher.as_ref(), &self.limiter, url, &self.profile).await;

        let html = match outcome.result {
            Ok(html) => html,
            // A posting that has been taken down will never come back.
            Err(FetchError::NotFound) => {
                return UnitOutcome::terminal("job page not found", outcome.attempts);
            }
            Err(FetchError::ZeroResults) => return UnitOutcome::DoneEmpty,
            Err(error) => {
                return UnitOutcome::retryable(error.to_string(), outcome.attempts);
            }
        };

        let Some(data) = extract_job(&html) else {
            // The page rendered without its listing container — usually an
            // interstitial the gateway failed to clear. Worth re-queuing.
            return UnitOutcome::retryable("job listing container missing", outcome.attempts);
        };

        let record = ScrapedJobRecord::new(url, data);
        if let Err(e) = self.jobs.save_scraped(&record).await {
            return UnitOutcome::retryable(format!("failed to save scraped job: {e}"), outcome.attempts);
        }
        if let Err(e) = self
            .checkpoints
            .register(Stage::Classify, std::slice::from_ref(&record.url))
            .await
        {
            return UnitOutcome::retryable(
                format!("failed to queue for classification: {e}"),
                outcome.attempts,
            );
        }

        tracing::debug!(url = %url, "job page scraped");
        UnitOutcome::Done
    }
}
