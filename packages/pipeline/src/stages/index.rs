//! Index stage: fold one classified job into its company document via
//! read-modify-write against the search index.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::IndexKeyStrategy;
use crate::index::{document_id, merge_into_company_document, new_company_document, SearchIndex};
use crate::rate_limit::SlidingWindowLimiter;
use crate::runner::{UnitOfWork, UnitOutcome};
use crate::storage::JobStore;

pub struct IndexUnit {
    search_index: Arc<dyn SearchIndex>,
    limiter: Arc<SlidingWindowLimiter>,
    jobs: Arc<dyn JobStore>,
    strategy: IndexKeyStrategy,
}

impl IndexUnit {
    pub fn new(
        search_index: Arc<dyn SearchIndex>,
        limiter: Arc<SlidingWindowLimiter>,
        jobs: Arc<dyn JobStore>,
        strategy: IndexKeyStrategy,
    ) -> Self {
        Self {
            search_index,
            limiter,
            jobs,
            strategy,
        }
    }
}

#[async_trait]
impl UnitOfWork for IndexUnit {
    async fn process(&self, url: &str) -> UnitOutcome {
        let record = match self.jobs.get_classified(url).await {
            Ok(Some(record)) => record,
            Ok(None) => return UnitOutcome::terminal("classified record missing", 1),
            Err(e) => {
                return UnitOutcome::retryable(format!("failed to load classified job: {e}"), 1);
            }
        };

        let Some(id) = document_id(self.strategy, &record) else {
            // No usable identity under the configured strategy (e.g. the
            // model produced no company name). Recorded as done-with-empty
            // so the record is visible but never retried.
            tracing::warn!(url = %url, "no index identity for classified job");
            return UnitOutcome::DoneEmpty;
        };

        self.limiter.acquire().await;

        let existing = match self.search_index.get_document(&id).await {
            Ok(existing) => existing,
            Err(e) => return UnitOutcome::retryable(format!("index read failed: {e}"), 1),
        };

        let (document, merged) = match existing {
            Some(doc) => (merge_into_company_document(doc, &record), true),
            None => (new_company_document(&record), false),
        };

        if let Err(e) = self.search_index.put_document(&id, &document).await {
            return UnitOutcome::retryable(format!("index write failed: {e}"), 1);
        }

        tracing::debug!(url = %url, id = %id, merged, "job indexed");
        UnitOutcome::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::storage::MemoryStorage;
    use crate::types::{ClassifiedJob, ClassifiedJobRecord};
    use serde_json::json;

    async fn seed_classified(store: &MemoryStorage, url: &str, company: Option<&str>) {
        let mut original = json!({"position": "Engineer"});
        if let Some(name) = company {
            original["company_name"] = json!(name);
        }
        store
            .save_classified(&ClassifiedJobRecord::new(
                url,
                ClassifiedJob {
                    original_data: original,
                    classification: json!({}),
                    prospecting_intel: json!({}),
                    keywords: vec![],
                    summary: None,
                },
            ))
            .await
            .unwrap();
    }

    fn unit(store: Arc<MemoryStorage>, index: Arc<MemoryIndex>) -> IndexUnit {
        IndexUnit::new(
            index,
            Arc::new(SlidingWindowLimiter::per_second(1000)),
            store,
            IndexKeyStrategy::CompanyName,
        )
    }

    #[tokio::test]
    async fn jobs_aggregate_under_one_company() {
        let store = Arc::new(MemoryStorage::new());
        let index = Arc::new(MemoryIndex::new());
        seed_classified(&store, "https://x/jobs/1-a", Some("Acme Robotics")).await;
        seed_classified(&store, "https://x/jobs/2-b", Some("Acme Robotics")).await;

        let unit = unit(store, index.clone());
        assert_eq!(unit.process("https://x/jobs/1-a").await, UnitOutcome::Done);
        assert_eq!(unit.process("https://x/jobs/2-b").await, UnitOutcome::Done);

        assert_eq!(index.count().await.unwrap(), 1);
        let doc = index
            .get_document("acme_robotics")
            .await
            .unwrap()
            .expect("company doc");
        assert_eq!(doc["total_jobs"], 2);
        assert_eq!(doc["jobs"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_company_name_is_done_empty() {
        let store = Arc::new(MemoryStorage::new());
        let index = Arc::new(MemoryIndex::new());
        seed_classified(&store, "https://x/jobs/3-c", None).await;

        let unit = unit(store, index.clone());
        assert_eq!(
            unit.process("https://x/jobs/3-c").await,
            UnitOutcome::DoneEmpty
        );
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn url_slug_strategy_fragments_per_posting() {
        let store = Arc::new(MemoryStorage::new());
        let index = Arc::new(MemoryIndex::new());
        seed_classified(&store, "https://x/jobs/1-a", Some("Acme")).await;
        seed_classified(&store, "https://x/jobs/2-b", Some("Acme")).await;

        let unit = IndexUnit::new(
            index.clone(),
            Arc::new(SlidingWindowLimiter::per_second(1000)),
            store,
            IndexKeyStrategy::UrlSlug,
        );
        unit.process("https://x/jobs/1-a").await;
        unit.process("https://x/jobs/2-b").await;

        assert_eq!(index.count().await.unwrap(), 2);
    }
}
