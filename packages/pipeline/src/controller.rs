//! Pipeline controller: sequences the five stages, short-circuits stages
//! whose output already exists, and exposes run-all / run-one / status.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::deps::PipelineDeps;
use crate::runner::{StageRunner, StageRunnerConfig, UnitOfWork};
use crate::stages::{generate, ClassifyUnit, IndexUnit, JobPageUnit, SearchPageUnit};
use crate::storage::CheckpointStore;
use crate::types::{PipelineStatus, Stage, StageResult};

pub struct Pipeline {
    deps: PipelineDeps,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }

    /// Run every stage in order.
    ///
    /// A stage whose output already exists is skipped. Per-item failures
    /// inside a stage are recorded in its checkpoints and do not stop the
    /// sequence; only fatal errors (missing configuration, unreachable
    /// storage) abort it.
    pub async fn run_all(&self) -> Result<()> {
        for stage in Stage::ALL {
            if self.deps.cancel.is_cancelled() {
                info!("pipeline cancelled");
                break;
            }
            if self.should_skip(stage).await? {
                info!(stage = %stage, "output already exists, skipping");
                continue;
            }
            let result = self.run_stage(stage).await?;
            info!(
                stage = %stage,
                processed = result.processed,
                succeeded = result.succeeded,
                failed = result.failed,
                "stage complete"
            );
        }

        self.log_status().await
    }

    /// Run exactly one stage, regardless of its neighbors' state.
    pub async fn run_stage(&self, stage: Stage) -> Result<StageResult> {
        match stage {
            Stage::GenerateUrls => {
                let registered = generate::run(
                    &self.deps.config.roles_file,
                    &self.deps.config.locations_file,
                    &self.deps.config.search_base_url,
                    &self.deps.seeds,
                )
                .await?;
                Ok(StageResult {
                    processed: registered,
                    succeeded: registered,
                    failed: 0,
                })
            }
            Stage::ScrapeSearchPages => {
                let unit: Arc<dyn UnitOfWork> = Arc::new(SearchPageUnit::new(
                    self.deps.fetcher.clone(),
                    self.deps.fetch_limiter.clone(),
                    self.deps.checkpoints.clone(),
                    self.deps.config.max_search_pages,
                ));
                self.run_with(stage, &self.deps.seeds, unit, self.deps.config.scrape_tuning)
                    .await
            }
            Stage::ScrapeJobPages => {
                let unit: Arc<dyn UnitOfWork> = Arc::new(JobPageUnit::new(
                    self.deps.fetcher.clone(),
                    self.deps.fetch_limiter.clone(),
                    self.deps.jobs.clone(),
                    self.deps.checkpoints.clone(),
                ));
                self.run_with(
                    stage,
                    &self.deps.checkpoints,
                    unit,
                    self.deps.config.scrape_tuning,
                )
                .await
            }
            Stage::Classify => {
                let unit: Arc<dyn UnitOfWork> = Arc::new(ClassifyUnit::new(
                    self.deps.classifier.clone(),
                    self.deps.llm_limiter.clone(),
                    self.deps.jobs.clone(),
                    self.deps.checkpoints.clone(),
                ));
                self.run_with(
                    stage,
                    &self.deps.checkpoints,
                    unit,
                    self.deps.config.classify_tuning,
                )
                .await
            }
            Stage::Index => {
                let search_index = self
                    .deps
                    .search_index
                    .as_ref()
                    .context("ES_URL must be set to run the index stage")?
                    .clone();
                let unit: Arc<dyn UnitOfWork> = Arc::new(IndexUnit::new(
                    search_index,
                    self.deps.index_limiter.clone(),
                    self.deps.jobs.clone(),
                    self.deps.config.index_key_strategy,
                ));
                self.run_with(
                    stage,
                    &self.deps.checkpoints,
                    unit,
                    self.deps.config.index_tuning,
                )
                .await
            }
        }
    }

    /// Read-only counts across every stage collection.
    pub async fn status(&self) -> Result<PipelineStatus> {
        let mut status = PipelineStatus::default();

        status.stages.insert(
            Stage::ScrapeSearchPages,
            self.deps.seeds.counts(Stage::ScrapeSearchPages).await?,
        );
        for stage in [Stage::ScrapeJobPages, Stage::Classify, Stage::Index] {
            status
                .stages
                .insert(stage, self.deps.checkpoints.counts(stage).await?);
        }
        status.scraped_jobs = self.deps.jobs.count_scraped().await?;
        status.classified_jobs = self.deps.jobs.count_classified().await?;
        Ok(status)
    }

    /// Move `FailedRetryable` items back to `Pending` for one stage (or,
    /// with `None`, every stage). Genuinely completed and terminally
    /// failed items are untouched.
    pub async fn requeue_retryable(&self, stage: Option<Stage>) -> Result<u64> {
        let stages = match stage {
            Some(stage) => vec![stage],
            None => vec![
                Stage::ScrapeSearchPages,
                Stage::ScrapeJobPages,
                Stage::Classify,
                Stage::Index,
            ],
        };

        let mut requeued = 0;
        for stage in stages {
            let store = match stage {
                Stage::GenerateUrls | Stage::ScrapeSearchPages => &self.deps.seeds,
                _ => &self.deps.checkpoints,
            };
            let n = store.requeue_retryable(stage).await?;
            if n > 0 {
                info!(stage = %stage, requeued = n, "re-queued retryable failures");
            }
            requeued += n;
        }
        Ok(requeued)
    }

    async fn run_with(
        &self,
        stage: Stage,
        checkpoints: &Arc<dyn CheckpointStore>,
        unit: Arc<dyn UnitOfWork>,
        tuning: crate::config::StageTuning,
    ) -> Result<StageResult> {
        let runner = StageRunner::new(
            checkpoints.clone(),
            StageRunnerConfig {
                concurrency: tuning.concurrency,
                batch_size: tuning.batch_size,
            },
            self.deps.cancel.clone(),
        );
        runner.run(stage, unit).await
    }

    async fn should_skip(&self, stage: Stage) -> Result<bool> {
        match stage {
            // The seed artifact is this stage's output: once it has
            // entries, generation is complete.
            Stage::GenerateUrls => {
                Ok(self.deps.seeds.counts(Stage::GenerateUrls).await?.total() > 0)
            }
            Stage::ScrapeSearchPages => {
                Ok(self.deps.seeds.counts(stage).await?.pending == 0)
            }
            Stage::ScrapeJobPages | Stage::Classify | Stage::Index => {
                Ok(self.deps.checkpoints.counts(stage).await?.pending == 0)
            }
        }
    }

    async fn log_status(&self) -> Result<()> {
        let status = self.status().await?;
        info!("pipeline status:");
        for stage in [Stage::ScrapeSearchPages, Stage::ScrapeJobPages, Stage::Classify, Stage::Index]
        {
            if let Some(counts) = status.stages.get(&stage) {
                info!(
                    stage = %stage,
                    pending = counts.pending,
                    done = counts.done,
                    failed_retryable = counts.failed_retryable,
                    failed_terminal = counts.failed_terminal,
                    "stage counts"
                );
            }
        }
        info!(
            scraped_jobs = status.scraped_jobs,
            classified_jobs = status.classified_jobs,
            "record counts"
        );
        if let Some(zenrows) = &self.deps.zenrows {
            let stats = zenrows.stats();
            info!(
                requests = stats.requests,
                successes = stats.successes,
                failures = stats.failures,
                success_rate = format!("{:.1}%", stats.success_rate()),
                "fetch gateway stats"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifyError, JobClassifier};
    use crate::config::{Config, IndexKeyStrategy, StageTuning};
    use crate::fetch::{FetchError, FetchProfile, PageFetcher};
    use crate::index::{MemoryIndex, SearchIndex};
    use crate::rate_limit::SlidingWindowLimiter;
    use crate::storage::{JobStore, MemoryStorage, SeedFile};
    use crate::types::{ClassifiedJob, ScrapedJob};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    /// A small job board: one search URL with two postings.
    struct FakeBoard;

    #[async_trait]
    impl PageFetcher for FakeBoard {
        async fn fetch(&self, url: &str, _profile: &FetchProfile) -> Result<String, FetchError> {
            if url.contains("?page=") {
                return Ok(r#"<h4 class="text-dark-a">0 results total</h4>"#.to_string());
            }
            if url.contains("/role/l/") {
                return Ok(r#"
                    <a class="mr-2 text-brand-burgandy" href="/jobs/1-rust-engineer">a</a>
                    <a class="mr-2 text-brand-burgandy" href="/jobs/2-data-engineer">b</a>
                "#
                .to_string());
            }
            let company = if url.contains("1-rust") { "Acme" } else { "Globex" };
            Ok(format!(
                r#"<div data-test="JobListing">
                    <span class="text-sm font-semibold text-black">{company}</span>
                    <h1 class="inline text-xl font-semibold text-black">Engineer</h1>
                </div>"#
            ))
        }
    }

    struct FakeModel;

    #[async_trait]
    impl JobClassifier for FakeModel {
        async fn classify(
            &self,
            _url: &str,
            job: &ScrapedJob,
        ) -> Result<ClassifiedJob, ClassifyError> {
            Ok(ClassifiedJob {
                original_data: json!({"company_name": job.company_name, "position": job.position}),
                classification: json!({"role_analysis": {"department": "Engineering"}}),
                prospecting_intel: json!({"company_domain": "example.com"}),
                keywords: vec!["engineering".into()],
                summary: Some("relevant".into()),
            })
        }
    }

    fn test_config(dir: &std::path::Path) -> Config {
        let tuning = StageTuning {
            concurrency: 2,
            batch_size: 10,
            requests_per_sec: 1000,
        };
        Config {
            database_url: "postgres://unused".into(),
            zenrows_api_key: "test".into(),
            groq_api_key: "test".into(),
            groq_model: "test-model".into(),
            es_url: None,
            es_index: "test_index".into(),
            es_api_key: None,
            es_user: None,
            es_password: None,
            index_key_strategy: IndexKeyStrategy::CompanyName,
            roles_file: dir.join("roles.json"),
            locations_file: dir.join("locations.json"),
            seed_file: dir.join("urls.json"),
            search_base_url: "https://wellfound.com/role/l".into(),
            max_search_pages: 5,
            scrape_tuning: tuning,
            classify_tuning: tuning,
            index_tuning: tuning,
        }
    }

    fn test_pipeline(dir: &std::path::Path) -> (Pipeline, Arc<MemoryStorage>, Arc<MemoryIndex>) {
        std::fs::write(dir.join("roles.json"), r#"[{"role": "rust-developer"}]"#).unwrap();
        std::fs::write(
            dir.join("locations.json"),
            r#"{"countries": [{"name": "california"}]}"#,
        )
        .unwrap();

        let storage = Arc::new(MemoryStorage::new());
        let index = Arc::new(MemoryIndex::new());
        let config = test_config(dir);
        let seeds = Arc::new(SeedFile::load(&config.seed_file).unwrap());

        let deps = PipelineDeps {
            config,
            seeds,
            checkpoints: storage.clone(),
            jobs: storage.clone(),
            fetcher: Arc::new(FakeBoard),
            zenrows: None,
            classifier: Arc::new(FakeModel),
            search_index: Some(index.clone() as Arc<dyn SearchIndex>),
            fetch_limiter: Arc::new(SlidingWindowLimiter::per_second(1000)),
            llm_limiter: Arc::new(SlidingWindowLimiter::per_second(1000)),
            index_limiter: Arc::new(SlidingWindowLimiter::per_second(1000)),
            cancel: CancellationToken::new(),
        };
        (Pipeline::new(deps), storage, index)
    }

    #[tokio::test]
    async fn run_all_flows_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, storage, index) = test_pipeline(dir.path());

        pipeline.run_all().await.unwrap();

        // Two postings scraped, classified, and aggregated per company.
        assert_eq!(storage.count_scraped().await.unwrap(), 2);
        assert_eq!(storage.count_classified().await.unwrap(), 2);
        assert_eq!(index.count().await.unwrap(), 2);
        assert!(index.get_document("acme").await.unwrap().is_some());
        assert!(index.get_document("globex").await.unwrap().is_some());

        let status = pipeline.status().await.unwrap();
        let search = &status.stages[&Stage::ScrapeSearchPages];
        assert_eq!(search.done, 1);
        assert_eq!(search.pending, 0);
        let jobs = &status.stages[&Stage::ScrapeJobPages];
        assert_eq!(jobs.done, 2);
    }

    #[tokio::test]
    async fn second_run_skips_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _storage, index) = test_pipeline(dir.path());

        pipeline.run_all().await.unwrap();
        let first_docs = index.count().await.unwrap();

        // Nothing pending anywhere: the second run must change nothing.
        pipeline.run_all().await.unwrap();
        assert_eq!(index.count().await.unwrap(), first_docs);

        let doc = index.get_document("acme").await.unwrap().unwrap();
        assert_eq!(doc["total_jobs"], 1);
    }

    #[tokio::test]
    async fn run_one_stage_only_touches_that_stage() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, storage, _index) = test_pipeline(dir.path());

        let result = pipeline.run_stage(Stage::GenerateUrls).await.unwrap();
        assert_eq!(result.processed, 1);

        // Only URL generation ran; nothing was scraped.
        assert_eq!(storage.count_scraped().await.unwrap(), 0);

        let result = pipeline.run_stage(Stage::ScrapeSearchPages).await.unwrap();
        assert_eq!(result.processed, 1);
        assert_eq!(
            storage.counts(Stage::ScrapeJobPages).await.unwrap().pending,
            2
        );
    }

    #[tokio::test]
    async fn requeue_restores_only_retryable_failures() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, storage, _index) = test_pipeline(dir.path());

        storage
            .register(
                Stage::Classify,
                &["https://x/jobs/1-a".to_string(), "https://x/jobs/2-b".to_string()],
            )
            .await
            .unwrap();
        storage
            .mark(
                Stage::Classify,
                "https://x/jobs/1-a",
                crate::types::CheckpointStatus::FailedRetryable,
                3,
                Some("rate limited"),
            )
            .await
            .unwrap();
        storage
            .mark(
                Stage::Classify,
                "https://x/jobs/2-b",
                crate::types::CheckpointStatus::FailedTerminal,
                1,
                Some("gone"),
            )
            .await
            .unwrap();

        let requeued = pipeline.requeue_retryable(Some(Stage::Classify)).await.unwrap();
        assert_eq!(requeued, 1);

        let counts = storage.counts(Stage::Classify).await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.failed_terminal, 1);
    }

    #[tokio::test]
    async fn index_stage_without_cluster_is_a_fatal_error() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, _storage, _index) = test_pipeline(dir.path());
        pipeline.deps.search_index = None;

        let error = pipeline.run_stage(Stage::Index).await.unwrap_err();
        assert!(error.to_string().contains("ES_URL"));
    }
}
