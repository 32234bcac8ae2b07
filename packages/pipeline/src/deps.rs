//! Pipeline dependencies (explicit context object, no process-wide state).
//!
//! Everything a stage needs — stores, gateway clients, limiters — is
//! constructed once per process and passed down, so per-stage configuration
//! stays testable in isolation.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::classify::{GroqClassifier, JobClassifier};
use crate::config::Config;
use crate::fetch::{PageFetcher, ZenRowsFetcher};
use crate::index::{ElasticAuth, ElasticIndex, SearchIndex};
use crate::rate_limit::{ProcLoadSampler, SlidingWindowLimiter};
use crate::storage::{CheckpointStore, JobStore, PostgresStorage, SeedFile};
use groq_client::GroqClient;
use zenrows_client::ZenRowsClient;

/// Dependencies shared by every stage.
pub struct PipelineDeps {
    pub config: Config,

    /// Checkpoints for the search-URL stage (the on-disk seed artifact).
    pub seeds: Arc<dyn CheckpointStore>,
    /// Checkpoints for the database-backed stages.
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub jobs: Arc<dyn JobStore>,

    pub fetcher: Arc<dyn PageFetcher>,
    /// Concrete gateway handle, kept for usage-stats reporting.
    pub zenrows: Option<Arc<ZenRowsFetcher>>,
    pub classifier: Arc<dyn JobClassifier>,
    /// Absent when no search cluster is configured; required by the index
    /// stage only.
    pub search_index: Option<Arc<dyn SearchIndex>>,

    pub fetch_limiter: Arc<SlidingWindowLimiter>,
    pub llm_limiter: Arc<SlidingWindowLimiter>,
    pub index_limiter: Arc<SlidingWindowLimiter>,

    pub cancel: CancellationToken,
}

impl PipelineDeps {
    /// Wire up production dependencies from configuration.
    pub fn from_config(config: Config, pool: PgPool) -> Result<Self> {
        let storage = Arc::new(PostgresStorage::new(pool));
        let seeds = Arc::new(SeedFile::load(&config.seed_file)?);

        let zenrows = Arc::new(ZenRowsFetcher::new(ZenRowsClient::new(
            config.zenrows_api_key.clone(),
        )));
        let classifier = Arc::new(GroqClassifier::new(
            GroqClient::new(config.groq_api_key.clone()),
            config.groq_model.clone(),
        ));

        let search_index: Option<Arc<dyn SearchIndex>> = match &config.es_url {
            Some(es_url) => {
                let auth = if let Some(key) = &config.es_api_key {
                    ElasticAuth::ApiKey(key.clone())
                } else if let (Some(user), Some(password)) = (&config.es_user, &config.es_password)
                {
                    ElasticAuth::Basic {
                        user: user.clone(),
                        password: password.clone(),
                    }
                } else {
                    ElasticAuth::None
                };
                Some(Arc::new(
                    ElasticIndex::new(es_url.clone(), config.es_index.clone(), auth)
                        .context("Failed to create Elasticsearch client")?,
                ))
            }
            None => None,
        };

        let fetch_limiter = Arc::new(
            SlidingWindowLimiter::per_second(config.scrape_tuning.requests_per_sec)
                .with_sampler(Arc::new(ProcLoadSampler), Duration::from_secs(5)),
        );
        let llm_limiter = Arc::new(SlidingWindowLimiter::per_second(
            config.classify_tuning.requests_per_sec,
        ));
        let index_limiter = Arc::new(SlidingWindowLimiter::per_second(
            config.index_tuning.requests_per_sec,
        ));

        Ok(Self {
            config,
            seeds,
            checkpoints: storage.clone(),
            jobs: storage,
            fetcher: zenrows.clone(),
            zenrows: Some(zenrows),
            classifier,
            search_index,
            fetch_limiter,
            llm_limiter,
            index_limiter,
            cancel: CancellationToken::new(),
        })
    }
}
