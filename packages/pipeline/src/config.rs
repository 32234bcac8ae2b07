use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

/// Tuning knobs for one pipeline stage.
///
/// The pool bounds parallelism, the rate limit bounds throughput; the two
/// are independent. Hardware-specific presets from older deployments are
/// expressed here as plain values instead of separate code paths.
#[derive(Debug, Clone, Copy)]
pub struct StageTuning {
    /// Worker pool size for the stage.
    pub concurrency: usize,
    /// Items per batch between progress reports / checkpoint flushes.
    pub batch_size: usize,
    /// Sustained request budget per second against the stage's external API.
    pub requests_per_sec: usize,
}

impl StageTuning {
    fn from_env(prefix: &str, defaults: StageTuning) -> Result<Self> {
        Ok(Self {
            concurrency: env_usize(&format!("{prefix}_CONCURRENCY"), defaults.concurrency)?,
            batch_size: env_usize(&format!("{prefix}_BATCH_SIZE"), defaults.batch_size)?,
            requests_per_sec: env_usize(
                &format!("{prefix}_REQUESTS_PER_SEC"),
                defaults.requests_per_sec,
            )?,
        })
    }
}

/// Identity strategy for company aggregation in the search index.
///
/// `CompanyName` keys documents by the normalized company name so jobs
/// aggregate per company, at the cost of near-duplicate keys when a name is
/// formatted differently across postings. `UrlSlug` keys by the job URL's
/// own slug: collision-free, but one document per posting. The strategy is
/// fixed per deployment; the two must never be mixed within one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKeyStrategy {
    CompanyName,
    UrlSlug,
}

impl IndexKeyStrategy {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "company-name" => Some(IndexKeyStrategy::CompanyName),
            "url-slug" => Some(IndexKeyStrategy::UrlSlug),
            _ => None,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub zenrows_api_key: String,
    pub groq_api_key: String,
    pub groq_model: String,

    /// Elasticsearch endpoint; optional so scrape/classify stages can run
    /// without an index configured. The index stage requires it.
    pub es_url: Option<String>,
    pub es_index: String,
    pub es_api_key: Option<String>,
    pub es_user: Option<String>,
    pub es_password: Option<String>,
    pub index_key_strategy: IndexKeyStrategy,

    /// Roles and locations used to generate search URLs.
    pub roles_file: PathBuf,
    pub locations_file: PathBuf,
    /// On-disk checkpoint artifact for generated search URLs.
    pub seed_file: PathBuf,
    /// Base search URL; role and location are appended as path segments.
    pub search_base_url: String,
    /// Safety bound on pagination within one search URL.
    pub max_search_pages: u32,

    pub scrape_tuning: StageTuning,
    pub classify_tuning: StageTuning,
    pub index_tuning: StageTuning,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Missing required credentials are configuration errors and abort the
    /// run before any work is dispatched.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let index_key_strategy = match env::var("INDEX_KEY_STRATEGY") {
            Ok(raw) => IndexKeyStrategy::parse(&raw).with_context(|| {
                format!("INDEX_KEY_STRATEGY must be `company-name` or `url-slug`, got `{raw}`")
            })?,
            Err(_) => IndexKeyStrategy::CompanyName,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            zenrows_api_key: env::var("ZENROWS_API_KEY").context("ZENROWS_API_KEY must be set")?,
            groq_api_key: env::var("GROQ_API_KEY").context("GROQ_API_KEY must be set")?,
            groq_model: env::var("GROQ_MODEL").unwrap_or_else(|_| "qwen/qwen3-32b".to_string()),

            es_url: env::var("ES_URL").ok(),
            es_index: env::var("ES_INDEX")
                .unwrap_or_else(|_| "jobposters_index".to_string()),
            es_api_key: env::var("ES_API_KEY").ok(),
            es_user: env::var("ES_USER").ok(),
            es_password: env::var("ES_PASSWORD").ok(),
            index_key_strategy,

            roles_file: env::var("ROLES_FILE")
                .unwrap_or_else(|_| "config/job_types.json".to_string())
                .into(),
            locations_file: env::var("LOCATIONS_FILE")
                .unwrap_or_else(|_| "config/locations.json".to_string())
                .into(),
            seed_file: env::var("SEED_FILE")
                .unwrap_or_else(|_| "search_urls.json".to_string())
                .into(),
            search_base_url: env::var("SEARCH_BASE_URL")
                .unwrap_or_else(|_| "https://wellfound.com/role/l".to_string()),
            max_search_pages: env::var("MAX_SEARCH_PAGES")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("MAX_SEARCH_PAGES must be a number")?,

            scrape_tuning: StageTuning::from_env(
                "SCRAPE",
                StageTuning {
                    concurrency: 8,
                    batch_size: 100,
                    requests_per_sec: 5,
                },
            )?,
            classify_tuning: StageTuning::from_env(
                "CLASSIFY",
                StageTuning {
                    concurrency: 5,
                    batch_size: 50,
                    requests_per_sec: 2,
                },
            )?,
            index_tuning: StageTuning::from_env(
                "INDEX",
                StageTuning {
                    concurrency: 4,
                    batch_size: 100,
                    requests_per_sec: 10,
                },
            )?,
        })
    }
}

fn env_usize(name: &str, default: usize) -> Result<usize> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be a number, got `{raw}`")),
        Err(_) => Ok(default),
    }
}
