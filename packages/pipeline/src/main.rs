// Jobscout pipeline CLI

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pipeline_core::types::Stage;
use pipeline_core::{Config, Pipeline, PipelineDeps};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Step {
    /// Run the complete pipeline
    All,
    /// Generate job search URLs only
    GenerateUrls,
    /// Scrape job URLs from search pages only
    ScrapeUrls,
    /// Scrape detailed job data only
    ScrapeJobs,
    /// Classify jobs with the LLM only
    Classify,
    /// Index classified jobs into the search cluster only
    Index,
    /// Report per-stage counts without side effects
    Status,
    /// Re-queue retryable failures (all stages, or --stage to narrow)
    Requeue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StageArg {
    ScrapeUrls,
    ScrapeJobs,
    Classify,
    Index,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::ScrapeUrls => Stage::ScrapeSearchPages,
            StageArg::ScrapeJobs => Stage::ScrapeJobPages,
            StageArg::Classify => Stage::Classify,
            StageArg::Index => Stage::Index,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "jobscout", about = "Job scraping and classification pipeline")]
struct Cli {
    /// Pipeline step to run
    #[arg(long, value_enum, default_value = "all")]
    step: Step,

    /// Narrow --step requeue to one stage
    #[arg(long, value_enum)]
    stage: Option<StageArg>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pipeline_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration; missing credentials abort before any work runs.
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("configuration loaded");

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("database connected");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let deps = PipelineDeps::from_config(config, pool)?;
    let cancel = deps.cancel.clone();

    // Ctrl+C stops dispatching new work; in-flight items finish and their
    // checkpoints are flushed before exit.
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        cancel.cancel();
    });

    let pipeline = Pipeline::new(deps);

    match cli.step {
        Step::All => pipeline.run_all().await?,
        Step::GenerateUrls => {
            pipeline.run_stage(Stage::GenerateUrls).await?;
        }
        Step::ScrapeUrls => {
            pipeline.run_stage(Stage::ScrapeSearchPages).await?;
        }
        Step::ScrapeJobs => {
            pipeline.run_stage(Stage::ScrapeJobPages).await?;
        }
        Step::Classify => {
            pipeline.run_stage(Stage::Classify).await?;
        }
        Step::Index => {
            pipeline.run_stage(Stage::Index).await?;
        }
        Step::Status => {
            let status = pipeline.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Step::Requeue => {
            let requeued = pipeline
                .requeue_retryable(cli.stage.map(Stage::from))
                .await?;
            tracing::info!(requeued, "re-queue complete");
        }
    }

    Ok(())
}
