// Jobscout - job-posting prospecting pipeline
//
// A resumable, checkpoint-driven batch pipeline: generate search URLs,
// scrape search pages for job links, scrape job detail pages, classify
// each job with an LLM, and index the results for prospecting.
//
// Every stage loads its remaining work set from persistent checkpoints,
// fans out to a bounded worker pool behind a rate limiter, and records a
// terminal status per item, so a killed run picks up where it left off.

pub mod classify;
pub mod config;
pub mod controller;
pub mod deps;
pub mod extract;
pub mod fetch;
pub mod index;
pub mod rate_limit;
pub mod runner;
pub mod stages;
pub mod storage;
pub mod types;

pub use config::Config;
pub use controller::Pipeline;
pub use deps::PipelineDeps;
pub use types::{CheckpointRecord, CheckpointStatus, Stage, StageResult};
