use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// PIPELINE STAGES
// ============================================================================

/// One phase of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    GenerateUrls,
    ScrapeSearchPages,
    ScrapeJobPages,
    Classify,
    Index,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::GenerateUrls,
        Stage::ScrapeSearchPages,
        Stage::ScrapeJobPages,
        Stage::Classify,
        Stage::Index,
    ];

    /// Stable identifier used as the checkpoint collection key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::GenerateUrls => "generate_urls",
            Stage::ScrapeSearchPages => "scrape_search_pages",
            Stage::ScrapeJobPages => "scrape_job_pages",
            Stage::Classify => "classify",
            Stage::Index => "index",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CHECKPOINTS
// ============================================================================

/// Completion status of one work item within one stage.
///
/// `Done` is permanent: the key is excluded from every future work set.
/// Failures keep "gave up" distinct from "succeeded": `FailedRetryable`
/// items can be re-queued by an operator, `FailedTerminal` items cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Done,
    FailedRetryable,
    FailedTerminal,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::Done => "done",
            CheckpointStatus::FailedRetryable => "failed_retryable",
            CheckpointStatus::FailedTerminal => "failed_terminal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CheckpointStatus::Pending),
            "done" => Some(CheckpointStatus::Done),
            "failed_retryable" => Some(CheckpointStatus::FailedRetryable),
            "failed_terminal" => Some(CheckpointStatus::FailedTerminal),
            _ => None,
        }
    }
}

/// Persisted completion marker for one (stage, key) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub key: String,
    pub status: CheckpointStatus,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl CheckpointRecord {
    pub fn pending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: CheckpointStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
            error: None,
        }
    }
}

/// Per-status counts for one stage's checkpoint collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub done: u64,
    pub failed_retryable: u64,
    pub failed_terminal: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.done + self.failed_retryable + self.failed_terminal
    }
}

// ============================================================================
// SEED FILE ENTRIES
// ============================================================================

/// One entry of the on-disk URL checkpoint artifact.
///
/// `value = true` means the search URL has been fully processed. The field
/// name is part of the artifact format and kept for compatibility with
/// previously generated files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlSeed {
    pub url: String,
    pub value: bool,
}

// ============================================================================
// SCRAPED / CLASSIFIED RECORDS
// ============================================================================

/// Structured extraction of one job posting. Every field is optional:
/// absence is data, not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapedJob {
    pub company_name: Option<String>,
    pub position: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub experience: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    pub description: Option<String>,
    pub remote_policy: Option<String>,
    pub visa: Option<String>,
    pub slogan: Option<String>,
    pub hiring_status: Option<String>,
    pub company_size: Option<String>,
    pub company_location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub industries: Vec<String>,
    pub amount_raised: Option<String>,
    pub founder: Option<String>,
}

impl ScrapedJob {
    /// True when extraction produced no fields at all.
    pub fn is_empty(&self) -> bool {
        self == &ScrapedJob::default()
    }
}

/// A scraped job with its persistence envelope, keyed by source URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedJobRecord {
    pub url: String,
    pub data: ScrapedJob,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapedJobRecord {
    pub fn new(url: impl Into<String>, data: ScrapedJob) -> Self {
        Self {
            url: url.into(),
            data,
            scraped_at: Utc::now(),
        }
    }
}

/// Classification output for one job. The three regions are required; a
/// model response missing any of them is rejected rather than stored
/// half-filled (see [`crate::classify`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedJob {
    pub original_data: serde_json::Value,
    pub classification: serde_json::Value,
    pub prospecting_intel: serde_json::Value,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// A classified job with its persistence envelope, keyed by source URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedJobRecord {
    pub url: String,
    pub document: ClassifiedJob,
    pub classified_at: DateTime<Utc>,
}

impl ClassifiedJobRecord {
    pub fn new(url: impl Into<String>, document: ClassifiedJob) -> Self {
        Self {
            url: url.into(),
            document,
            classified_at: Utc::now(),
        }
    }
}

// ============================================================================
// STAGE RESULTS
// ============================================================================

/// Aggregate outcome of one stage run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageResult {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl StageResult {
    pub fn absorb(&mut self, other: StageResult) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// Read-only snapshot of the whole pipeline, per stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStatus {
    pub stages: HashMap<Stage, StatusCounts>,
    pub scraped_jobs: u64,
    pub classified_jobs: u64,
}

// ============================================================================
// INDEX IDENTITY
// ============================================================================

/// Normalize a company name into a stable search-index document id.
///
/// Lowercased, `&` spelled out, punctuation stripped, whitespace collapsed
/// to underscores. Keying by company name lets jobs aggregate under one
/// document per company.
pub fn normalize_company_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for ch in name.trim().chars() {
        if ch == '&' {
            if !last_was_sep {
                out.push('_');
            }
            out.push_str("and");
            last_was_sep = false;
        } else if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_was_sep = false;
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            if !last_was_sep {
                out.push('_');
            }
            last_was_sep = true;
        }
        // other punctuation is dropped
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Derive a collision-free document id from a job URL (its last non-empty
/// path segment). Fragments the per-company view but never merges distinct
/// companies.
pub fn job_url_slug(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let without_query = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    without_query
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(without_query)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_identifiers_are_stable() {
        assert_eq!(Stage::ScrapeJobPages.as_str(), "scrape_job_pages");
        assert_eq!(Stage::ALL.len(), 5);
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            CheckpointStatus::Pending,
            CheckpointStatus::Done,
            CheckpointStatus::FailedRetryable,
            CheckpointStatus::FailedTerminal,
        ] {
            assert_eq!(CheckpointStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CheckpointStatus::parse("bogus"), None);
    }

    #[test]
    fn empty_scraped_job_detected() {
        assert!(ScrapedJob::default().is_empty());
        let job = ScrapedJob {
            position: Some("Backend Engineer".into()),
            ..Default::default()
        };
        assert!(!job.is_empty());
    }

    #[test]
    fn company_key_normalization() {
        assert_eq!(normalize_company_key("Acme Corp"), "acme_corp");
        assert_eq!(normalize_company_key("  Stripe, Inc. "), "stripe_inc");
        assert_eq!(normalize_company_key("Bolt & Nut"), "bolt_and_nut");
        assert_eq!(normalize_company_key("a.b/c"), "abc");
    }

    #[test]
    fn url_slug_takes_last_path_segment() {
        assert_eq!(
            job_url_slug("https://wellfound.com/jobs/3052088-senior-engineer"),
            "3052088-senior-engineer"
        );
        assert_eq!(
            job_url_slug("https://wellfound.com/jobs/123-x/?utm=1"),
            "123-x"
        );
    }

    #[test]
    fn scraped_job_serde_skips_empty_collections() {
        let job = ScrapedJob {
            company_name: Some("Acme".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&job).unwrap();
        assert!(value.get("skills").is_none());
        assert_eq!(value["company_name"], "Acme");
    }
}
