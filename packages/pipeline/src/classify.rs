//! LLM classification of scraped jobs.
//!
//! The model is asked for a single JSON object with three required regions
//! (`original_data`, `classification`, `prospecting_intel`). Responses are
//! parsed strictly: a direct parse, then one recovery pass that takes the
//! largest `{...}` substring (models love to wrap JSON in prose). A response
//! still missing a required region is a shape failure, never a partial
//! record. Network failures retry with backoff; parse failures do not —
//! a malformed response is assumed deterministic for the same input and is
//! instead re-submitted by a later pipeline pass.

use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

use crate::types::{ClassifiedJob, ScrapedJob};
use groq_client::{ChatRequest, GroqClient, Message};

/// Attempts per classification, including the first.
pub const MAX_CLASSIFY_ATTEMPTS: u32 = 3;
/// Backoff cap between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Classification failure taxonomy.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The model endpoint failed after every retry; transient.
    #[error("model call failed: {0}")]
    Api(String),

    /// No JSON object could be parsed out of the model output.
    #[error("no parseable JSON object in model output: {preview}")]
    Parse { preview: String },

    /// The parsed object is missing a required region.
    #[error("classification missing required region `{0}`")]
    Shape(&'static str),
}

/// Classification seam (trait for mocking the model).
#[async_trait]
pub trait JobClassifier: Send + Sync {
    async fn classify(&self, url: &str, job: &ScrapedJob) -> Result<ClassifiedJob, ClassifyError>;
}

/// Groq-backed classifier.
pub struct GroqClassifier {
    client: GroqClient,
    model: String,
}

impl GroqClassifier {
    pub fn new(client: GroqClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl JobClassifier for GroqClassifier {
    async fn classify(&self, url: &str, job: &ScrapedJob) -> Result<ClassifiedJob, ClassifyError> {
        let prompt = build_prompt(job);
        let request = ChatRequest::new(&self.model)
            .message(Message::system(
                "You are a helpful assistant that returns only valid JSON objects \
                 for job post classification.",
            ))
            .message(Message::user(prompt))
            .temperature(0.1);

        // Retry wraps the network call only. Parsing a bad response again
        // would produce the same bad response.
        let mut last_error = String::new();
        for attempt in 1..=MAX_CLASSIFY_ATTEMPTS {
            match self.client.chat_completion(request.clone()).await {
                Ok(response) => {
                    tracing::debug!(url = %url, attempt, "model responded");
                    return parse_classified(&response.content);
                }
                Err(error) => {
                    tracing::warn!(url = %url, attempt, error = %error, "model call failed");
                    last_error = error.to_string();
                    if attempt < MAX_CLASSIFY_ATTEMPTS {
                        let delay = Duration::from_secs(1 << (attempt - 1)).min(MAX_BACKOFF);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(ClassifyError::Api(last_error))
    }
}

/// Parse a model response into a validated [`ClassifiedJob`].
///
/// Direct parse first; on failure, recover the largest `{...}` substring
/// and parse that. The required regions are validated in both paths.
pub fn parse_classified(raw: &str) -> Result<ClassifiedJob, ClassifyError> {
    let trimmed = raw.trim();

    let value: serde_json::Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(_) => {
            let recovered = largest_json_object(trimmed).ok_or_else(|| ClassifyError::Parse {
                preview: preview(trimmed),
            })?;
            serde_json::from_str(&recovered).map_err(|_| ClassifyError::Parse {
                preview: preview(trimmed),
            })?
        }
    };

    validate_shape(value)
}

fn validate_shape(value: serde_json::Value) -> Result<ClassifiedJob, ClassifyError> {
    for region in ["original_data", "classification", "prospecting_intel"] {
        if !value.get(region).is_some_and(|v| v.is_object()) {
            return Err(ClassifyError::Shape(region));
        }
    }
    serde_json::from_value(value).map_err(|e| ClassifyError::Parse {
        preview: e.to_string(),
    })
}

/// Largest `{...}` substring of the response (greedy match across lines).
fn largest_json_object(raw: &str) -> Option<String> {
    let re = Regex::new(r"(?s)\{.*\}").ok()?;
    re.find(raw).map(|m| m.as_str().to_string())
}

fn preview(raw: &str) -> String {
    raw.chars().take(200).collect()
}

fn build_prompt(job: &ScrapedJob) -> String {
    let job_json = serde_json::to_string_pretty(job).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are a job classification assistant. Analyze the job post data and return ONLY a valid JSON object with this structure:

{{
  "original_data": {{
    "company_name": "from input",
    "position": "from input",
    "location": "from input",
    "price": "salary from input",
    "job_description": "from input (first 500 chars)",
    "company_industries": "from input array",
    "company_size": "from input",
    "amount_raised": "from input",
    "hiring_stat": "from input",
    "skills": "from input array",
    "remote_work_pol": "from input",
    "visa": "from input"
  }},
  "classification": {{
    "primary_categories": ["category1", "category2"],
    "focus_areas": {{"technical": [], "business": []}},
    "company_stage": "inferred from funding data",
    "hiring_urgency": "Low/Medium/High",
    "investment_signals": {{"funding_status": "", "growth_indicators": [], "market_position": ""}},
    "role_analysis": {{"seniority_level": "", "department": "", "remote_friendly": "Yes/No/Hybrid"}}
  }},
  "prospecting_intel": {{
    "company_domain": "inferred website domain",
    "key_technologies": [],
    "hiring_volume": "",
    "contact_potential": "High/Medium/Low",
    "investment_readiness": ""
  }},
  "keywords": ["keyword1", "keyword2"],
  "summary": "one sentence on why this company is relevant for prospecting"
}}

GUIDELINES:
- Primary categories should be specific (e.g., "AI/ML Platform", "Developer Tools", "Fintech")
- Use the industries array to inform categorization
- Consider company size, funding and hiring status for growth signals
- Infer the company domain as companyname.com (lowercase, no spaces)

JOB POST DATA:
{job_json}

JSON OUTPUT:"#
    )
}
