//! Search-index seam and company-document aggregation.
//!
//! The index holds one denormalized document per company (or per job URL,
//! depending on the configured key strategy), with a `jobs` array that
//! grows by read-modify-write as postings are classified. Last-write-wins
//! on concurrent updates is acceptable.

pub mod elastic;
pub mod memory;

pub use elastic::{ElasticAuth, ElasticIndex};
pub use memory::MemoryIndex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::config::IndexKeyStrategy;
use crate::types::{job_url_slug, normalize_company_key, ClassifiedJobRecord};

/// Document-level operations the indexing stage needs.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Fetch a document by id; `None` when it does not exist.
    async fn get_document(&self, id: &str) -> Result<Option<Value>>;

    /// Create or fully replace a document.
    async fn put_document(&self, id: &str, document: &Value) -> Result<()>;

    /// Number of documents in the index.
    async fn count(&self) -> Result<u64>;
}

/// Derive the index document id for a classified job, per strategy.
/// `None` when the strategy needs a company name the record lacks.
pub fn document_id(strategy: IndexKeyStrategy, record: &ClassifiedJobRecord) -> Option<String> {
    match strategy {
        IndexKeyStrategy::CompanyName => {
            let name = record.document.original_data.get("company_name")?.as_str()?;
            let key = normalize_company_key(name);
            (!key.is_empty()).then_some(key)
        }
        IndexKeyStrategy::UrlSlug => Some(job_url_slug(&record.url)),
    }
}

/// The per-job entry appended to a company document's `jobs` array.
fn job_entry(record: &ClassifiedJobRecord) -> Value {
    let original = &record.document.original_data;
    let role = record
        .document
        .classification
        .get("role_analysis")
        .cloned()
        .unwrap_or_else(|| json!({}));

    json!({
        "position": original.get("position"),
        "location": original.get("location"),
        "salary": original.get("price"),
        "department": role.get("department"),
        "seniority": role.get("seniority_level"),
        "remote_friendly": role.get("remote_friendly"),
        "skills": original.get("skills").cloned().unwrap_or_else(|| json!([])),
        "source_url": record.url.clone(),
        "classification_date": record.classified_at.timestamp(),
    })
}

/// Build a fresh company document from the first classified job.
pub fn new_company_document(record: &ClassifiedJobRecord) -> Value {
    let doc = &record.document;
    let original = &doc.original_data;
    let classification = &doc.classification;
    let intel = &doc.prospecting_intel;
    let now = Utc::now().timestamp();

    json!({
        "company": {
            "name": original.get("company_name"),
            "domain": intel.get("company_domain"),
            "industries": original.get("company_industries").cloned().unwrap_or_else(|| json!([])),
            "size": original.get("company_size"),
            "funding": original.get("amount_raised"),
            "hiring_status": original.get("hiring_stat"),
        },
        "classification": {
            "categories": classification.get("primary_categories").cloned().unwrap_or_else(|| json!([])),
            "focus_areas": classification.get("focus_areas").cloned().unwrap_or_else(|| json!({})),
            "company_stage": classification.get("company_stage"),
            "hiring_urgency": classification.get("hiring_urgency"),
        },
        "prospecting": {
            "investment_readiness": intel.get("investment_readiness"),
            "key_technologies": intel.get("key_technologies").cloned().unwrap_or_else(|| json!([])),
            "contact_potential": intel.get("contact_potential"),
            "hiring_volume": intel.get("hiring_volume"),
        },
        "jobs": [job_entry(record)],
        "total_jobs": 1,
        "keywords": doc.keywords.clone(),
        "summary": doc.summary.clone(),
        "created_at": now,
        "last_updated": now,
    })
}

/// Merge one more classified job into an existing company document.
pub fn merge_into_company_document(mut existing: Value, record: &ClassifiedJobRecord) -> Value {
    let entry = job_entry(record);
    let total = if let Some(jobs) = existing.get_mut("jobs").and_then(Value::as_array_mut) {
        jobs.push(entry);
        jobs.len()
    } else {
        existing["jobs"] = json!([entry]);
        1
    };
    existing["total_jobs"] = json!(total);
    existing["latest_classification"] = serde_json::to_value(&record.document)
        .unwrap_or_else(|_| json!({}));
    existing["last_updated"] = json!(Utc::now().timestamp());
    existing
}
