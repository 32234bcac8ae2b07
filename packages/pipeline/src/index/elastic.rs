//! Thin Elasticsearch document client.
//!
//! Only the operations the indexing stage needs: get-by-id, index-by-id,
//! count, ping. Mapping design and cluster administration are out of scope.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::SearchIndex;

/// Authentication modes for the cluster.
#[derive(Debug, Clone)]
pub enum ElasticAuth {
    ApiKey(String),
    Basic { user: String, password: String },
    None,
}

pub struct ElasticIndex {
    client: reqwest::Client,
    base_url: String,
    index: String,
    auth: ElasticAuth,
}

impl ElasticIndex {
    pub fn new(base_url: impl Into<String>, index: impl Into<String>, auth: ElasticAuth) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create Elasticsearch HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: index.into(),
            auth,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            ElasticAuth::ApiKey(key) => builder.header("Authorization", format!("ApiKey {key}")),
            ElasticAuth::Basic { user, password } => builder.basic_auth(user, Some(password)),
            ElasticAuth::None => builder,
        }
    }

    fn doc_url(&self, id: &str) -> String {
        format!(
            "{}/{}/_doc/{}",
            self.base_url,
            self.index,
            urlencoding::encode(id)
        )
    }

    /// Cluster reachability check.
    pub async fn ping(&self) -> Result<bool> {
        let response = self
            .request(self.client.get(&self.base_url))
            .send()
            .await
            .context("Elasticsearch ping failed")?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl SearchIndex for ElasticIndex {
    async fn get_document(&self, id: &str) -> Result<Option<Value>> {
        let response = self
            .request(self.client.get(self.doc_url(id)))
            .send()
            .await
            .context("Elasticsearch get failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Elasticsearch get error ({status}): {body}"));
        }

        let envelope: Value = response
            .json()
            .await
            .context("Failed to parse Elasticsearch get response")?;
        Ok(envelope.get("_source").cloned())
    }

    async fn put_document(&self, id: &str, document: &Value) -> Result<()> {
        let response = self
            .request(self.client.put(self.doc_url(id)).json(document))
            .send()
            .await
            .context("Elasticsearch index failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Elasticsearch index error ({status}): {body}"));
        }
        tracing::debug!(index = %self.index, id, "indexed document");
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let url = format!("{}/{}/_count", self.base_url, self.index);
        let response = self
            .request(self.client.get(url))
            .send()
            .await
            .context("Elasticsearch count failed")?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(anyhow!("Elasticsearch count error ({status})"));
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse Elasticsearch count response")?;
        Ok(body.get("count").and_then(Value::as_u64).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_url_encodes_ids() {
        let index = ElasticIndex::new(
            "https://es.example.com:9200/",
            "jobposters_index",
            ElasticAuth::None,
        )
        .unwrap();
        assert_eq!(
            index.doc_url("acme_robotics"),
            "https://es.example.com:9200/jobposters_index/_doc/acme_robotics"
        );
        assert_eq!(
            index.doc_url("a/b c"),
            "https://es.example.com:9200/jobposters_index/_doc/a%2Fb%20c"
        );
    }
}
