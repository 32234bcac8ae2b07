//! Pure ZenRows REST API client.
//!
//! A minimal client for the ZenRows scraping gateway. ZenRows handles
//! anti-bot measures, captcha solving, and proxy rotation on its side;
//! this client only shapes requests and classifies responses.
//!
//! # Example
//!
//! ```rust,ignore
//! use zenrows_client::{RequestOptions, ZenRowsClient};
//!
//! let client = ZenRowsClient::from_env()?;
//! let page = client.fetch("https://example.com/jobs", &RequestOptions::default()).await?;
//! println!("{} bytes", page.body.len());
//! ```

pub mod error;
pub mod types;

pub use error::{Result, ZenRowsError};
pub use types::{ClientStats, GatewayResponse, RequestOptions};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const BASE_URL: &str = "https://api.zenrows.com/v1/";

pub struct ZenRowsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl ZenRowsClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: BASE_URL.to_string(),
            requests: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Create from environment variable `ZENROWS_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ZENROWS_API_KEY")
            .map_err(|_| ZenRowsError::Config("ZENROWS_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set a custom base URL (for testing against a stub gateway).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Fetch a target URL through the gateway.
    ///
    /// Returns the rendered page body on HTTP 200. Non-2xx statuses are
    /// surfaced as [`ZenRowsError::Api`] with the gateway's status code so
    /// callers can distinguish rate limits (429), blocked/invalid targets
    /// (422) and credit problems (403).
    pub async fn fetch(&self, target_url: &str, options: &RequestOptions) -> Result<GatewayResponse> {
        let mut params: Vec<(&str, String)> = vec![
            ("apikey", self.api_key.clone()),
            ("url", target_url.to_string()),
            ("js_render", options.js_render.to_string()),
            ("premium_proxy", options.premium_proxy.to_string()),
            ("wait", options.wait_ms.to_string()),
        ];
        if let Some(block) = &options.block_resources {
            params.push(("block_resources", block.clone()));
        }
        if let Some(wait_for) = &options.wait_for {
            params.push(("wait_for", wait_for.clone()));
        }
        if let Some(session_id) = &options.session_id {
            params.push(("session_id", session_id.clone()));
        }

        let n = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(request = n, url = %target_url, "ZenRows request");

        let resp = self
            .client
            .get(&self.base_url)
            .query(&params)
            .timeout(Duration::from_secs(options.timeout_secs))
            .send()
            .await
            .map_err(|e| {
                self.failures.fetch_add(1, Ordering::Relaxed);
                if e.is_timeout() {
                    ZenRowsError::Timeout
                } else {
                    ZenRowsError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await.map_err(|e| {
                self.failures.fetch_add(1, Ordering::Relaxed);
                ZenRowsError::Network(e.to_string())
            })?;
            self.successes.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(url = %target_url, bytes = body.len(), "ZenRows response");
            return Ok(GatewayResponse {
                status: status.as_u16(),
                body,
            });
        }

        self.failures.fetch_add(1, Ordering::Relaxed);
        let message = resp.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), url = %target_url, "ZenRows API error");
        Err(ZenRowsError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Usage statistics for this client instance.
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            requests: self.requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_start_at_zero() {
        let client = ZenRowsClient::new("test-key".into());
        let stats = client.stats();
        assert_eq!(stats.requests, 0);
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn default_options_block_static_resources() {
        let options = RequestOptions::default();
        assert!(options.js_render);
        assert!(options.block_resources.as_deref().unwrap().contains("image"));
    }
}
