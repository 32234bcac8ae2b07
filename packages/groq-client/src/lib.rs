//! Pure Groq REST API client.
//!
//! A minimal client for Groq's OpenAI-compatible chat-completions API with
//! no domain-specific logic. Callers own prompt construction and response
//! parsing; this crate only moves messages over the wire.
//!
//! # Example
//!
//! ```rust,ignore
//! use groq_client::{ChatRequest, GroqClient, Message};
//!
//! let client = GroqClient::from_env()?;
//!
//! let response = client
//!     .chat_completion(
//!         ChatRequest::new("qwen/qwen3-32b")
//!             .message(Message::user("Hello!"))
//!             .temperature(0.1),
//!     )
//!     .await?;
//! println!("{}", response.content);
//! ```

pub mod error;
pub mod types;

pub use error::{GroqError, Result};
pub use types::{ChatRequest, ChatResponse, Message, Usage};

use reqwest::Client;
use tracing::{debug, warn};

/// Pure Groq API client.
#[derive(Clone)]
pub struct GroqClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl GroqClient {
    /// Create a new Groq client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
        }
    }

    /// Create from environment variable `GROQ_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| GroqError::Config("GROQ_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set a custom base URL (for proxies or other OpenAI-compatible hosts).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Chat completion.
    ///
    /// Send messages to the chat-completions endpoint and get a response.
    pub async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        let start = std::time::Instant::now();

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Groq request failed");
                GroqError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Groq API error");
            return Err(GroqError::Api(format!("Groq API error: {}", error_text)));
        }

        let chat_response: types::ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| GroqError::Parse(e.to_string()))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GroqError::Api("No response from Groq".into()))?;

        debug!(
            model = %request.model,
            duration_ms = start.elapsed().as_millis(),
            "Groq chat completion"
        );

        Ok(ChatResponse {
            content,
            usage: chat_response.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builder() {
        let client = GroqClient::new("gsk-test").with_base_url("https://custom.api.com");

        assert_eq!(client.api_key, "gsk-test");
        assert_eq!(client.base_url, "https://custom.api.com");
    }

    #[test]
    fn test_request_builder() {
        let request = ChatRequest::new("qwen/qwen3-32b")
            .message(Message::system("Return only JSON."))
            .message(Message::user("classify this"))
            .temperature(0.1);

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.temperature, Some(0.1));
    }
}
