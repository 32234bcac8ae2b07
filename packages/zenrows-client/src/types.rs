use serde::{Deserialize, Serialize};

/// Options for a single gateway request.
///
/// Defaults match the gateway's recommended settings for scripted pages
/// behind bot protection: JavaScript rendering on, premium proxies on,
/// static resources blocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Render JavaScript in a headless browser before returning HTML.
    pub js_render: bool,
    /// Route through the premium (residential) proxy pool.
    pub premium_proxy: bool,
    /// Milliseconds to wait after page load before capturing.
    pub wait_ms: u32,
    /// CSS selector to wait for before capturing.
    pub wait_for: Option<String>,
    /// Comma-separated resource types to block (e.g. "image,stylesheet,font").
    pub block_resources: Option<String>,
    /// Sticky session identifier for proxy reuse.
    pub session_id: Option<String>,
    /// Overall request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            js_render: true,
            premium_proxy: true,
            wait_ms: 3000,
            wait_for: None,
            block_resources: Some("image,stylesheet,font,media".to_string()),
            session_id: None,
            timeout_secs: 90,
        }
    }
}

/// A successful gateway response.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: String,
}

/// Usage counters for one client instance.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ClientStats {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
}

impl ClientStats {
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.successes as f64 / self.requests as f64 * 100.0
        }
    }
}
