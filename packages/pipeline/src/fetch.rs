//! Fetching job-board pages through the anti-bot gateway.
//!
//! The gateway call itself lives in the `zenrows-client` package; this
//! module classifies outcomes into the pipeline's failure taxonomy and
//! applies the retry/backoff discipline. Two failure classes matter for
//! checkpointing: terminal failures (not-found, zero-results) must never
//! be retried, transient ones (rate-limit, timeout) are retried up to a
//! bound and then recorded.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use thiserror::Error;

use crate::rate_limit::SlidingWindowLimiter;
use zenrows_client::{RequestOptions, ZenRowsClient, ZenRowsError};

/// Maximum attempts per fetch, including the first.
pub const MAX_FETCH_ATTEMPTS: u32 = 3;

/// How a fetch failed, and whether it is worth retrying.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Gateway returned 429; back off and retry.
    #[error("rate limited by fetch gateway")]
    RateLimited,

    /// HTTP 404/422 or a "Page not found" body. Terminal.
    #[error("page not found")]
    NotFound,

    /// The query legitimately has no results. Terminal, but a valid
    /// outcome rather than an error: the work item is marked done.
    #[error("query returned zero results")]
    ZeroResults,

    /// The gateway did not respond in time; retryable.
    #[error("fetch timed out")]
    Timeout,

    /// Anything else (5xx, connection failures); retryable with caution.
    #[error("gateway error: {0}")]
    Gateway(String),
}

impl FetchError {
    /// Terminal failures short-circuit the retry loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchError::NotFound | FetchError::ZeroResults)
    }
}

/// Render/wait configuration declared per page kind.
#[derive(Debug, Clone)]
pub struct FetchProfile {
    options: RequestOptions,
}

impl FetchProfile {
    /// Search listing pages: shorter settle time, wait for the job-link
    /// anchors to render.
    pub fn search_listing() -> Self {
        Self {
            options: RequestOptions {
                wait_ms: 3000,
                wait_for: Some(".text-brand-burgandy".to_string()),
                ..RequestOptions::default()
            },
        }
    }

    /// Job detail pages: heavier markup, wait for the listing container.
    pub fn job_detail() -> Self {
        Self {
            options: RequestOptions {
                wait_ms: 5000,
                wait_for: Some(r#"[data-test="JobListing"]"#.to_string()),
                ..RequestOptions::default()
            },
        }
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }
}

/// Network access to job-board pages (trait seam for mocking).
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, profile: &FetchProfile) -> Result<String, FetchError>;
}

/// ZenRows-backed implementation of [`PageFetcher`].
pub struct ZenRowsFetcher {
    client: ZenRowsClient,
}

impl ZenRowsFetcher {
    pub fn new(client: ZenRowsClient) -> Self {
        Self { client }
    }

    /// Gateway usage counters, for end-of-stage reporting.
    pub fn stats(&self) -> zenrows_client::ClientStats {
        self.client.stats()
    }
}

#[async_trait]
impl PageFetcher for ZenRowsFetcher {
    async fn fetch(&self, url: &str, profile: &FetchProfile) -> Result<String, FetchError> {
        match self.client.fetch(url, profile.options()).await {
            Ok(response) => Ok(response.body),
            Err(ZenRowsError::Api { status: 429, .. }) => Err(FetchError::RateLimited),
            // 404 is the target missing; 422 is the gateway refusing the
            // target as blocked/invalid. Neither will succeed on retry.
            Err(ZenRowsError::Api { status: 404, .. })
            | Err(ZenRowsError::Api { status: 422, .. }) => Err(FetchError::NotFound),
            Err(ZenRowsError::Timeout) => Err(FetchError::Timeout),
            Err(other) => Err(FetchError::Gateway(other.to_string())),
        }
    }
}

/// Detect the "0 results total" banner on a search page.
pub fn has_zero_results(html: &str) -> bool {
    if !html.contains("results total") {
        return false;
    }
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("h4.text-dark-a") else {
        return false;
    };
    document.select(&selector).any(|h4| {
        let text: String = h4.text().collect();
        text.contains("0") && text.contains("results total")
    })
}

/// Detect the board's in-body "Page not found (404)" error block.
pub fn is_not_found_page(html: &str) -> bool {
    html.contains("Page not found (404)")
}

/// Result of [`fetch_with_retry`]: the final outcome plus how many attempts
/// it took, for checkpoint bookkeeping.
#[derive(Debug)]
pub struct FetchOutcome {
    pub result: Result<String, FetchError>,
    pub attempts: u32,
}

/// Fetch a page with bounded retries and exponential-plus-jitter backoff.
///
/// The rate limiter is honored before every attempt. Content-level markers
/// are checked after a successful fetch: a zero-results banner or in-body
/// 404 is a terminal outcome regardless of the HTTP status.
pub async fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    limiter: &SlidingWindowLimiter,
    url: &str,
    profile: &FetchProfile,
) -> FetchOutcome {
    let mut last_error = FetchError::Gateway("no attempt made".to_string());

    for attempt in 1..=MAX_FETCH_ATTEMPTS {
        limiter.acquire().await;

        match fetcher.fetch(url, profile).await {
            Ok(html) => {
                if has_zero_results(&html) {
                    return FetchOutcome {
                        result: Err(FetchError::ZeroResults),
                        attempts: attempt,
                    };
                }
                if is_not_found_page(&html) {
                    return FetchOutcome {
                        result: Err(FetchError::NotFound),
                        attempts: attempt,
                    };
                }
                return FetchOutcome {
                    result: Ok(html),
                    attempts: attempt,
                };
            }
            Err(error) if error.is_terminal() => {
                return FetchOutcome {
                    result: Err(error),
                    attempts: attempt,
                };
            }
            Err(error) => {
                tracing::warn!(
                    url = %url,
                    attempt,
                    error = %error,
                    "fetch attempt failed"
                );
                last_error = error;
                if attempt < MAX_FETCH_ATTEMPTS {
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
            }
        }
    }

    FetchOutcome {
        result: Err(last_error),
        attempts: MAX_FETCH_ATTEMPTS,
    }
}

/// Exponential backoff with jitter: 2^attempt seconds plus up to one
/// second of noise, so synchronized workers fan back out.
fn backoff_delay(attempt: u32) -> Duration {
    let base = 2u64.saturating_pow(attempt);
    Duration::from_millis(base * 1000 + fastrand::u64(0..1000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedFetcher {
        responses: Vec<Result<String, FetchError>>,
        calls: AtomicU32,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<Result<String, FetchError>>) -> Self {
            Self {
                responses,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, _url: &str, _profile: &FetchProfile) -> Result<String, FetchError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.responses
                .get(i.min(self.responses.len() - 1))
                .cloned()
                .unwrap_or(Err(FetchError::Gateway("script exhausted".into())))
        }
    }

    fn wide_limiter() -> SlidingWindowLimiter {
        SlidingWindowLimiter::per_second(1000)
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_up_to_the_bound() {
        let fetcher = ScriptedFetcher::new(vec![Err(FetchError::RateLimited)]);
        let limiter = wide_limiter();

        let outcome = fetch_with_retry(
            &fetcher,
            &limiter,
            "https://example.com/jobs/1",
            &FetchProfile::job_detail(),
        )
        .await;

        assert_eq!(outcome.result, Err(FetchError::RateLimited));
        assert_eq!(outcome.attempts, MAX_FETCH_ATTEMPTS);
        assert_eq!(fetcher.calls(), MAX_FETCH_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_after_transient_failure() {
        let fetcher = ScriptedFetcher::new(vec![
            Err(FetchError::Timeout),
            Ok("<html><body>fine</body></html>".into()),
        ]);
        let limiter = wide_limiter();

        let outcome = fetch_with_retry(
            &fetcher,
            &limiter,
            "https://example.com/jobs/2",
            &FetchProfile::job_detail(),
        )
        .await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_short_circuits() {
        let fetcher = ScriptedFetcher::new(vec![Err(FetchError::NotFound)]);
        let limiter = wide_limiter();

        let outcome = fetch_with_retry(
            &fetcher,
            &limiter,
            "https://example.com/jobs/3",
            &FetchProfile::job_detail(),
        )
        .await;

        assert_eq!(outcome.result, Err(FetchError::NotFound));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_results_marker_is_terminal() {
        let body = r#"<html><body><h4 class="text-dark-a">0 results total</h4></body></html>"#;
        let fetcher = ScriptedFetcher::new(vec![Ok(body.into())]);
        let limiter = wide_limiter();

        let outcome = fetch_with_retry(
            &fetcher,
            &limiter,
            "https://example.com/role/l/x/y",
            &FetchProfile::search_listing(),
        )
        .await;

        assert_eq!(outcome.result, Err(FetchError::ZeroResults));
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn zero_results_requires_the_banner_element() {
        assert!(!has_zero_results(
            "<p>we found 100 results total for you</p>"
        ));
        assert!(has_zero_results(
            r#"<h4 class="text-dark-a">0 results total</h4>"#
        ));
    }

    #[test]
    fn in_body_not_found_detected() {
        assert!(is_not_found_page("<h1>Page not found (404)</h1>"));
        assert!(!is_not_found_page("<h1>All good</h1>"));
    }
}
