//! Search-page stage: walk one search URL's result pages and register the
//! job links they contain.

use async_trait::async_trait;
use std::sync::Arc;

use crate::fetch::{fetch_with_retry, FetchError, FetchProfile, PageFetcher};
use crate::rate_limit::SlidingWindowLimiter;
use crate::runner::{UnitOfWork, UnitOutcome};
use crate::storage::CheckpointStore;
use crate::types::Stage;

pub struct SearchPageUnit {
    fetcher: Arc<dyn PageFetcher>,
    limiter: Arc<SlidingWindowLimiter>,
    checkpoints: Arc<dyn CheckpointStore>,
    profile: FetchProfile,
    max_pages: u32,
}

impl SearchPageUnit {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        limiter: Arc<SlidingWindowLimiter>,
        checkpoints: Arc<dyn CheckpointStore>,
        max_pages: u32,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            checkpoints,
            profile: FetchProfile::search_listing(),
            max_pages: max_pages.max(1),
        }
    }
}

#[async_trait]
impl UnitOfWork for SearchPageUnit {
    /// Paginate `base_url` until the listings run out. Discovered job URLs
    /// are registered set-on-insert, so re-walking a partially processed
    /// search URL never duplicates work downstream.
    async fn process(&self, base_url: &str) -> UnitOutcome {
        let mut discovered = 0u64;

        for page in 1..=self.max_pages {
            let page_url = if page == 1 {
                base_url.to_string()
            } else {
                format!("{base_url}?page={page}")
            };

            let outcome = fetch_with_retry(
                self.fetcher.as_ref(),
                &self.limiter,
                &page_url,
                &self.profile,
            )
            .await;

            match outcome.result {
                Ok(html) => {
                    let links = crate::extract::extract_job_links(&html, &page_url);
                    if links.is_empty() {
                        // A result page with no job links is the end of the
                        // listings for this search.
                        break;
                    }
                    match self.checkpoints.register(Stage::ScrapeJobPages, &links).await {
                        Ok(new) => {
                            discovered += new;
                            tracing::debug!(
                                url = %page_url,
                                links = links.len(),
                                new,
                                "registered job links"
                            );
                        }
                        Err(e) => {
                            return UnitOutcome::retryable(
                                format!("failed to register job links: {e}"),
                                outcome.attempts,
                            );
                        }
                    }
                }
                // Zero results on the first page means the query has no
                // postings at all; past the first page it just means we
                // paged off the end. Both end the walk as a success.
                Err(FetchError::ZeroResults) => {
                    if page == 1 {
                        tracing::info!(url = %base_url, "search has zero results");
                        return UnitOutcome::DoneEmpty;
                    }
                    break;
                }
                Err(FetchError::NotFound) => {
                    if page == 1 {
                        return UnitOutcome::terminal("search url not found", outcome.attempts);
                    }
                    break;
                }
                Err(error) => {
                    return UnitOutcome::retryable(
                        format!("page {page}: {error}"),
                        outcome.attempts,
                    );
                }
            }
        }

        tracing::info!(url = %base_url, discovered, "search url processed");
        UnitOutcome::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::collections::HashMap;

    /// Fetcher scripted per page URL.
    struct PageMap {
        pages: HashMap<String, Result<String, FetchError>>,
    }

    #[async_trait]
    impl PageFetcher for PageMap {
        async fn fetch(&self, url: &str, _profile: &FetchProfile) -> Result<String, FetchError> {
            self.pages
                .get(url)
                .cloned()
                .unwrap_or(Err(FetchError::NotFound))
        }
    }

    fn listing(links: &[&str]) -> String {
        links
            .iter()
            .map(|href| format!(r#"<a class="mr-2 text-brand-burgandy" href="{href}">j</a>"#))
            .collect()
    }

    fn zero_results() -> Result<String, FetchError> {
        Ok(r#"<h4 class="text-dark-a">0 results total</h4>"#.to_string())
    }

    #[tokio::test]
    async fn paginates_and_registers_links() {
        let base = "https://wellfound.com/role/l/rust-developer/california";
        let mut pages = HashMap::new();
        pages.insert(base.to_string(), Ok(listing(&["/jobs/1-a", "/jobs/2-b"])));
        pages.insert(format!("{base}?page=2"), Ok(listing(&["/jobs/3-c"])));
        pages.insert(format!("{base}?page=3"), zero_results());

        let store = Arc::new(MemoryStorage::new());
        let unit = SearchPageUnit::new(
            Arc::new(PageMap { pages }),
            Arc::new(SlidingWindowLimiter::per_second(1000)),
            store.clone(),
            50,
        );

        assert_eq!(unit.process(base).await, UnitOutcome::Done);

        let pending = store.pending(Stage::ScrapeJobPages).await.unwrap();
        let keys: Vec<&str> = pending.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "https://wellfound.com/jobs/1-a",
                "https://wellfound.com/jobs/2-b",
                "https://wellfound.com/jobs/3-c",
            ]
        );
    }

    #[tokio::test]
    async fn zero_results_on_first_page_is_done_empty() {
        let base = "https://wellfound.com/role/l/cobol-developer/mars";
        let mut pages = HashMap::new();
        pages.insert(base.to_string(), zero_results());

        let store = Arc::new(MemoryStorage::new());
        let unit = SearchPageUnit::new(
            Arc::new(PageMap { pages }),
            Arc::new(SlidingWindowLimiter::per_second(1000)),
            store.clone(),
            50,
        );

        assert_eq!(unit.process(base).await, UnitOutcome::DoneEmpty);
        assert!(store.pending(Stage::ScrapeJobPages).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_search_url_is_terminal() {
        let store = Arc::new(MemoryStorage::new());
        let unit = SearchPageUnit::new(
            Arc::new(PageMap {
                pages: HashMap::new(),
            }),
            Arc::new(SlidingWindowLimiter::per_second(1000)),
            store,
            50,
        );

        match unit.process("https://wellfound.com/role/l/gone/nowhere").await {
            UnitOutcome::FailedTerminal { .. } => {}
            other => panic!("expected terminal failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pagination_respects_the_page_cap() {
        // Every page returns one fresh link; the cap must stop the walk.
        struct EndlessListing;

        #[async_trait]
        impl PageFetcher for EndlessListing {
            async fn fetch(&self, url: &str, _profile: &FetchProfile) -> Result<String, FetchError> {
                let page = url
                    .split("page=")
                    .nth(1)
                    .unwrap_or("1")
                    .parse::<u32>()
                    .unwrap_or(1);
                Ok(listing(&[&format!("/jobs/{page}-x")]))
            }
        }

        let store = Arc::new(MemoryStorage::new());
        let unit = SearchPageUnit::new(
            Arc::new(EndlessListing),
            Arc::new(SlidingWindowLimiter::per_second(1000)),
            store.clone(),
            3,
        );

        assert_eq!(unit.process("https://x/role/l/a/b").await, UnitOutcome::Done);
        assert_eq!(store.counts(Stage::ScrapeJobPages).await.unwrap().total(), 3);
    }
}
