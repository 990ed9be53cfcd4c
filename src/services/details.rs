// src/services/details.rs

//! Detail page fetching service.
//!
//! Opens a listing in its own tab and reads the long-form description from
//! the first content region that has any text.

use std::time::Duration;

use scraper::{ElementRef, Html, Selector};

use crate::browser::{BrowsingContext, PageDriver};
use crate::error::{AppError, Result};
use crate::models::{DetailsConfig, ListingDetails};
use crate::utils::normalize_whitespace;

/// Service for enriching listings with detail-page content.
pub struct DetailFetcher {
    selectors: Vec<Selector>,
    quiescence_timeout: Duration,
}

impl DetailFetcher {
    /// Create a fetcher trying `config.selectors` in order.
    pub fn new(config: &DetailsConfig, quiescence_timeout: Duration) -> Result<Self> {
        let selectors = config
            .selectors
            .iter()
            .map(|s| Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}"))))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            selectors,
            quiescence_timeout,
        })
    }

    /// Fetch details for one listing URL in a fresh tab.
    ///
    /// The tab is closed whether or not loading succeeds.
    pub async fn fetch(
        &self,
        context: &dyn BrowsingContext,
        item_url: &str,
    ) -> Result<ListingDetails> {
        let page = context.new_page().await?;
        let details = self.load(page.as_ref(), item_url).await;

        if let Err(e) = page.close().await {
            log::debug!("Failed to close detail page {}: {}", item_url, e);
        }

        details
    }

    async fn load(&self, page: &dyn PageDriver, item_url: &str) -> Result<ListingDetails> {
        page.goto(item_url).await?;
        match page.wait_for_quiescence(self.quiescence_timeout).await {
            Ok(()) => {}
            Err(e) if e.is_timeout() => {
                log::debug!("Detail page {} still loading, reading it anyway", item_url);
            }
            Err(e) => return Err(e),
        }

        let html = page.content().await?;
        Ok(ListingDetails {
            description: self.extract_description(&html),
        })
    }

    /// Text of the first configured region that has any.
    pub fn extract_description(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);

        self.selectors.iter().find_map(|selector| {
            document
                .select(selector)
                .next()
                .map(block_text)
                .filter(|text| !text.is_empty())
        })
    }
}

/// Visible text of an element, one normalized line per text node.
fn block_text(element: ElementRef<'_>) -> String {
    element
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .parent()
                .and_then(ElementRef::wrap)
                .is_some_and(|parent| {
                    matches!(parent.value().name(), "script" | "style" | "noscript")
                });
            if hidden {
                return None;
            }
            let line = normalize_whitespace(text);
            (!line.is_empty()).then_some(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;

    fn fetcher() -> DetailFetcher {
        DetailFetcher::new(&DetailsConfig::default(), Duration::from_millis(10)).unwrap()
    }

    #[test]
    fn first_matching_selector_wins() {
        let html = r#"
            <div class="x126k92a">fallback text</div>
            <div role="main">
              <h1>  Road   bike </h1>
              <p>Great condition.</p>
              <script>var tracking = 1;</script>
            </div>"#;

        assert_eq!(
            fetcher().extract_description(html).as_deref(),
            Some("Road bike\nGreat condition.")
        );
    }

    #[test]
    fn empty_region_falls_through_to_next_selector() {
        let html = r#"
            <div role="main">   </div>
            <div class="x1ja2u2z">Pickup only</div>"#;

        assert_eq!(
            fetcher().extract_description(html).as_deref(),
            Some("Pickup only")
        );
    }

    #[test]
    fn no_region_means_no_description() {
        assert_eq!(fetcher().extract_description("<p>nothing here</p>"), None);
    }

    struct FakePage {
        html: String,
        fail_goto: bool,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PageDriver for FakePage {
        async fn goto(&self, url: &str) -> Result<()> {
            if self.fail_goto {
                Err(AppError::navigation(url, "net::ERR_CONNECTION_RESET"))
            } else {
                Ok(())
            }
        }

        async fn wait_for_quiescence(&self, _timeout: Duration) -> Result<()> {
            Err(AppError::timeout("network quiescence"))
        }

        async fn count(&self, _selector: &str) -> Result<usize> {
            Ok(0)
        }

        async fn scroll_by(&self, _dx: i64, _dy: i64) -> Result<()> {
            Ok(())
        }

        async fn content(&self) -> Result<String> {
            Ok(self.html.clone())
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeContext {
        html: String,
        fail_goto: bool,
        closes: Arc<AtomicUsize>,
        opened: Mutex<usize>,
    }

    #[async_trait]
    impl BrowsingContext for FakeContext {
        async fn new_page(&self) -> Result<Box<dyn PageDriver>> {
            *self.opened.lock().unwrap() += 1;
            Ok(Box::new(FakePage {
                html: self.html.clone(),
                fail_goto: self.fail_goto,
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    fn context(html: &str, fail_goto: bool) -> FakeContext {
        FakeContext {
            html: html.to_string(),
            fail_goto,
            closes: Arc::new(AtomicUsize::new(0)),
            opened: Mutex::new(0),
        }
    }

    #[tokio::test]
    async fn fetch_reads_description_and_closes_page() {
        let ctx = context(r#"<div role="main">Desk, solid oak</div>"#, false);

        let details = fetcher()
            .fetch(&ctx, "https://www.facebook.com/marketplace/item/1/")
            .await
            .unwrap();

        assert_eq!(details.description.as_deref(), Some("Desk, solid oak"));
        assert_eq!(*ctx.opened.lock().unwrap(), 1);
        assert_eq!(ctx.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn navigation_failure_still_closes_page() {
        let ctx = context("", true);

        let result = fetcher()
            .fetch(&ctx, "https://www.facebook.com/marketplace/item/2/")
            .await;

        assert!(matches!(result, Err(AppError::Navigation { .. })));
        assert_eq!(ctx.closes.load(Ordering::SeqCst), 1);
    }
}
