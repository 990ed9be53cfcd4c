// src/pipeline/crawl.rs

//! Incremental listing crawl.
//!
//! Each source URL goes through navigate, first snapshot, optional early
//! stop, scroll expansion, full snapshot, seen-set filtering, optional
//! detail enrichment and emission. Sources are visited one after another
//! on a single results page.

use std::pin::pin;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::browser::{BrowsingContext, PageDriver};
use crate::error::Result;
use crate::models::{
    Config, CrawlConfig, CrawlReport, ListingDetails, ListingSummary, SourceReport, SourceStatus,
};
use crate::pipeline::seen::SeenSet;
use crate::services::{DetailFetcher, ListingExtractor, ScrollDriver};
use crate::storage::{DEFAULT_STORE, KeyValueStore, ListingSink, REPORT_KEY};

/// Drives the per-URL crawl state machine.
pub struct CrawlOrchestrator<'a> {
    crawl: &'a CrawlConfig,
    extractor: ListingExtractor,
    scroller: ScrollDriver,
    details: DetailFetcher,
    detail_concurrency: usize,
    quiescence_timeout: Duration,
    context: &'a dyn BrowsingContext,
    sink: &'a dyn ListingSink,
}

impl<'a> CrawlOrchestrator<'a> {
    pub fn new(
        config: &Config,
        crawl: &'a CrawlConfig,
        context: &'a dyn BrowsingContext,
        sink: &'a dyn ListingSink,
    ) -> Result<Self> {
        let quiescence_timeout = config.browser.quiescence_timeout();
        let extractor = ListingExtractor::new(&config.site)?;
        let scroller = ScrollDriver::new(
            extractor.listing_selector(),
            &config.scroll,
            quiescence_timeout,
        );

        Ok(Self {
            crawl,
            scroller,
            extractor,
            details: DetailFetcher::new(&config.details, quiescence_timeout)?,
            detail_concurrency: config.details.concurrency.max(1),
            quiescence_timeout,
            context,
            sink,
        })
    }

    /// Crawl every source URL in order.
    ///
    /// A source whose page cannot be loaded is reported as failed and the
    /// run moves on. Sink errors abort the run; ids already emitted stay in
    /// `seen` so the caller can still persist them.
    pub async fn run(&self, seen: &mut SeenSet) -> Result<CrawlReport> {
        let mut report = CrawlReport::start();
        let page = self.context.new_page().await?;

        let result = self.crawl_sources(page.as_ref(), seen, &mut report).await;

        if let Err(e) = page.close().await {
            log::debug!("Failed to close results page: {}", e);
        }
        result?;

        report.finish();
        Ok(report)
    }

    async fn crawl_sources(
        &self,
        page: &dyn PageDriver,
        seen: &mut SeenSet,
        report: &mut CrawlReport,
    ) -> Result<()> {
        for (index, url) in self.crawl.urls.iter().enumerate() {
            if self.crawl.cap_reached(report.emitted) {
                log::info!(
                    "Reached max_items ({}); skipping {} remaining URL(s)",
                    report.emitted,
                    self.crawl.urls.len() - index
                );
                report
                    .sources
                    .extend(self.crawl.urls[index..].iter().map(|url| SourceReport {
                        status: SourceStatus::NotReached,
                        ..SourceReport::new(url)
                    }));
                break;
            }

            log::info!("[{}/{}] Crawling {}", index + 1, self.crawl.urls.len(), url);
            let mut source = SourceReport::new(url);

            match self.collect(page, url, seen, &mut source).await {
                Ok(Some(candidates)) => {
                    let emitted = self.emit(url, candidates, seen, report.emitted, &mut source).await;
                    report.emitted += source.emitted;
                    if let Err(e) = emitted {
                        report.sources.push(source);
                        return Err(e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("Failed to crawl {}: {}", url, e);
                    source.status = SourceStatus::Failed(e.to_string());
                }
            }

            report.sources.push(source);
        }

        report.cap_reached = self.crawl.cap_reached(report.emitted);
        Ok(())
    }

    /// Load a source page and snapshot it, `None` on early stop.
    async fn collect(
        &self,
        page: &dyn PageDriver,
        url: &str,
        seen: &SeenSet,
        source: &mut SourceReport,
    ) -> Result<Option<Vec<ListingSummary>>> {
        page.goto(url).await?;
        match page.wait_for_quiescence(self.quiescence_timeout).await {
            Ok(()) => {}
            Err(e) if e.is_timeout() => {
                log::warn!("{} did not settle, continuing: {}", url, e);
            }
            Err(e) => return Err(e),
        }

        let first = self.extractor.extract(&page.content().await?);
        source.first_snapshot = first.len();
        log::info!("First page has {} listings", first.len());

        if self.first_page_all_seen(&first, seen) {
            log::info!("Every listing on the first page was seen before; skipping {}", url);
            source.status = SourceStatus::EarlyStopped;
            return Ok(None);
        }

        let outcome = self.scroller.expand(page).await;
        source.scroll_rounds = outcome.rounds;

        let full = self.extractor.extract(&page.content().await?);
        source.full_snapshot = full.len();
        log::info!(
            "Collected {} listings after {} scroll round(s)",
            full.len(),
            outcome.rounds
        );

        Ok(Some(full))
    }

    fn first_page_all_seen(&self, first: &[ListingSummary], seen: &SeenSet) -> bool {
        self.crawl.early_stop_enabled()
            && !first.is_empty()
            && first.iter().all(|s| seen.contains(&s.listing_id))
    }

    /// Filter, enrich and push one snapshot.
    async fn emit(
        &self,
        source_url: &str,
        snapshot: Vec<ListingSummary>,
        seen: &mut SeenSet,
        already_emitted: usize,
        source: &mut SourceReport,
    ) -> Result<()> {
        let total = snapshot.len();
        let mut candidates: Vec<ListingSummary> = snapshot
            .into_iter()
            .filter(|s| !s.listing_id.is_empty())
            .filter(|s| !(self.crawl.dedupe_across_runs && seen.contains(&s.listing_id)))
            .collect();
        source.skipped_seen = total - candidates.len();

        if let Some(remaining) = self.crawl.remaining(already_emitted) {
            candidates.truncate(remaining);
        }
        log::info!(
            "{} new listing(s), {} already seen",
            candidates.len(),
            source.skipped_seen
        );

        let mut enriched = pin!(
            stream::iter(candidates)
                .map(|summary| async move {
                    let details = self.enrich(&summary).await;
                    (summary, details)
                })
                .buffered(self.detail_concurrency)
        );

        while let Some((summary, details)) = enriched.next().await {
            let details = details.unwrap_or_else(|e| {
                log::warn!("Detail fetch failed for listing {}: {}", summary.listing_id, e);
                source.detail_failures += 1;
                ListingDetails::default()
            });

            let record = summary.finalize(details, source_url);
            self.sink.push(&record).await?;

            if self.crawl.dedupe_across_runs {
                seen.insert(record.listing_id);
            }
            source.emitted += 1;
        }

        Ok(())
    }

    async fn enrich(&self, summary: &ListingSummary) -> Result<ListingDetails> {
        if !self.crawl.fetch_details {
            return Ok(ListingDetails::default());
        }
        self.details.fetch(self.context, &summary.url).await
    }
}

/// Run a crawl with the persisted seen set and record the run report.
///
/// The seen set is written back when cross-run dedup is on, also when the
/// crawl aborted part way.
pub async fn run_crawler(
    config: &Config,
    crawl: &CrawlConfig,
    context: &dyn BrowsingContext,
    store: &dyn KeyValueStore,
    sink: &dyn ListingSink,
) -> Result<CrawlReport> {
    let orchestrator = CrawlOrchestrator::new(config, crawl, context, sink)?;

    let mut seen = if crawl.dedupe_across_runs {
        SeenSet::load(store, &config.storage).await?
    } else {
        SeenSet::new()
    };
    log::info!(
        "Starting crawl of {} URL(s), {} listing(s) already seen",
        crawl.urls.len(),
        seen.len()
    );

    let result = orchestrator.run(&mut seen).await;

    if crawl.dedupe_across_runs {
        match seen.save(store, &config.storage).await {
            Ok(()) => log::debug!("Persisted {} seen listing id(s)", seen.len()),
            Err(e) if result.is_err() => log::error!("Failed to persist seen set: {}", e),
            Err(e) => return Err(e),
        }
    }

    let report = result?;
    store
        .set_value(DEFAULT_STORE, REPORT_KEY, &serde_json::to_value(&report)?)
        .await?;
    log_summary(&report);

    Ok(report)
}

fn log_summary(report: &CrawlReport) {
    log::info!(
        "Crawl finished in {}s: {} listing(s) emitted from {} URL(s)",
        (report.finished_at - report.started_at).num_seconds(),
        report.emitted,
        report.sources.len()
    );
    if report.cap_reached {
        log::info!("Stopped at max_items");
    }
    if report.failures() > 0 {
        log::warn!("{} source URL(s) failed", report.failures());
    }
    if report.detail_failures() > 0 {
        log::warn!("{} detail page(s) could not be read", report.detail_failures());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::AppError;
    use crate::models::CrawlInput;
    use crate::storage::MemoryStorage;

    const ORIGIN: &str = "https://www.facebook.com";

    fn cards(ids: &[u32]) -> String {
        let body: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<div><a href="/marketplace/item/{id}/" aria-label="Item {id}"><span>${id}.00</span></a></div>"#
                )
            })
            .collect();
        format!("<html><body>{body}</body></html>")
    }

    fn item_url(id: u32) -> String {
        format!("{ORIGIN}/marketplace/item/{id}/")
    }

    /// A tiny scripted marketplace.
    #[derive(Default)]
    struct FakeSite {
        /// Result page HTML by scroll depth
        results: HashMap<String, Vec<String>>,
        items: HashMap<String, String>,
        unreachable: HashSet<String>,
        events: Mutex<Vec<String>>,
    }

    impl FakeSite {
        fn results(mut self, url: &str, stages: &[&[u32]]) -> Self {
            let stages = stages.iter().map(|ids| cards(ids)).collect();
            self.results.insert(url.to_string(), stages);
            self
        }

        fn item(mut self, id: u32, description: &str) -> Self {
            self.items.insert(
                item_url(id),
                format!(r#"<div role="main">{description}</div>"#),
            );
            self
        }

        fn unreachable(mut self, url: &str) -> Self {
            self.unreachable.insert(url.to_string());
            self
        }

        fn count_events(&self, prefix: &str) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.starts_with(prefix))
                .count()
        }
    }

    struct FakePage {
        site: Arc<FakeSite>,
        location: Mutex<(String, usize)>,
    }

    impl FakePage {
        fn html(&self) -> String {
            let (url, depth) = self.location.lock().unwrap().clone();
            if let Some(stages) = self.site.results.get(&url) {
                return stages[depth.min(stages.len() - 1)].clone();
            }
            self.site.items.get(&url).cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl PageDriver for FakePage {
        async fn goto(&self, url: &str) -> Result<()> {
            self.site.events.lock().unwrap().push(format!("goto {url}"));
            if self.site.unreachable.contains(url) {
                return Err(AppError::navigation(url, "net::ERR_NAME_NOT_RESOLVED"));
            }
            *self.location.lock().unwrap() = (url.to_string(), 0);
            Ok(())
        }

        async fn wait_for_quiescence(&self, _timeout: Duration) -> Result<()> {
            Ok(())
        }

        async fn count(&self, _selector: &str) -> Result<usize> {
            Ok(self.html().matches("/marketplace/item/").count())
        }

        async fn scroll_by(&self, _dx: i64, _dy: i64) -> Result<()> {
            self.site.events.lock().unwrap().push("scroll".to_string());
            self.location.lock().unwrap().1 += 1;
            Ok(())
        }

        async fn content(&self) -> Result<String> {
            Ok(self.html())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct FakeBrowser(Arc<FakeSite>);

    #[async_trait]
    impl BrowsingContext for FakeBrowser {
        async fn new_page(&self) -> Result<Box<dyn PageDriver>> {
            Ok(Box::new(FakePage {
                site: Arc::clone(&self.0),
                location: Mutex::new((String::new(), 0)),
            }))
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.scroll.settle_delay_ms = 0;
        config
    }

    fn crawl_config(input: serde_json::Value) -> CrawlConfig {
        CrawlInput::from_value(input).unwrap().resolve(None).unwrap()
    }

    fn ids(sink: &MemoryStorage) -> Vec<String> {
        sink.items().into_iter().map(|r| r.listing_id).collect()
    }

    const SEARCH_A: &str = "https://www.facebook.com/marketplace/nyc/search?query=bike";
    const SEARCH_B: &str = "https://www.facebook.com/marketplace/nyc/search?query=desk";

    #[tokio::test]
    async fn emits_expanded_snapshot_in_document_order() {
        let site = Arc::new(FakeSite::default().results(SEARCH_A, &[&[1, 2], &[1, 2, 3, 4]]));
        let browser = FakeBrowser(Arc::clone(&site));
        let sink = MemoryStorage::new();
        let crawl = crawl_config(json!({ "urls": [SEARCH_A] }));
        let mut seen = SeenSet::new();

        let report = CrawlOrchestrator::new(&config(), &crawl, &browser, &sink)
            .unwrap()
            .run(&mut seen)
            .await
            .unwrap();

        assert_eq!(ids(&sink), vec!["1", "2", "3", "4"]);
        assert_eq!(seen.len(), 4);
        assert_eq!(report.emitted, 4);

        let source = &report.sources[0];
        assert_eq!(source.status, SourceStatus::Completed);
        assert_eq!(source.first_snapshot, 2);
        assert_eq!(source.full_snapshot, 4);
        assert_eq!(source.scroll_rounds, 2);

        let record = &sink.items()[0];
        assert_eq!(record.source_url, SEARCH_A);
        assert_eq!(record.price, Some(1.0));
        assert_eq!(record.description, None);
    }

    #[tokio::test]
    async fn previously_seen_listings_are_skipped() {
        let site = Arc::new(FakeSite::default().results(SEARCH_A, &[&[1, 2, 3]]));
        let browser = FakeBrowser(site);
        let sink = MemoryStorage::new();
        let crawl = crawl_config(json!({ "urls": [SEARCH_A] }));
        let mut seen = SeenSet::from_ids(["1", "3"]);

        let report = CrawlOrchestrator::new(&config(), &crawl, &browser, &sink)
            .unwrap()
            .run(&mut seen)
            .await
            .unwrap();

        assert_eq!(ids(&sink), vec!["2"]);
        assert_eq!(report.sources[0].skipped_seen, 2);
        assert!(seen.contains("2"));
    }

    #[tokio::test]
    async fn early_stop_skips_scrolling_and_emission() {
        let site = Arc::new(FakeSite::default().results(SEARCH_A, &[&[1, 2], &[1, 2, 3]]));
        let browser = FakeBrowser(Arc::clone(&site));
        let sink = MemoryStorage::new();
        let crawl = crawl_config(json!({
            "urls": [SEARCH_A],
            "stop_on_first_page_all_duplicates": true
        }));
        let mut seen = SeenSet::from_ids(["1", "2"]);

        let report = CrawlOrchestrator::new(&config(), &crawl, &browser, &sink)
            .unwrap()
            .run(&mut seen)
            .await
            .unwrap();

        assert!(sink.items().is_empty());
        assert_eq!(site.count_events("scroll"), 0);
        assert_eq!(report.sources[0].status, SourceStatus::EarlyStopped);
    }

    #[tokio::test]
    async fn early_stop_ignored_without_dedup() {
        let site = Arc::new(FakeSite::default().results(SEARCH_A, &[&[1, 2]]));
        let browser = FakeBrowser(site);
        let sink = MemoryStorage::new();
        let crawl = crawl_config(json!({
            "urls": [SEARCH_A],
            "deduplicate_across_runs": false,
            "stop_on_first_page_all_duplicates": true
        }));
        let mut seen = SeenSet::from_ids(["1", "2"]);

        CrawlOrchestrator::new(&config(), &crawl, &browser, &sink)
            .unwrap()
            .run(&mut seen)
            .await
            .unwrap();

        assert_eq!(ids(&sink), vec!["1", "2"]);
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn cap_stops_current_and_later_sources() {
        let site = Arc::new(
            FakeSite::default()
                .results(SEARCH_A, &[&[1, 2]])
                .results(SEARCH_B, &[&[3, 4, 5]]),
        );
        let browser = FakeBrowser(Arc::clone(&site));
        let sink = MemoryStorage::new();
        let crawl = crawl_config(json!({ "urls": [SEARCH_A, SEARCH_B, SEARCH_A], "max_items": 3 }));
        let mut seen = SeenSet::new();

        let report = CrawlOrchestrator::new(&config(), &crawl, &browser, &sink)
            .unwrap()
            .run(&mut seen)
            .await
            .unwrap();

        assert_eq!(ids(&sink), vec!["1", "2", "3"]);
        assert!(report.cap_reached);
        assert_eq!(report.sources[1].emitted, 1);
        assert_eq!(report.sources[2].status, SourceStatus::NotReached);
        assert_eq!(site.count_events("goto"), 2);
        assert!(!seen.contains("4"));
    }

    #[tokio::test]
    async fn detail_failure_keeps_record_without_description() {
        let site = Arc::new(
            FakeSite::default()
                .results(SEARCH_A, &[&[1, 2, 3]])
                .item(1, "Solid oak desk")
                .item(3, "Pickup only")
                .unreachable(&item_url(2)),
        );
        let browser = FakeBrowser(Arc::clone(&site));
        let sink = MemoryStorage::new();
        let crawl = crawl_config(json!({ "urls": [SEARCH_A], "fetch_item_details": true }));
        let mut seen = SeenSet::new();

        let mut config = config();
        config.details.concurrency = 2;
        let report = CrawlOrchestrator::new(&config, &crawl, &browser, &sink)
            .unwrap()
            .run(&mut seen)
            .await
            .unwrap();

        let descriptions: Vec<_> = sink.items().into_iter().map(|r| r.description).collect();
        assert_eq!(
            descriptions,
            vec![
                Some("Solid oak desk".to_string()),
                None,
                Some("Pickup only".to_string())
            ]
        );
        assert_eq!(report.sources[0].detail_failures, 1);
        assert!(seen.contains("2"));
    }

    #[tokio::test]
    async fn capped_candidates_are_never_fetched() {
        let site = Arc::new(
            FakeSite::default()
                .results(SEARCH_A, &[&[1, 2, 3]])
                .item(1, "one")
                .item(2, "two")
                .item(3, "three"),
        );
        let browser = FakeBrowser(Arc::clone(&site));
        let sink = MemoryStorage::new();
        let crawl = crawl_config(json!({
            "urls": [SEARCH_A],
            "fetch_item_details": true,
            "max_items": 1
        }));

        CrawlOrchestrator::new(&config(), &crawl, &browser, &sink)
            .unwrap()
            .run(&mut SeenSet::new())
            .await
            .unwrap();

        assert_eq!(ids(&sink), vec!["1"]);
        assert_eq!(site.count_events(&format!("goto {}", item_url(2))), 0);
    }

    #[tokio::test]
    async fn navigation_failure_moves_to_next_source() {
        let site = Arc::new(
            FakeSite::default()
                .unreachable(SEARCH_A)
                .results(SEARCH_B, &[&[7]]),
        );
        let browser = FakeBrowser(site);
        let sink = MemoryStorage::new();
        let crawl = crawl_config(json!({ "urls": [SEARCH_A, SEARCH_B] }));

        let report = CrawlOrchestrator::new(&config(), &crawl, &browser, &sink)
            .unwrap()
            .run(&mut SeenSet::new())
            .await
            .unwrap();

        assert!(matches!(report.sources[0].status, SourceStatus::Failed(_)));
        assert_eq!(report.failures(), 1);
        assert_eq!(ids(&sink), vec!["7"]);
    }

    #[tokio::test]
    async fn run_crawler_persists_seen_set_and_report() {
        let site = Arc::new(FakeSite::default().results(SEARCH_A, &[&[1, 2]]));
        let browser = FakeBrowser(site);
        let store = MemoryStorage::new();
        let crawl = crawl_config(json!({ "urls": [SEARCH_A] }));
        let config = config();

        let first = run_crawler(&config, &crawl, &browser, &store, &store).await.unwrap();
        let second = run_crawler(&config, &crawl, &browser, &store, &store).await.unwrap();

        assert_eq!(first.emitted, 2);
        assert_eq!(second.emitted, 0);
        assert_eq!(ids(&store), vec!["1", "2"]);
        assert_eq!(
            store.get_value("facebook-marketplace-seen", "ids").await.unwrap(),
            Some(json!(["1", "2"]))
        );

        let report = store.get_value(DEFAULT_STORE, REPORT_KEY).await.unwrap().unwrap();
        assert_eq!(report["emitted"], 0);
        assert_eq!(report["sources"][0]["skipped_seen"], 2);
    }

    #[tokio::test]
    async fn run_crawler_leaves_seen_set_alone_without_dedup() {
        let site = Arc::new(FakeSite::default().results(SEARCH_A, &[&[1]]));
        let browser = FakeBrowser(site);
        let store = MemoryStorage::new();
        let crawl = crawl_config(json!({ "urls": [SEARCH_A], "deduplicate_across_runs": false }));

        run_crawler(&config(), &crawl, &browser, &store, &store).await.unwrap();

        assert_eq!(
            store.get_value("facebook-marketplace-seen", "ids").await.unwrap(),
            None
        );
    }
}
