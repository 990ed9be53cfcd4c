// src/services/listings.rs

//! Listing extraction service.
//!
//! Turns an HTML snapshot of a search-result page into listing summaries.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ListingSummary, SiteConfig};
use crate::utils::{extract_listing_id, normalize_whitespace, parse_price, resolve_url};

/// Extracts listing cards from search-result snapshots.
pub struct ListingExtractor {
    origin: Url,
    listing_selector: String,
    anchor_sel: Selector,
    span_sel: Selector,
    image_sel: Selector,
    currency_marker: String,
}

impl ListingExtractor {
    /// Create an extractor for the given marketplace conventions.
    pub fn new(site: &SiteConfig) -> Result<Self> {
        Ok(Self {
            origin: Url::parse(&site.origin)?,
            listing_selector: site.listing_selector.clone(),
            anchor_sel: Self::parse_selector(&site.listing_selector)?,
            span_sel: Self::parse_selector("span")?,
            image_sel: Self::parse_selector("img")?,
            currency_marker: site.currency_marker.clone(),
        })
    }

    /// CSS selector of listing anchors, as configured.
    pub fn listing_selector(&self) -> &str {
        &self.listing_selector
    }

    /// Extract one summary per listing id, in document order.
    ///
    /// Anchors without a resolvable id are skipped; when an id repeats, the
    /// first card wins.
    pub fn extract(&self, html: &str) -> Vec<ListingSummary> {
        let document = Html::parse_document(html);

        let mut seen = HashSet::new();
        document
            .select(&self.anchor_sel)
            .filter_map(|anchor| self.parse_anchor(anchor))
            .filter(|summary| seen.insert(summary.listing_id.clone()))
            .collect()
    }

    fn parse_anchor(&self, anchor: ElementRef<'_>) -> Option<ListingSummary> {
        let href = anchor.value().attr("href")?.trim();
        if href.is_empty() {
            return None;
        }

        let url = resolve_url(&self.origin, href);
        let listing_id = extract_listing_id(&url)?;

        let card = nearest_container(anchor);
        let price = card.and_then(|card| self.card_price(card));
        let image_url = card
            .and_then(|card| card.select(&self.image_sel).next())
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string);
        let title = anchor
            .value()
            .attr("aria-label")
            .map(normalize_whitespace)
            .filter(|t| !t.is_empty());

        Some(ListingSummary {
            listing_id,
            title,
            price,
            image_url,
            url,
        })
    }

    /// Price from the first currency-marked span of a card.
    fn card_price(&self, card: ElementRef<'_>) -> Option<f64> {
        card.select(&self.span_sel)
            .map(|span| span.text().collect::<String>())
            .find(|text| text.contains(&self.currency_marker))
            .and_then(|text| parse_price(&text))
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }
}

/// Closest enclosing `div` of an element.
fn nearest_container(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "div")
}
