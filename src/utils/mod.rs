//! Utility functions and helpers.

pub mod http;

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static LISTING_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/item/(\d+)").expect("listing id pattern"));

static PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d,]+(?:\.\d{2})?)").expect("price pattern"));

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Extract the numeric marketplace item id from a listing URL.
pub fn extract_listing_id(url: &str) -> Option<String> {
    LISTING_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parse the first price-looking number out of a text node.
///
/// Thousands separators are stripped; text without digits yields `None`.
pub fn parse_price(text: &str) -> Option<f64> {
    let raw = PRICE.captures(text)?.get(1)?.as_str().replace(',', "");
    raw.parse::<f64>().ok()
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
