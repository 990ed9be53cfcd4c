//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Browser launch and page behavior
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Marketplace markup conventions
    #[serde(default)]
    pub site: SiteConfig,

    /// Lazy-load expansion settings
    #[serde(default)]
    pub scroll: ScrollConfig,

    /// Detail page enrichment settings
    #[serde(default)]
    pub details: DetailsConfig,

    /// Key-value store and dataset names
    #[serde(default)]
    pub storage: StorageConfig,

    /// Proxy provider endpoint
    #[serde(default)]
    pub proxy: ProxyProviderConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.browser.user_agent.trim().is_empty() {
            return Err(AppError::validation("browser.user_agent is empty"));
        }
        if self.browser.navigation_timeout_secs == 0 {
            return Err(AppError::validation(
                "browser.navigation_timeout_secs must be > 0",
            ));
        }
        if self.browser.quiescence_timeout_secs == 0 {
            return Err(AppError::validation(
                "browser.quiescence_timeout_secs must be > 0",
            ));
        }
        if url::Url::parse(&self.site.origin).is_err() {
            return Err(AppError::validation(format!(
                "site.origin is not an absolute URL: {}",
                self.site.origin
            )));
        }
        if self.site.listing_selector.trim().is_empty() {
            return Err(AppError::validation("site.listing_selector is empty"));
        }
        if self.site.currency_marker.is_empty() {
            return Err(AppError::validation("site.currency_marker is empty"));
        }
        if self.scroll.max_rounds == 0 {
            return Err(AppError::validation("scroll.max_rounds must be > 0"));
        }
        if self.details.selectors.is_empty() {
            return Err(AppError::validation("details.selectors is empty"));
        }
        if self.details.concurrency == 0 {
            return Err(AppError::validation("details.concurrency must be > 0"));
        }
        if self.storage.seen_store.trim().is_empty() || self.storage.seen_key.trim().is_empty() {
            return Err(AppError::validation("storage seen store/key must be set"));
        }
        Ok(())
    }
}

/// Browser launch and page behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// User-Agent override for every page
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Run Chrome without a window
    #[serde(default = "defaults::headless")]
    pub headless: bool,

    /// Accept-Language / UI locale
    #[serde(default = "defaults::locale")]
    pub locale: String,

    /// IANA timezone emulated on every page
    #[serde(default = "defaults::timezone")]
    pub timezone: String,

    /// Upper bound for a single navigation
    #[serde(default = "defaults::navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Upper bound for a single network-quiescence wait
    #[serde(default = "defaults::quiescence_timeout")]
    pub quiescence_timeout_secs: u64,

    /// Explicit Chrome/Chromium binary; autodetected when absent
    #[serde(default)]
    pub executable: Option<String>,
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn quiescence_timeout(&self) -> Duration {
        Duration::from_secs(self.quiescence_timeout_secs)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            headless: defaults::headless(),
            locale: defaults::locale(),
            timezone: defaults::timezone(),
            navigation_timeout_secs: defaults::navigation_timeout(),
            quiescence_timeout_secs: defaults::quiescence_timeout(),
            executable: None,
        }
    }
}

/// Marketplace markup conventions used by the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Origin prepended to root-relative listing links
    #[serde(default = "defaults::origin")]
    pub origin: String,

    /// CSS selector matching listing anchors
    #[serde(default = "defaults::listing_selector")]
    pub listing_selector: String,

    /// Text marker identifying the price node inside a card
    #[serde(default = "defaults::currency_marker")]
    pub currency_marker: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: defaults::origin(),
            listing_selector: defaults::listing_selector(),
            currency_marker: defaults::currency_marker(),
        }
    }
}

/// Lazy-load expansion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollConfig {
    /// Maximum scroll rounds per source URL
    #[serde(default = "defaults::max_rounds")]
    pub max_rounds: usize,

    /// Pause before each scroll gesture, in milliseconds
    #[serde(default = "defaults::settle_delay")]
    pub settle_delay_ms: u64,

    /// Vertical distance of each scroll gesture, in pixels
    #[serde(default = "defaults::step_px")]
    pub step_px: i64,
}

impl ScrollConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            max_rounds: defaults::max_rounds(),
            settle_delay_ms: defaults::settle_delay(),
            step_px: defaults::step_px(),
        }
    }
}

/// Detail page enrichment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailsConfig {
    /// Content-region selectors, tried in order
    #[serde(default = "defaults::detail_selectors")]
    pub selectors: Vec<String>,

    /// Detail pages fetched at once for one snapshot
    #[serde(default = "defaults::detail_concurrency")]
    pub concurrency: usize,
}

impl Default for DetailsConfig {
    fn default() -> Self {
        Self {
            selectors: defaults::detail_selectors(),
            concurrency: defaults::detail_concurrency(),
        }
    }
}

/// Names of the persisted stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Key-value store holding the seen set
    #[serde(default = "defaults::seen_store")]
    pub seen_store: String,

    /// Record key of the seen set inside `seen_store`
    #[serde(default = "defaults::seen_key")]
    pub seen_key: String,

    /// Dataset receiving emitted listings
    #[serde(default = "defaults::dataset")]
    pub dataset: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            seen_store: defaults::seen_store(),
            seen_key: defaults::seen_key(),
            dataset: defaults::dataset(),
        }
    }
}

/// Group-proxy provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyProviderConfig {
    #[serde(default = "defaults::proxy_hostname")]
    pub hostname: String,

    #[serde(default = "defaults::proxy_port")]
    pub port: u16,

    /// Base URL of the account API used to look up the proxy password
    #[serde(default = "defaults::api_base_url")]
    pub api_base_url: String,
}

impl Default for ProxyProviderConfig {
    fn default() -> Self {
        Self {
            hostname: defaults::proxy_hostname(),
            port: defaults::proxy_port(),
            api_base_url: defaults::api_base_url(),
        }
    }
}

mod defaults {
    // Browser defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into()
    }
    pub fn headless() -> bool {
        true
    }
    pub fn locale() -> String {
        "en-US".into()
    }
    pub fn timezone() -> String {
        "America/New_York".into()
    }
    pub fn navigation_timeout() -> u64 {
        60
    }
    pub fn quiescence_timeout() -> u64 {
        30
    }

    // Site defaults
    pub fn origin() -> String {
        "https://www.facebook.com".into()
    }
    pub fn listing_selector() -> String {
        r#"a[href*="/marketplace/item/"]"#.into()
    }
    pub fn currency_marker() -> String {
        "$".into()
    }

    // Scroll defaults
    pub fn max_rounds() -> usize {
        10
    }
    pub fn settle_delay() -> u64 {
        1200
    }
    pub fn step_px() -> i64 {
        2400
    }

    // Detail defaults
    pub fn detail_selectors() -> Vec<String> {
        vec![
            "div[role=main]".into(),
            "div.x1ja2u2z".into(),
            "div.x126k92a".into(),
        ]
    }
    pub fn detail_concurrency() -> usize {
        1
    }

    // Storage defaults
    pub fn seen_store() -> String {
        "facebook-marketplace-seen".into()
    }
    pub fn seen_key() -> String {
        "ids".into()
    }
    pub fn dataset() -> String {
        "default".into()
    }

    // Proxy defaults
    pub fn proxy_hostname() -> String {
        "proxy.apify.com".into()
    }
    pub fn proxy_port() -> u16 {
        8000
    }
    pub fn api_base_url() -> String {
        "https://api.apify.com/v2".into()
    }
}
