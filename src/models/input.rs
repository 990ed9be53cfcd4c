//! Run input and the resolved per-run crawl configuration.

use std::fs;
use std::path::Path;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

/// Raw run input as supplied by the caller (`INPUT.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlInput {
    /// Search-result pages to crawl, in order
    #[serde(default)]
    pub urls: Vec<SourceUrl>,

    /// Open every new listing to read its description
    #[serde(default)]
    pub fetch_item_details: bool,

    /// Suppress listings emitted by earlier runs
    #[serde(default = "default_true")]
    pub deduplicate_across_runs: bool,

    /// Skip a source URL whose first page is entirely already seen
    #[serde(default)]
    pub stop_on_first_page_all_duplicates: bool,

    /// Global cap on emitted listings; `null`, `""` and `0` mean no cap
    #[serde(default, deserialize_with = "lenient_max_items")]
    pub max_items: Option<usize>,

    #[serde(default)]
    pub proxy: Option<ProxyInput>,
}

fn default_true() -> bool {
    true
}

/// A crawl target, either a bare string or a request-list style object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceUrl {
    Plain(String),
    Request { url: String },
}

impl SourceUrl {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain(url) | Self::Request { url } => url,
        }
    }
}

/// Proxy section of the run input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyInput {
    /// Route through the group-proxy provider
    #[serde(default, alias = "useApifyProxy")]
    pub use_proxy: bool,

    #[serde(default, alias = "apifyProxyGroups")]
    pub proxy_groups: Option<Vec<String>>,

    #[serde(default, alias = "apifyProxyCountry")]
    pub proxy_country: Option<String>,

    /// Custom proxy URLs, used when `use_proxy` is off
    #[serde(default)]
    pub proxy_urls: Option<Vec<String>>,
}

impl ProxyInput {
    /// Whether this section asks for any proxy at all.
    pub fn is_requested(&self) -> bool {
        self.use_proxy || self.proxy_urls.as_ref().is_some_and(|urls| !urls.is_empty())
    }
}

fn lenient_max_items<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let positive = |n: u64| usize::try_from(n).ok().filter(|n| *n > 0);

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(positive)
            .map_err(|_| de::Error::custom(format!("max_items must be a positive integer, got {s:?}"))),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(positive)
            .ok_or_else(|| de::Error::custom(format!("max_items must be a positive integer, got {n}"))),
        Some(other) => Err(de::Error::custom(format!(
            "max_items must be a positive integer, got {other}"
        ))),
    }
}

impl CrawlInput {
    /// Load input from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Build input from an already parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Proxy section, empty when absent.
    pub fn proxy(&self) -> ProxyInput {
        self.proxy.clone().unwrap_or_default()
    }

    /// Check the input without provisioning anything.
    pub fn validate(&self) -> Result<()> {
        if self.urls.is_empty() {
            return Err(AppError::validation("input.urls must list at least one URL"));
        }
        for source in &self.urls {
            let parsed = url::Url::parse(source.as_str()).map_err(|e| {
                AppError::validation(format!("invalid source URL {:?}: {e}", source.as_str()))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AppError::validation(format!(
                    "source URL must be http(s): {}",
                    source.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Freeze the input into the immutable configuration of one run.
    pub fn resolve(&self, proxy: Option<String>) -> Result<CrawlConfig> {
        self.validate()?;
        Ok(CrawlConfig {
            urls: self.urls.iter().map(|u| u.as_str().to_string()).collect(),
            fetch_details: self.fetch_item_details,
            dedupe_across_runs: self.deduplicate_across_runs,
            stop_on_first_page_all_duplicates: self.stop_on_first_page_all_duplicates,
            max_items: self.max_items,
            proxy,
        })
    }
}

/// Immutable configuration resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    pub urls: Vec<String>,
    pub fetch_details: bool,
    pub dedupe_across_runs: bool,
    pub stop_on_first_page_all_duplicates: bool,
    pub max_items: Option<usize>,
    pub proxy: Option<String>,
}

impl CrawlConfig {
    /// Early stop only applies when both dedup switches are on.
    pub fn early_stop_enabled(&self) -> bool {
        self.dedupe_across_runs && self.stop_on_first_page_all_duplicates
    }

    /// Whether `pushed` emitted records exhaust the cap.
    pub fn cap_reached(&self, pushed: usize) -> bool {
        self.max_items.is_some_and(|max| pushed >= max)
    }

    /// Records that may still be emitted, `None` when uncapped.
    pub fn remaining(&self, pushed: usize) -> Option<usize> {
        self.max_items.map(|max| max.saturating_sub(pushed))
    }
}
