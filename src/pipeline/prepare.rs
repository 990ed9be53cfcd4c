//! Run preparation: input lookup and proxy provisioning.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{Config, CrawlConfig, CrawlInput};
use crate::services::ProxyConfiguration;
use crate::storage::{DEFAULT_STORE, INPUT_KEY, KeyValueStore};

/// Read run input from `path`, or from the default store's `INPUT` record.
pub async fn load_input(store: &dyn KeyValueStore, path: Option<&Path>) -> Result<CrawlInput> {
    if let Some(path) = path {
        log::info!("Loading input from {}", path.display());
        return CrawlInput::load(path);
    }

    match store.get_value(DEFAULT_STORE, INPUT_KEY).await? {
        Some(value) => CrawlInput::from_value(value),
        None => Err(AppError::config(format!(
            "no input given: pass --input or write key_value_stores/{DEFAULT_STORE}/{INPUT_KEY}.json"
        ))),
    }
}

/// Provision a proxy if the input asks for one and freeze the run config.
pub async fn resolve_crawl_config(
    config: &Config,
    input: &CrawlInput,
    client: &reqwest::Client,
) -> Result<CrawlConfig> {
    input.validate()?;

    let requested = input.proxy();
    if requested.is_requested() {
        log::info!("Provisioning proxy for browser traffic");
    }
    let proxy = ProxyConfiguration::from_input(&requested, &config.proxy, client).await?;
    let proxy_url = proxy.map(|p| p.new_url());

    input.resolve(proxy_url)
}
