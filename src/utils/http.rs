// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::models::BrowserConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &BrowserConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.navigation_timeout_secs))
        .build()?;
    Ok(client)
}

/// GET a URL and decode the JSON body, failing on non-2xx statuses.
pub async fn fetch_json<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.json::<T>().await?)
}
