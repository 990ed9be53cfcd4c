//! Proxy provisioning.
//!
//! Resolves the `proxy` section of the run input into concrete proxy URLs,
//! either from the group-proxy provider or from a custom list.

use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{ProxyInput, ProxyProviderConfig};
use crate::utils::http::fetch_json;

const PASSWORD_ENV: &str = "APIFY_PROXY_PASSWORD";
const TOKEN_ENV: &str = "APIFY_TOKEN";

/// A source of proxy URLs for browser sessions.
#[derive(Debug)]
pub enum ProxyConfiguration {
    /// Provider proxy selecting exits by group and country
    Provider {
        username: String,
        password: String,
        hostname: String,
        port: u16,
    },
    /// Caller-supplied proxies, handed out round-robin
    Custom { urls: Vec<String>, next: AtomicUsize },
}

#[derive(Deserialize)]
struct UserResponse {
    data: UserData,
}

#[derive(Deserialize)]
struct UserData {
    proxy: UserProxy,
}

#[derive(Deserialize)]
struct UserProxy {
    password: String,
}

impl ProxyConfiguration {
    /// Resolve the input section, `None` when no proxy was requested.
    pub async fn from_input(
        input: &ProxyInput,
        provider: &ProxyProviderConfig,
        client: &reqwest::Client,
    ) -> Result<Option<Self>> {
        if input.use_proxy {
            let password = lookup_password(provider, client).await?;
            return Ok(Some(Self::provider(input, provider, password)));
        }

        match &input.proxy_urls {
            Some(urls) if !urls.is_empty() => Self::custom(urls.clone()).map(Some),
            _ => Ok(None),
        }
    }

    /// Provider proxy for the groups and country named in the input.
    pub fn provider(input: &ProxyInput, provider: &ProxyProviderConfig, password: String) -> Self {
        let mut parts = Vec::new();
        if let Some(groups) = input.proxy_groups.as_ref().filter(|g| !g.is_empty()) {
            parts.push(format!("groups-{}", groups.join("+")));
        }
        if let Some(country) = input.proxy_country.as_ref().filter(|c| !c.trim().is_empty()) {
            parts.push(format!("country-{}", country.trim().to_uppercase()));
        }
        let username = if parts.is_empty() {
            "auto".to_string()
        } else {
            parts.join(",")
        };

        Self::Provider {
            username,
            password,
            hostname: provider.hostname.clone(),
            port: provider.port,
        }
    }

    /// Round-robin over custom proxy URLs, each checked for a host.
    pub fn custom(urls: Vec<String>) -> Result<Self> {
        for raw in &urls {
            let parsed = url::Url::parse(raw)
                .map_err(|e| AppError::proxy(format!("invalid proxy URL {raw:?}: {e}")))?;
            if parsed.host_str().is_none() {
                return Err(AppError::proxy(format!("proxy URL has no host: {raw}")));
            }
        }
        Ok(Self::Custom {
            urls,
            next: AtomicUsize::new(0),
        })
    }

    /// Next proxy URL to use.
    pub fn new_url(&self) -> String {
        match self {
            Self::Provider {
                username,
                password,
                hostname,
                port,
            } => format!(
                "http://{}:{}@{hostname}:{port}",
                urlencoding::encode(username),
                urlencoding::encode(password)
            ),
            Self::Custom { urls, next } => {
                let index = next.fetch_add(1, Ordering::Relaxed) % urls.len();
                urls[index].clone()
            }
        }
    }
}

/// Proxy password from the environment, or from the account API.
async fn lookup_password(provider: &ProxyProviderConfig, client: &reqwest::Client) -> Result<String> {
    if let Some(password) = env::var(PASSWORD_ENV).ok().filter(|p| !p.is_empty()) {
        return Ok(password);
    }

    let token = env::var(TOKEN_ENV)
        .ok()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            AppError::proxy(format!(
                "group proxy requested but neither {PASSWORD_ENV} nor {TOKEN_ENV} is set"
            ))
        })?;

    log::info!("Looking up proxy password from account API");
    let url = format!(
        "{}/users/me?token={}",
        provider.api_base_url.trim_end_matches('/'),
        urlencoding::encode(&token)
    );
    let response: UserResponse = fetch_json(client, &url).await?;
    Ok(response.data.proxy.password)
}
