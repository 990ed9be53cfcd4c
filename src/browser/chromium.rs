//! Headless Chrome implementation of the browser capabilities.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::auth::Credentials;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use url::Url;

use crate::browser::{BrowsingContext, PageDriver};
use crate::error::{AppError, Result};
use crate::models::BrowserConfig;

/// Resource timing entries kept per document. Chrome's default of 250 fills
/// up on long feeds, after which the entry count stops moving.
const RESOURCE_BUFFER_SIZE: u32 = 100_000;

/// Installed on every new document of a tab.
fn resource_buffer_script() -> String {
    format!("performance.setResourceTimingBufferSize({RESOURCE_BUFFER_SIZE});")
}

/// Polls the resource timeline until it stops growing for one second.
///
/// The buffer is emptied first so the count always has room to grow.
const QUIESCENCE_SCRIPT: &str = r#"(async (timeoutMs) => {
    try {
        performance.setResourceTimingBufferSize(100000);
        performance.clearResourceTimings();
    } catch (_) {}
    const idleMs = 1000;
    const interval = 250;
    const start = Date.now();
    const resources = () => {
        try { return performance.getEntriesByType('resource').length; } catch (_) { return 0; }
    };
    let last = resources();
    let stable = 0;
    while (Date.now() - start < timeoutMs) {
        await new Promise(r => setTimeout(r, interval));
        const current = resources();
        if (document.readyState === 'complete' && current === last) {
            stable += interval;
            if (stable >= idleMs) return true;
        } else {
            stable = 0;
        }
        last = current;
    }
    return false;
})"#;

/// A launched Chrome process plus its CDP event loop.
pub struct ChromiumBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
    settings: BrowserConfig,
    credentials: Option<Credentials>,
}

impl ChromiumBrowser {
    /// Launch Chrome, optionally routed through a proxy URL.
    pub async fn launch(settings: &BrowserConfig, proxy: Option<&str>) -> Result<Self> {
        let proxy = proxy.map(ProxyEndpoint::parse).transpose()?;

        let mut builder = ChromeConfig::builder()
            .no_sandbox()
            .window_size(1366, 900)
            .arg(format!("--lang={}", settings.locale));
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &settings.executable {
            builder = builder.chrome_executable(executable);
        }
        if let Some(endpoint) = &proxy {
            builder = builder.arg(format!("--proxy-server={}", endpoint.server));
        }
        let config = builder.build().map_err(AppError::browser)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(AppError::browser)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::debug!("CDP handler event error: {}", e);
                }
            }
        });

        log::info!(
            "Browser launched (headless: {}, proxy: {})",
            settings.headless,
            proxy.as_ref().map_or("none", |p| p.server.as_str())
        );

        Ok(Self {
            browser,
            handler,
            settings: settings.clone(),
            credentials: proxy.and_then(|p| p.credentials),
        })
    }

    /// Close the browser and stop the event loop.
    pub async fn close(mut self) -> Result<()> {
        let closed = self.browser.close().await.map_err(AppError::browser);
        if let Err(e) = self.browser.wait().await {
            log::debug!("Waiting for browser exit failed: {}", e);
        }
        self.handler.abort();
        closed.map(|_| ())
    }
}

#[async_trait]
impl BrowsingContext for ChromiumBrowser {
    async fn new_page(&self) -> Result<Box<dyn PageDriver>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(AppError::browser)?;

        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(self.settings.user_agent.clone())
            .accept_language(self.settings.locale.clone())
            .build()
            .map_err(AppError::browser)?;
        page.execute(user_agent).await.map_err(AppError::browser)?;
        page.execute(SetTimezoneOverrideParams::new(self.settings.timezone.clone()))
            .await
            .map_err(AppError::browser)?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            resource_buffer_script(),
        ))
        .await
        .map_err(AppError::browser)?;

        if let Some(credentials) = &self.credentials {
            page.authenticate(credentials.clone())
                .await
                .map_err(AppError::browser)?;
        }

        Ok(Box::new(ChromiumPage::new(
            page,
            self.settings.navigation_timeout(),
        )))
    }
}

/// One Chrome tab.
///
/// chromiumoxide pages need an explicit async close; if the owner drops the
/// page without closing it, a background task closes it instead.
pub struct ChromiumPage {
    page: Page,
    navigation_timeout: Duration,
    closed: AtomicBool,
}

impl ChromiumPage {
    pub fn new(page: Page, navigation_timeout: Duration) -> Self {
        Self {
            page,
            navigation_timeout,
            closed: AtomicBool::new(false),
        }
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, expression: String) -> Result<T> {
        self.page
            .evaluate(expression)
            .await
            .map_err(AppError::browser)?
            .into_value::<T>()
            .map_err(AppError::browser)
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<()> {
        tokio::time::timeout(self.navigation_timeout, self.page.goto(url))
            .await
            .map_err(|_| AppError::navigation(url, "navigation timed out"))?
            .map_err(|e| AppError::navigation(url, e))?;
        Ok(())
    }

    async fn wait_for_quiescence(&self, timeout: Duration) -> Result<()> {
        let expression = format!("{}({})", QUIESCENCE_SCRIPT, timeout.as_millis());
        // The script bounds itself; the outer timeout covers a hung CDP call.
        let settled: bool = tokio::time::timeout(
            timeout + Duration::from_secs(5),
            self.evaluate(expression),
        )
        .await
        .map_err(|_| AppError::timeout("network quiescence"))??;

        if settled {
            Ok(())
        } else {
            Err(AppError::timeout(format!(
                "network still busy after {}ms",
                timeout.as_millis()
            )))
        }
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let selector = serde_json::to_string(selector)?;
        self.evaluate(format!("document.querySelectorAll({selector}).length"))
            .await
    }

    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<()> {
        self.page
            .evaluate(format!("window.scrollBy({dx}, {dy})"))
            .await
            .map_err(AppError::browser)?;
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.map_err(AppError::browser)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.page.clone().close().await.map_err(AppError::browser)
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let page = self.page.clone();
            runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    log::warn!("Background page close failed: {}", e);
                }
            });
        }
    }
}

/// A proxy URL split into the server Chrome dials and the credentials it
/// answers auth challenges with.
#[derive(Debug, Clone)]
struct ProxyEndpoint {
    server: String,
    credentials: Option<Credentials>,
}

impl ProxyEndpoint {
    fn parse(proxy: &str) -> Result<Self> {
        let url = Url::parse(proxy)?;
        let host = url
            .host_str()
            .ok_or_else(|| AppError::proxy(format!("proxy URL has no host: {proxy}")))?;
        let server = match url.port_or_known_default() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        let credentials = if url.username().is_empty() {
            None
        } else {
            Some(Credentials {
                username: decode(url.username())?,
                password: decode(url.password().unwrap_or_default())?,
            })
        };

        Ok(Self {
            server,
            credentials,
        })
    }
}

/// Percent-decode a URL userinfo component.
fn decode(component: &str) -> Result<String> {
    urlencoding::decode(component)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| AppError::proxy(format!("proxy credentials are not UTF-8: {e}")))
}
