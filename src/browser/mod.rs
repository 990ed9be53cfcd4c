//! Browser capability interfaces.
//!
//! The crawl pipeline never talks to a browser engine directly. It drives
//! pages through [`PageDriver`] and opens isolated pages through
//! [`BrowsingContext`]; [`ChromiumBrowser`] implements both on top of a
//! headless Chrome controlled over CDP.

pub mod chromium;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use chromium::{ChromiumBrowser, ChromiumPage};

/// Narrow control surface over one browser tab.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to a URL and wait for the document to load.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Wait until network activity settles, failing with a timeout error
    /// when it does not settle within `timeout`.
    async fn wait_for_quiescence(&self, timeout: Duration) -> Result<()>;

    /// Count elements currently matching a CSS selector.
    async fn count(&self, selector: &str) -> Result<usize>;

    /// Scroll the viewport by the given offsets in pixels.
    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<()>;

    /// Serialized HTML of the current DOM.
    async fn content(&self) -> Result<String>;

    /// Close the tab. Closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Source of fresh tabs sharing one browser session.
#[async_trait]
pub trait BrowsingContext: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageDriver>>;
}
