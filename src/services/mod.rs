//! Service layer for the crawler application.
//!
//! This module contains the business logic for:
//! - Listing extraction from result snapshots (`ListingExtractor`)
//! - Lazy-load expansion (`ScrollDriver`)
//! - Detail page enrichment (`DetailFetcher`)
//! - Proxy provisioning (`ProxyConfiguration`)

mod details;
mod listings;
mod proxy;
mod scroll;

pub use details::DetailFetcher;
pub use listings::ListingExtractor;
pub use proxy::ProxyConfiguration;
pub use scroll::{ScrollDriver, ScrollOutcome};
