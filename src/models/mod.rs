// src/models/mod.rs

//! Domain models for the marketplace crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod input;
mod listing;
mod report;

// Re-export all public types
pub use config::{
    BrowserConfig, Config, DetailsConfig, ProxyProviderConfig, ScrollConfig, SiteConfig,
    StorageConfig,
};
pub use input::{CrawlConfig, CrawlInput, ProxyInput, SourceUrl};
pub use listing::{ListingDetails, ListingRecord, ListingSummary};
pub use report::{CrawlReport, SourceReport, SourceStatus};
