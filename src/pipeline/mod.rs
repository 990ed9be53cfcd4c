//! Pipeline entry points for crawler operations.
//!
//! - `load_input` / `resolve_crawl_config`: Turn run input into a `CrawlConfig`
//! - `run_crawler`: Crawl source URLs, emit new listings, persist the seen set

pub mod crawl;
pub mod prepare;
pub mod seen;

pub use crawl::{CrawlOrchestrator, run_crawler};
pub use prepare::{load_input, resolve_crawl_config};
pub use seen::SeenSet;
