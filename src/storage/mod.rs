//! Storage abstractions for crawl state and output.
//!
//! The on-disk layout follows the actor local storage convention:
//!
//! ```text
//! storage/
//! ├── key_value_stores/
//! │   ├── default/
//! │   │   ├── INPUT.json        # Run input
//! │   │   └── RUN_REPORT.json   # Last run summary
//! │   └── facebook-marketplace-seen/
//! │       └── ids.json          # Seen listing ids
//! └── datasets/
//!     └── default/
//!         ├── 000000001.json    # One emitted listing per file
//!         └── 000000002.json
//! ```

pub mod local;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::ListingRecord;

// Re-export for convenience
pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// Store holding run input and run report.
pub const DEFAULT_STORE: &str = "default";
/// Record key of the run input.
pub const INPUT_KEY: &str = "INPUT";
/// Record key of the last run report.
pub const REPORT_KEY: &str = "RUN_REPORT";

/// Named JSON values grouped into stores.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a record, `None` when it was never written.
    async fn get_value(&self, store: &str, key: &str) -> Result<Option<Value>>;

    /// Replace a record.
    async fn set_value(&self, store: &str, key: &str, value: &Value) -> Result<()>;
}

/// Append-only destination of emitted listings.
#[async_trait]
pub trait ListingSink: Send + Sync {
    async fn push(&self, record: &ListingRecord) -> Result<()>;
}

/// Reject store and record names that would escape the storage root.
pub(crate) fn check_name(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '!' | '(' | ')' | '\''));
    if valid {
        Ok(())
    } else {
        Err(AppError::validation(format!("invalid {kind} name: {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_cannot_escape_root() {
        assert!(check_name("store", "facebook-marketplace-seen").is_ok());
        assert!(check_name("key", "RUN_REPORT").is_ok());
        assert!(check_name("key", "../etc").is_err());
        assert!(check_name("key", "a/b").is_err());
        assert!(check_name("key", "..").is_err());
        assert!(check_name("key", "").is_err());
    }
}
