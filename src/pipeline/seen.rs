//! Listing ids emitted by earlier runs.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::StorageConfig;
use crate::storage::KeyValueStore;

/// Set of listing ids that have already been emitted.
///
/// Grows only through [`SeenSet::insert`], which the crawl loop calls after a
/// record was pushed to the sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenSet {
    ids: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, listing_id: &str) -> bool {
        self.ids.contains(listing_id)
    }

    /// Record an emitted id. Returns false if it was already present.
    pub fn insert(&mut self, listing_id: impl Into<String>) -> bool {
        self.ids.insert(listing_id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in ascending order, for stable persisted output.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.ids.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Load the persisted set, empty when the record does not exist yet.
    pub async fn load(store: &dyn KeyValueStore, config: &StorageConfig) -> Result<Self> {
        match store.get_value(&config.seen_store, &config.seen_key).await? {
            None | Some(Value::Null) => Ok(Self::new()),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(id) => Ok(id),
                    Value::Number(n) => Ok(n.to_string()),
                    other => Err(AppError::validation(format!(
                        "seen set entry must be a string, got {other}"
                    ))),
                })
                .collect::<Result<HashSet<_>>>()
                .map(|ids| Self { ids }),
            Some(other) => Err(AppError::validation(format!(
                "seen set record {}/{} must be a JSON array, got {}",
                config.seen_store,
                config.seen_key,
                json_kind(&other)
            ))),
        }
    }

    /// Replace the persisted set with this one.
    pub async fn save(&self, store: &dyn KeyValueStore, config: &StorageConfig) -> Result<()> {
        let value = Value::from(self.to_sorted_vec());
        store
            .set_value(&config.seen_store, &config.seen_key, &value)
            .await
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    #[tokio::test]
    async fn missing_record_loads_empty() {
        let store = MemoryStorage::new();
        let seen = SeenSet::load(&store, &StorageConfig::default()).await.unwrap();
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_keeps_ids() {
        let store = MemoryStorage::new();
        let config = StorageConfig::default();

        let mut seen = SeenSet::new();
        assert!(seen.insert("20"));
        assert!(seen.insert("10"));
        assert!(!seen.insert("10"));
        seen.save(&store, &config).await.unwrap();

        let raw = store
            .get_value("facebook-marketplace-seen", "ids")
            .await
            .unwrap();
        assert_eq!(raw, Some(json!(["10", "20"])));

        let loaded = SeenSet::load(&store, &config).await.unwrap();
        assert_eq!(loaded, seen);
    }

    #[tokio::test]
    async fn numeric_ids_are_accepted() {
        let store = MemoryStorage::new();
        let config = StorageConfig::default();
        store
            .set_value(&config.seen_store, &config.seen_key, &json!([123, "456"]))
            .await
            .unwrap();

        let seen = SeenSet::load(&store, &config).await.unwrap();
        assert!(seen.contains("123"));
        assert!(seen.contains("456"));
    }

    #[tokio::test]
    async fn non_array_record_is_rejected() {
        let store = MemoryStorage::new();
        let config = StorageConfig::default();
        store
            .set_value(&config.seen_store, &config.seen_key, &json!({"ids": []}))
            .await
            .unwrap();

        assert!(SeenSet::load(&store, &config).await.is_err());
    }
}
