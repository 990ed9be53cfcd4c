//! In-memory storage, for dry runs and tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::ListingRecord;
use crate::storage::{KeyValueStore, ListingSink, check_name};

type Records = HashMap<(String, String), Value>;

/// Keeps records and dataset items in process memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: Mutex<Records>,
    items: Mutex<Vec<ListingRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items pushed so far, in push order.
    pub fn items(&self) -> Vec<ListingRecord> {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }

    fn records(&self) -> Result<MutexGuard<'_, Records>> {
        self.records
            .lock()
            .map_err(|_| AppError::storage("record store lock poisoned"))
    }

    fn dataset(&self) -> Result<MutexGuard<'_, Vec<ListingRecord>>> {
        self.items
            .lock()
            .map_err(|_| AppError::storage("dataset lock poisoned"))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStorage {
    async fn get_value(&self, store: &str, key: &str) -> Result<Option<Value>> {
        check_name("store", store)?;
        check_name("key", key)?;
        Ok(self
            .records()?
            .get(&(store.to_string(), key.to_string()))
            .cloned())
    }

    async fn set_value(&self, store: &str, key: &str, value: &Value) -> Result<()> {
        check_name("store", store)?;
        check_name("key", key)?;
        self.records()?
            .insert((store.to_string(), key.to_string()), value.clone());
        Ok(())
    }
}

#[async_trait]
impl ListingSink for MemoryStorage {
    async fn push(&self, record: &ListingRecord) -> Result<()> {
        self.dataset()?.push(record.clone());
        Ok(())
    }
}
