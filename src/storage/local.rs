//! Local filesystem storage implementation.
//!
//! Key-value records live under `key_value_stores/{store}/{key}.json` and
//! dataset items under `datasets/{name}/{index:09}.json`. Every file is
//! written to a temp sibling first and then renamed into place.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::ListingRecord;
use crate::storage::{KeyValueStore, ListingSink, check_name};

/// Local filesystem storage backend.
#[derive(Debug)]
pub struct LocalStorage {
    root_dir: PathBuf,
    dataset: String,
    last_item: AtomicUsize,
}

impl LocalStorage {
    /// Open storage rooted at `root_dir`, appending to the named dataset.
    ///
    /// Item numbering continues after the highest index already on disk.
    pub async fn open(root_dir: impl Into<PathBuf>, dataset: &str) -> Result<Self> {
        check_name("dataset", dataset)?;
        let root_dir = root_dir.into();
        let last = Self::highest_index(&root_dir.join("datasets").join(dataset)).await?;

        Ok(Self {
            root_dir,
            dataset: dataset.to_string(),
            last_item: AtomicUsize::new(last),
        })
    }

    /// Root directory of this storage.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn record_key(store: &str, key: &str) -> Result<String> {
        check_name("store", store)?;
        check_name("key", key)?;
        Ok(format!("key_value_stores/{store}/{key}.json"))
    }

    fn item_key(&self, index: usize) -> String {
        format!("datasets/{}/{:09}.json", self.dataset, index)
    }

    /// Highest numeric item file name in a dataset directory, 0 if none.
    async fn highest_index(dir: &Path) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut highest = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(index) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<usize>().ok())
            {
                highest = highest.max(index);
            }
        }
        Ok(highest)
    }

    /// Number of items in the dataset.
    pub async fn dataset_count(&self) -> Result<usize> {
        let dir = self.path(&format!("datasets/{}", self.dataset));
        Self::highest_index(&dir).await
    }

    /// All dataset items in push order.
    pub async fn dataset_items(&self) -> Result<Vec<ListingRecord>> {
        let count = self.last_item.load(Ordering::SeqCst);
        let mut items = Vec::with_capacity(count);
        for index in 1..=count {
            if let Some(item) = self.read_json(&self.item_key(index)).await? {
                items.push(item);
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl KeyValueStore for LocalStorage {
    async fn get_value(&self, store: &str, key: &str) -> Result<Option<Value>> {
        self.read_json(&Self::record_key(store, key)?).await
    }

    async fn set_value(&self, store: &str, key: &str, value: &Value) -> Result<()> {
        self.write_json(&Self::record_key(store, key)?, value).await
    }
}

#[async_trait]
impl ListingSink for LocalStorage {
    async fn push(&self, record: &ListingRecord) -> Result<()> {
        let index = self.last_item.fetch_add(1, Ordering::SeqCst) + 1;
        self.write_json(&self.item_key(index), record).await
    }
}
