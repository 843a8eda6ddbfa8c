use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use super::{ChangeFeed, PersistentStore, StorageChange, StoreError};

/// Store backed by a single JSON object on disk.
///
/// The whole object is rewritten on every change: written to a sibling temp
/// file first, then renamed over the original, so a crash mid-write leaves
/// the previous state intact.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, Value>>,
    feed: ChangeFeed,
}

impl FileStore {
    /// Opens the store at `path`, creating parent directories as needed.
    /// A missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => HashMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Opened file store at {} ({} keys)",
            path.display(),
            entries.len()
        );

        Ok(Self {
            path,
            entries: Mutex::new(entries),
            feed: ChangeFeed::new(),
        })
    }

    async fn persist(&self, entries: &HashMap<String, Value>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Persisted {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl PersistentStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        let old = next.insert(key.to_string(), value.clone());
        self.persist(&next).await?;
        *entries = next;
        self.feed.publish(key, old, Some(value));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        let old = next.remove(key);
        self.persist(&next).await?;
        *entries = next;
        self.feed.publish(key, old, None);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.feed.subscribe()
    }
}
