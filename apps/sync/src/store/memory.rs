use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use super::{ChangeFeed, PersistentStore, StorageChange, StoreError};

/// Process-local store. Used when no `STORAGE_PATH` is configured and in tests.
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            feed: ChangeFeed::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let old = entries.insert(key.to_string(), value.clone());
        self.feed.publish(key, old, Some(value));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let old = entries.remove(key);
        self.feed.publish(key, old, None);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_overwrites_without_merge() {
        let store = MemoryStore::new();
        store.set("k", json!({ "a": 1, "b": 2 })).await.unwrap();
        store.set("k", json!({ "c": 3 })).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({ "c": 3 })));
    }

    #[tokio::test]
    async fn test_missing_key_reads_as_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_change_feed_reports_old_and_new() {
        let store = MemoryStore::new();
        let mut changes = store.subscribe();

        store.set("k", json!(1)).await.unwrap();
        store.set("k", json!(1)).await.unwrap(); // unchanged, not reported
        store.set("k", json!(2)).await.unwrap();
        store.remove("k").await.unwrap();

        let first = changes.recv().await.unwrap();
        assert_eq!(first.old_value, None);
        assert_eq!(first.new_value, Some(json!(1)));

        let second = changes.recv().await.unwrap();
        assert_eq!(second.old_value, Some(json!(1)));
        assert_eq!(second.new_value, Some(json!(2)));

        let third = changes.recv().await.unwrap();
        assert_eq!(third.key, "k");
        assert_eq!(third.new_value, None);

        assert!(changes.try_recv().is_err());
    }
}
