//! Persistent key-value area scoped to one extension install.
//!
//! Only the background relay touches the profile document key. Every other
//! component reaches it through messages.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Key holding the profile document.
pub const CURRENT_RESUME_KEY: &str = "currentResume";

const CHANGE_FEED_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One committed change, as seen by change-feed subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Overwrites `key`. No merge with the previous value.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Subscribes to committed changes. Writes that leave a value unchanged
    /// are not reported.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// Fan-out of committed changes shared by the store backends.
#[derive(Debug)]
pub(crate) struct ChangeFeed {
    tx: broadcast::Sender<StorageChange>,
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.tx.subscribe()
    }

    pub(crate) fn publish(&self, key: &str, old_value: Option<Value>, new_value: Option<Value>) {
        if old_value == new_value {
            return;
        }
        // No subscribers is fine.
        let _ = self.tx.send(StorageChange {
            key: key.to_string(),
            old_value,
            new_value,
        });
    }
}
