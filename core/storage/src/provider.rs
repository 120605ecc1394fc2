//! Key-value store trait definition.

use async_trait::async_trait;
use serde_json::Value;

use sealpass_common::Result;

/// Persistent key-value store.
///
/// Implementations must be safe to share between tasks. Individual calls are
/// atomic; [`KvStore::set_many`] is atomic across all of its entries.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get the store name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Read a value.
    ///
    /// # Returns
    /// `None` if the key has never been written or was removed.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Write several values at once.
    ///
    /// # Postconditions
    /// - Either every entry is persisted or none is
    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove every key.
    async fn clear(&self) -> Result<()>;
}
