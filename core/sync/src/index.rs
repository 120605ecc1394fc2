//! Local-to-remote id mapping.
//!
//! The remote service assigns its own ids. The mapping is persisted so that
//! updates and deletes made in a later run reach the right remote entry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use sealpass_common::{Error, RecordId, Result};
use sealpass_storage::{keys, KvStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteIndex {
    ids: HashMap<RecordId, String>,
}

impl RemoteIndex {
    pub async fn load(store: &dyn KvStore) -> Result<Self> {
        match store.get(keys::REMOTE_IDS).await? {
            None => Ok(Self::default()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| Error::Serialization(format!("Invalid remote id index: {}", e))),
        }
    }

    pub async fn save(&self, store: &dyn KvStore) -> Result<()> {
        let value = serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))?;
        store.set(keys::REMOTE_IDS, value).await
    }

    pub fn get(&self, id: &RecordId) -> Option<&str> {
        self.ids.get(id).map(String::as_str)
    }

    pub fn insert(&mut self, id: RecordId, remote_id: String) {
        self.ids.insert(id, remote_id);
    }

    pub fn remove(&mut self, id: &RecordId) -> Option<String> {
        self.ids.remove(id)
    }

    /// Remote id to local id.
    pub fn local_ids(&self) -> HashMap<&str, RecordId> {
        self.ids
            .iter()
            .map(|(local, remote)| (remote.as_str(), *local))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
