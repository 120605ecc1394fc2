//! File-backed key-value store.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::provider::KvStore;
use sealpass_common::{Error, Result};

/// Key-value store persisted as a single JSON document.
///
/// Every write serializes the whole document to a temporary sibling file and
/// renames it over the original, so readers never observe a torn write.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

impl FileStore {
    /// Open the store at `path`, creating parent directories as needed.
    ///
    /// # Postconditions
    /// - Existing contents are loaded into memory
    /// - A missing file is treated as an empty store
    ///
    /// # Errors
    /// - Permission denied
    /// - The file exists but is not a JSON object
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let entries = if fs::try_exists(&path).await? {
            let content = fs::read(&path).await?;
            if content.is_empty() {
                Map::new()
            } else {
                serde_json::from_slice(&content).map_err(|e| {
                    Error::Serialization(format!("Corrupt store {}: {}", path.display(), e))
                })?
            }
        } else {
            Map::new()
        };

        debug!(path = %path.display(), keys = entries.len(), "Opened file store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `entries` to disk atomically.
    async fn persist(&self, entries: &Map<String, Value>) -> Result<()> {
        let data =
            serde_json::to_vec_pretty(entries).map_err(|e| Error::Serialization(e.to_string()))?;

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        let tmp_path = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        let file = create_private(&tmp_path).await?;
        let written = match write_all_synced(file, &data).await {
            Ok(()) => fs::rename(&tmp_path, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    /// Apply `change` to a copy of the entries, persist it, then publish it.
    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Map<String, Value>) + Send,
    {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        change(&mut next);
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }
}

/// Create `path` readable and writable by the owner only. Fails if it exists.
async fn create_private(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    Ok(options.open(path).await?)
}

async fn write_all_synced(mut file: File, data: &[u8]) -> std::io::Result<()> {
    file.write_all(data).await?;
    file.sync_all().await
}

#[async_trait]
impl KvStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let key = key.to_string();
        self.update(move |entries| {
            entries.insert(key, value);
        })
        .await
    }

    async fn set_many(&self, values: Vec<(String, Value)>) -> Result<()> {
        self.update(move |entries| {
            for (key, value) in values {
                entries.insert(key, value);
            }
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if !self.entries.lock().await.contains_key(key) {
            return Ok(());
        }
        let key = key.to_string();
        self.update(move |entries| {
            entries.remove(&key);
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.update(|entries| entries.clear()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path().join("store.json"))
            .await
            .unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let (store, _temp) = open_store().await;

        store.set("masterSalt", json!("c2FsdA==")).await.unwrap();
        assert_eq!(
            store.get("masterSalt").await.unwrap(),
            Some(json!("c2FsdA=="))
        );

        store.remove("masterSalt").await.unwrap();
        assert_eq!(store.get("masterSalt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let (store, temp) = open_store().await;
        store
            .set_many(vec![
                ("vault".into(), json!({"ciphertext": "x"})),
                ("masterSalt".into(), json!("y")),
            ])
            .await
            .unwrap();
        drop(store);

        let reopened = FileStore::open(temp.path().join("store.json"))
            .await
            .unwrap();
        assert_eq!(
            reopened.get("vault").await.unwrap(),
            Some(json!({"ciphertext": "x"}))
        );
        assert_eq!(reopened.get("masterSalt").await.unwrap(), Some(json!("y")));
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (store, temp) = open_store().await;
        store.set("a", json!(1)).await.unwrap();
        store.set("b", json!(2)).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["store.json".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (store, temp) = open_store().await;
        let path = temp.path().join("store.json");
        std::fs::write(&path, b"{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        store.set("persistedVaultKey", json!({"key": "k"})).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_corrupt_file_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        std::fs::write(&path, b"not json").unwrap();

        assert!(FileStore::open(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_clear() {
        let (store, temp) = open_store().await;
        store.set("a", json!(1)).await.unwrap();
        store.clear().await.unwrap();

        let reopened = FileStore::open(temp.path().join("store.json"))
            .await
            .unwrap();
        assert_eq!(reopened.get("a").await.unwrap(), None);
    }
}
