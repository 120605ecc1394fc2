//! Persistence of the master salt.

use serde_json::Value;
use std::sync::Arc;

use sealpass_common::{Error, Result};
use sealpass_crypto::Salt;
use sealpass_storage::{keys, KvStore};

/// Reads and writes the current salt epoch.
///
/// The presence of a salt is what marks a vault as initialized.
#[derive(Clone)]
pub struct SaltStore {
    store: Arc<dyn KvStore>,
}

impl SaltStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Load the current salt, if the vault has been initialized.
    pub async fn load(&self) -> Result<Option<Salt>> {
        match self.store.get(keys::MASTER_SALT).await? {
            None => Ok(None),
            Some(Value::String(encoded)) => Salt::from_base64(&encoded).map(Some),
            Some(_) => Err(Error::Serialization(
                "master salt is not a string".to_string(),
            )),
        }
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.store.get(keys::MASTER_SALT).await?.is_some())
    }

    /// Store entry for `salt`, for use in an atomic multi-key commit.
    pub fn entry(salt: &Salt) -> (String, Value) {
        (keys::MASTER_SALT.to_string(), Value::String(salt.to_base64()))
    }
}
