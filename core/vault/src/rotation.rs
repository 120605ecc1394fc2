//! Master password rotation.
//!
//! A rotation re-encrypts every stored password under a key derived from the
//! new password and a fresh salt. All work is staged in memory and committed
//! with a single multi-key write, so the store holds either the old epoch or
//! the new one, never a mix.

use std::sync::Arc;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::codec;
use crate::events::SyncEvent;
use crate::record::CredentialRecord;
use crate::salt_store::SaltStore;
use crate::session::{SessionManager, VaultSession};
use crate::store::VaultStore;
use sealpass_common::{Error, Result};
use sealpass_crypto::{decrypt_str, encrypt_str, Salt, SessionKey};

/// Result of a committed rotation.
#[derive(Debug, Clone)]
pub struct RotationReport {
    /// Salt of the new epoch.
    pub salt: Salt,
    /// Every record, re-encrypted under the new key.
    pub records: Vec<CredentialRecord>,
}

/// Changes the master password.
pub struct RotationCoordinator {
    session: Arc<SessionManager>,
    vault: Arc<VaultStore>,
}

impl RotationCoordinator {
    pub fn new(session: Arc<SessionManager>, vault: Arc<VaultStore>) -> Self {
        Self { session, vault }
    }

    /// Rotate from `old_password` to `new_password`.
    ///
    /// Vault mutations queue behind the rotation. On success the in-memory
    /// session holds the new key, and a `SaltChanged` event followed by one
    /// `Updated` event per record is queued before any later mutation runs.
    ///
    /// # Errors
    /// - `InvalidMasterPassword` if `old_password` does not open the vault
    /// - `RotationAborted` if any record cannot be re-encrypted or the commit
    ///   fails; the stored vault, salt and session are then unchanged
    pub async fn rotate(&self, old_password: &str, new_password: &str) -> Result<RotationReport> {
        if new_password.is_empty() {
            return Err(Error::InvalidInput(
                "new master password must not be empty".to_string(),
            ));
        }

        let _queue = self.vault.lock_queue().await;
        let store = self.session.store();

        let old_salt = self
            .session
            .salts()
            .load()
            .await?
            .ok_or(Error::VaultNotInitialized)?;
        let old_key = self.session.derive(old_password, old_salt).await?;

        let records = match codec::read_blob(store.as_ref()).await {
            Ok(Some(blob)) => codec::open(&blob, &old_key).map_err(|e| match e {
                Error::DecryptionFailed => Error::InvalidMasterPassword,
                other => other,
            })?,
            Ok(None) => Vec::new(),
            Err(Error::DecryptionFailed) => return Err(Error::InvalidMasterPassword),
            Err(e) => return Err(e),
        };

        let passwords = decrypt_all(&records, &old_key)?;
        drop(old_key);

        let new_salt = Salt::generate();
        let new_key = self
            .session
            .derive(new_password, new_salt)
            .await
            .map_err(|e| Error::RotationAborted(format!("key derivation failed: {}", e)))?;

        let rotated = reencrypt_all(records, &passwords, &new_key, &new_salt)?;
        drop(passwords);

        let blob = codec::seal(&rotated, &new_key, &new_salt)
            .map_err(|e| Error::RotationAborted(format!("vault encryption failed: {}", e)))?;
        let mut entries = vec![SaltStore::entry(&new_salt), codec::entry(&blob)?];
        if let Some(wrapped) = self.session.wrapped_key_entry(&new_key)? {
            entries.push(wrapped);
        }

        let mut session = self.session.write().await;
        if let Err(e) = store.set_many(entries).await {
            warn!(error = %e, "Rotation commit failed, keeping previous epoch");
            return Err(Error::RotationAborted(format!("commit failed: {}", e)));
        }
        *session = Some(VaultSession::new(new_key, new_salt));
        drop(session);

        info!(records = rotated.len(), "Master password rotated");
        let outbox = self.vault.outbox();
        outbox.emit(SyncEvent::SaltChanged {
            salt: new_salt.to_base64(),
        });
        for event in rotated.iter().filter_map(SyncEvent::updated) {
            outbox.emit(event);
        }

        Ok(RotationReport {
            salt: new_salt,
            records: rotated,
        })
    }
}

fn decrypt_all(records: &[CredentialRecord], key: &SessionKey) -> Result<Vec<Zeroizing<String>>> {
    records
        .iter()
        .map(|record| {
            record
                .password_blob()
                .and_then(|blob| decrypt_str(&blob, key))
                .map_err(|e| {
                    Error::RotationAborted(format!("record {} unreadable: {}", record.id, e))
                })
        })
        .collect()
}

fn reencrypt_all(
    records: Vec<CredentialRecord>,
    passwords: &[Zeroizing<String>],
    key: &SessionKey,
    salt: &Salt,
) -> Result<Vec<CredentialRecord>> {
    records
        .into_iter()
        .zip(passwords)
        .map(|(mut record, password)| {
            record.encrypted_password = encrypt_str(password, key, salt)
                .and_then(|blob| blob.to_json_string())
                .map_err(|e| {
                    Error::RotationAborted(format!("record {} not re-encrypted: {}", record.id, e))
                })?;
            Ok(record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CredentialDraft;
    use crate::session::tests::test_config;
    use async_trait::async_trait;
    use sealpass_storage::{keys, KvStore, MemoryStore};
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        store: MemoryStore,
        session: Arc<SessionManager>,
        vault: Arc<VaultStore>,
        rotation: RotationCoordinator,
    }

    async fn fixture_with(store: MemoryStore, backend: Arc<dyn KvStore>) -> Fixture {
        let session = Arc::new(SessionManager::new(backend, test_config()));
        session.initialize("old-password").await.unwrap();
        let vault = Arc::new(VaultStore::new(session.clone()));
        let rotation = RotationCoordinator::new(session.clone(), vault.clone());
        Fixture {
            store,
            session,
            vault,
            rotation,
        }
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        fixture_with(store.clone(), Arc::new(store)).await
    }

    /// Fails multi-key commits once armed.
    struct FailingCommitStore {
        inner: MemoryStore,
        armed: AtomicBool,
    }

    #[async_trait]
    impl KvStore for FailingCommitStore {
        fn name(&self) -> &str {
            "failing-commit"
        }

        async fn get(&self, key: &str) -> Result<Option<Value>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> Result<()> {
            self.inner.set(key, value).await
        }

        async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<()> {
            if self.armed.load(Ordering::SeqCst) {
                return Err(Error::Storage("disk full".to_string()));
            }
            self.inner.set_many(entries).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }

        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }
    }

    async fn snapshot(store: &MemoryStore) -> (Option<Value>, Option<Value>) {
        (
            store.get(keys::MASTER_SALT).await.unwrap(),
            store.get(keys::VAULT).await.unwrap(),
        )
    }

    #[tokio::test]
    async fn test_rotation_reencrypts_everything() {
        let f = fixture().await;
        let a = f
            .vault
            .add(CredentialDraft::new("a.com", "alice", "pw-a"))
            .await
            .unwrap();
        let b = f
            .vault
            .add(CredentialDraft::new("b.com", "bob", "pw-b"))
            .await
            .unwrap();
        let old_salt = *f.session.active().await.unwrap().salt();

        let report = f
            .rotation
            .rotate("old-password", "new-password")
            .await
            .unwrap();
        assert_ne!(report.salt, old_salt);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].created_at, a.created_at);
        assert_eq!(report.records[0].updated_at, a.updated_at);
        assert_ne!(report.records[0].encrypted_password, a.encrypted_password);

        assert_eq!(&*f.vault.decrypt_password(a.id).await.unwrap(), "pw-a");
        assert_eq!(&*f.vault.decrypt_password(b.id).await.unwrap(), "pw-b");

        f.session.lock().await.unwrap();
        assert!(matches!(
            f.session.unlock("old-password").await,
            Err(Error::InvalidMasterPassword)
        ));
        f.session.unlock("new-password").await.unwrap();
        assert_eq!(f.vault.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rotation_wrong_old_password() {
        let f = fixture().await;
        f.vault
            .add(CredentialDraft::new("a.com", "alice", "pw"))
            .await
            .unwrap();
        let before = snapshot(&f.store).await;

        assert!(matches!(
            f.rotation.rotate("nope", "new-password").await,
            Err(Error::InvalidMasterPassword)
        ));
        assert_eq!(snapshot(&f.store).await, before);
    }

    #[tokio::test]
    async fn test_rotation_aborts_on_unreadable_record() {
        let f = fixture().await;
        let good = f
            .vault
            .add(CredentialDraft::new("a.com", "alice", "pw"))
            .await
            .unwrap();
        let mut records = f.vault.get_all().await.unwrap();
        let mut broken = good.clone();
        broken.id = sealpass_common::RecordId::new();
        broken.encrypted_password = "corrupt".to_string();
        records.push(broken);
        f.vault.replace_all(records).await.unwrap();

        let before = snapshot(&f.store).await;
        let result = f.rotation.rotate("old-password", "new-password").await;
        assert!(matches!(result, Err(Error::RotationAborted(_))));
        assert_eq!(snapshot(&f.store).await, before);

        assert_eq!(&*f.vault.decrypt_password(good.id).await.unwrap(), "pw");
        f.session.lock().await.unwrap();
        f.session.unlock("old-password").await.unwrap();
    }

    #[tokio::test]
    async fn test_rotation_aborts_on_commit_failure() {
        let store = MemoryStore::new();
        let backend = Arc::new(FailingCommitStore {
            inner: store.clone(),
            armed: AtomicBool::new(false),
        });
        let f = fixture_with(store, backend.clone()).await;
        let record = f
            .vault
            .add(CredentialDraft::new("a.com", "alice", "pw"))
            .await
            .unwrap();
        let before = snapshot(&f.store).await;
        let wrapped_before = f.store.get(keys::PERSISTED_VAULT_KEY).await.unwrap();

        backend.armed.store(true, Ordering::SeqCst);
        let result = f.rotation.rotate("old-password", "new-password").await;
        assert!(matches!(result, Err(Error::RotationAborted(_))));

        assert_eq!(snapshot(&f.store).await, before);
        assert_eq!(
            f.store.get(keys::PERSISTED_VAULT_KEY).await.unwrap(),
            wrapped_before
        );
        assert_eq!(&*f.vault.decrypt_password(record.id).await.unwrap(), "pw");
    }

    #[tokio::test]
    async fn test_mutation_waits_for_rotation() {
        let f = fixture().await;
        let (rotated, added) = tokio::join!(
            f.rotation.rotate("old-password", "new-password"),
            async {
                tokio::task::yield_now().await;
                f.vault
                    .add(CredentialDraft::new("late.com", "carol", "pw"))
                    .await
            }
        );
        rotated.unwrap();
        let added = added.unwrap();

        assert_eq!(&*f.vault.decrypt_password(added.id).await.unwrap(), "pw");
        f.session.lock().await.unwrap();
        f.session.unlock("new-password").await.unwrap();
        assert_eq!(f.vault.get_all().await.unwrap().len(), 1);
    }
}
