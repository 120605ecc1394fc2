//! The vault facade.
//!
//! [`VaultService`] is the single entry point a front end talks to. It wires
//! the session, the credential store, the rotation coordinator and the
//! auto-lock together, and resets the idle timer on each operation.

use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::autolock::AutoLock;
use crate::config::VaultConfig;
use crate::events::{SyncEvent, SyncOutbox};
use crate::record::{CredentialDraft, CredentialPatch, CredentialRecord, PlainCredential};
use crate::rotation::RotationCoordinator;
use crate::session::{SessionManager, VaultStatus};
use crate::store::VaultStore;
use sealpass_common::{RecordId, Result};
use sealpass_crypto::Salt;
use sealpass_storage::KvStore;

/// One vault, one owner.
///
/// All mutations through a service instance are serialized. Run a single
/// service per store.
pub struct VaultService {
    session: Arc<SessionManager>,
    vault: Arc<VaultStore>,
    rotation: RotationCoordinator,
    autolock: Option<AutoLock>,
    outbox: SyncOutbox,
}

impl VaultService {
    /// Build a service over `store` that discards sync events.
    ///
    /// Starts the auto-lock watcher when an idle timeout is configured, so
    /// this must be called from within a Tokio runtime.
    pub fn new(store: Arc<dyn KvStore>, config: VaultConfig) -> Result<Self> {
        Self::with_outbox(store, config, SyncOutbox::disabled())
    }

    /// Build a service that queues a sync event for every committed change.
    pub fn with_outbox(
        store: Arc<dyn KvStore>,
        config: VaultConfig,
        outbox: SyncOutbox,
    ) -> Result<Self> {
        config.validate()?;
        let idle_timeout = config.idle_timeout();

        let session = Arc::new(SessionManager::new(store, config));
        let vault = Arc::new(VaultStore::new(session.clone()).with_outbox(outbox.clone()));
        let rotation = RotationCoordinator::new(session.clone(), vault.clone());
        let autolock = idle_timeout.map(|idle| AutoLock::spawn(Arc::downgrade(&session), idle));

        Ok(Self {
            session,
            vault,
            rotation,
            autolock,
            outbox,
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    fn touch(&self) {
        if let Some(autolock) = &self.autolock {
            autolock.touch();
        }
    }

    /// Current state. Does not count as activity.
    pub async fn status(&self) -> Result<VaultStatus> {
        self.session.status().await
    }

    /// Does not count as activity.
    pub async fn is_unlocked(&self) -> bool {
        self.session.is_unlocked().await
    }

    pub async fn initialize_vault(&self, password: &str) -> Result<()> {
        self.touch();
        let salt = self.session.initialize(password).await?;
        self.emit_salt(&salt);
        Ok(())
    }

    pub async fn unlock_vault(&self, password: &str) -> Result<()> {
        self.touch();
        self.session.unlock(password).await
    }

    /// Resume from a persisted wrapped key. See [`SessionManager::hydrate`].
    pub async fn hydrate(&self) -> Result<bool> {
        self.touch();
        self.session.hydrate().await
    }

    pub async fn lock_vault(&self) -> Result<()> {
        self.touch();
        self.session.lock().await
    }

    /// Lock and forget the remote authentication state.
    pub async fn logout(&self) -> Result<()> {
        self.touch();
        self.session.logout().await
    }

    pub async fn get_credentials(&self) -> Result<Vec<CredentialRecord>> {
        self.touch();
        self.vault.get_all().await
    }

    pub async fn credentials_for_domain(&self, domain: &str) -> Result<Vec<CredentialRecord>> {
        self.touch();
        self.vault.find_by_domain(domain).await
    }

    pub async fn get_decrypted_password(&self, id: RecordId) -> Result<Zeroizing<String>> {
        self.touch();
        self.vault.decrypt_password(id).await
    }

    pub async fn add_credential(&self, draft: CredentialDraft) -> Result<CredentialRecord> {
        self.touch();
        self.vault.add(draft).await
    }

    pub async fn update_credential(
        &self,
        id: RecordId,
        patch: CredentialPatch,
    ) -> Result<CredentialRecord> {
        self.touch();
        self.vault.update(id, patch).await
    }

    /// # Returns
    /// `false` if no credential had that id.
    pub async fn delete_credential(&self, id: RecordId) -> Result<bool> {
        self.touch();
        self.vault.delete(id).await
    }

    /// Rotate the master password and re-encrypt every credential.
    pub async fn change_master_password(&self, old: &str, new: &str) -> Result<()> {
        self.touch();
        self.rotation.rotate(old, new).await?;
        Ok(())
    }

    /// Append credentials from a plain export.
    ///
    /// Entries without a domain, username or password are skipped.
    ///
    /// # Returns
    /// Number of credentials added.
    pub async fn import_credentials(&self, entries: Vec<PlainCredential>) -> Result<usize> {
        self.touch();
        let total = entries.len();
        let drafts: Vec<CredentialDraft> = entries
            .into_iter()
            .map(CredentialDraft::from)
            .filter(CredentialDraft::is_complete)
            .collect();
        if drafts.len() < total {
            debug!(skipped = total - drafts.len(), "Skipping incomplete import entries");
        }
        let added = self.vault.add_many(drafts).await?;
        info!(count = added.len(), "Credentials imported");
        Ok(added.len())
    }

    /// Replace every credential, e.g. with a copy pulled from the sync
    /// service. Queues no sync events.
    pub async fn replace_credentials(&self, records: Vec<CredentialRecord>) -> Result<()> {
        self.touch();
        self.vault.replace_all(records).await
    }

    /// Every credential with its password in clear.
    pub async fn export_credentials(&self) -> Result<Vec<PlainCredential>> {
        self.touch();
        self.vault.export().await
    }

    fn emit_salt(&self, salt: &Salt) {
        self.outbox.emit(SyncEvent::SaltChanged {
            salt: salt.to_base64(),
        });
    }
}
