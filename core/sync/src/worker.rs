//! Outbox consumer.
//!
//! The worker drains [`SyncEvent`]s emitted by the vault service and applies
//! them to the remote vault. Failures are logged and counted, never
//! propagated: local state is authoritative and already committed.
//!
//! [`SyncWorker::pull`] goes the other way and replaces the local vault with
//! the remote copy.

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::auth::AuthState;
use crate::client::RemoteVault;
use crate::index::RemoteIndex;
use crate::retry::{RetryConfig, RetryExecutor};
use sealpass_common::{Error, RecordId, Result};
use sealpass_storage::KvStore;
use sealpass_vault::{RemoteEntry, SyncEvent, VaultService};

/// Outcome of a worker run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Events applied remotely.
    pub applied: usize,
    /// Events that failed after retries.
    pub failed: usize,
    /// Events not attempted because the remote rejected our credentials.
    pub skipped: usize,
}

pub struct SyncWorker {
    remote: Arc<dyn RemoteVault>,
    store: Arc<dyn KvStore>,
    retry: RetryExecutor,
}

impl SyncWorker {
    pub fn new(remote: Arc<dyn RemoteVault>, store: Arc<dyn KvStore>, retry: RetryConfig) -> Self {
        Self {
            remote,
            store,
            retry: RetryExecutor::new(retry),
        }
    }

    /// Apply events until every sender is gone.
    ///
    /// If the remote rejects the token, the stored auth state is cleared and
    /// the remaining queued events are skipped.
    pub async fn run(&self, mut receiver: UnboundedReceiver<SyncEvent>) -> SyncStats {
        let mut stats = SyncStats::default();
        let mut index = self.load_index().await;

        while let Some(event) = receiver.recv().await {
            let kind = event.kind();
            match self.apply(&mut index, event).await {
                Ok(()) => stats.applied += 1,
                Err(Error::Authentication(reason)) => {
                    warn!(%reason, "Remote rejected credentials, signing out");
                    if let Err(e) = AuthState::clear(self.store.as_ref()).await {
                        warn!(error = %e, "Failed to clear auth state");
                    }
                    stats.failed += 1;
                    receiver.close();
                    while receiver.recv().await.is_some() {
                        stats.skipped += 1;
                    }
                }
                Err(e) => {
                    warn!(kind, error = %e, "Sync event failed");
                    stats.failed += 1;
                }
            }
        }

        info!(
            applied = stats.applied,
            failed = stats.failed,
            skipped = stats.skipped,
            "Sync finished"
        );
        stats
    }

    /// Replace the local vault with the remote copy.
    ///
    /// Entries already mapped keep their local id; the rest get a new one.
    /// The remote id index is rebuilt from the listing, which drops mappings
    /// for entries deleted remotely. No sync events are queued.
    ///
    /// # Returns
    /// Number of credentials now stored locally.
    ///
    /// # Errors
    /// - `VaultLocked` if `vault` is locked
    /// - `DecryptionFailed` if any entry does not open under the session key;
    ///   nothing is written
    pub async fn pull(&self, vault: &VaultService) -> Result<usize> {
        let listing = self.retry.execute(|| self.remote.list()).await?;
        let previous = self.load_index().await;
        let known = previous.local_ids();

        let mut index = RemoteIndex::default();
        let records = listing
            .iter()
            .map(|remote| {
                let id = known
                    .get(remote.id.as_str())
                    .copied()
                    .unwrap_or_else(RecordId::new);
                index.insert(id, remote.id.clone());
                remote.to_credential(id)
            })
            .collect::<Result<Vec<_>>>()?;

        let count = records.len();
        vault.replace_credentials(records).await?;
        index.save(self.store.as_ref()).await?;

        info!(count, "Pulled remote vault");
        Ok(count)
    }

    async fn load_index(&self) -> RemoteIndex {
        match RemoteIndex::load(self.store.as_ref()).await {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Remote id index unreadable, starting empty");
                RemoteIndex::default()
            }
        }
    }

    async fn apply(&self, index: &mut RemoteIndex, event: SyncEvent) -> Result<()> {
        match event {
            SyncEvent::Created { id, entry } => self.push_new(index, id, &entry).await,
            SyncEvent::Updated { id, entry } => {
                let Some(remote_id) = index.get(&id).map(str::to_string) else {
                    return self.push_new(index, id, &entry).await;
                };
                match self
                    .retry
                    .execute(|| self.remote.update(&remote_id, &entry))
                    .await
                {
                    Ok(_) => Ok(()),
                    Err(Error::RecordNotFound(_)) => {
                        debug!(%id, "Remote entry vanished, recreating");
                        self.push_new(index, id, &entry).await
                    }
                    Err(e) => Err(e),
                }
            }
            SyncEvent::Deleted { id } => {
                let Some(remote_id) = index.get(&id).map(str::to_string) else {
                    debug!(%id, "Deleted record was never synced");
                    return Ok(());
                };
                match self.retry.execute(|| self.remote.delete(&remote_id)).await {
                    Ok(()) | Err(Error::RecordNotFound(_)) => {}
                    Err(e) => return Err(e),
                }
                index.remove(&id);
                index.save(self.store.as_ref()).await
            }
            SyncEvent::SaltChanged { salt } => {
                self.retry.execute(|| self.remote.set_salt(&salt)).await
            }
        }
    }

    async fn push_new(
        &self,
        index: &mut RemoteIndex,
        id: RecordId,
        entry: &RemoteEntry,
    ) -> Result<()> {
        let record = self.retry.execute(|| self.remote.create(entry)).await?;
        index.insert(id, record.id);
        index.save(self.store.as_ref()).await
    }
}
