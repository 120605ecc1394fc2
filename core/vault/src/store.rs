//! Credential storage over the encrypted vault blob.
//!
//! Every mutation is a read-decrypt-modify-encrypt-write cycle of the whole
//! vault. Cycles run one at a time through a FIFO queue, so concurrent adds
//! never lose each other's writes. Sync events for a cycle are queued before
//! the next cycle starts.

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::codec;
use crate::events::{SyncEvent, SyncOutbox};
use crate::record::{CredentialDraft, CredentialPatch, CredentialRecord, PlainCredential};
use crate::session::{SessionManager, VaultSession};
use sealpass_common::{Error, RecordId, Result};
use sealpass_crypto::{decrypt_str, encrypt_str};
use sealpass_storage::KvStore;

/// Credential CRUD on an unlocked vault.
pub struct VaultStore {
    session: Arc<SessionManager>,
    store: Arc<dyn KvStore>,
    queue: Mutex<()>,
    outbox: SyncOutbox,
}

impl VaultStore {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            store: session.store().clone(),
            session,
            queue: Mutex::new(()),
            outbox: SyncOutbox::disabled(),
        }
    }

    /// Queue a sync event for every committed change.
    pub fn with_outbox(mut self, outbox: SyncOutbox) -> Self {
        self.outbox = outbox;
        self
    }

    pub(crate) fn outbox(&self) -> &SyncOutbox {
        &self.outbox
    }

    /// All records, in insertion order.
    pub async fn get_all(&self) -> Result<Vec<CredentialRecord>> {
        let session = self.session.active().await?;
        self.load(&session).await
    }

    pub async fn get(&self, id: RecordId) -> Result<CredentialRecord> {
        self.get_all()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))
    }

    /// Records whose domain matches `domain`.
    pub async fn find_by_domain(&self, domain: &str) -> Result<Vec<CredentialRecord>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|r| r.matches_domain(domain))
            .collect())
    }

    /// Decrypt the password of one record.
    pub async fn decrypt_password(&self, id: RecordId) -> Result<Zeroizing<String>> {
        let session = self.session.active().await?;
        let records = self.load(&session).await?;
        let record = records
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;
        decrypt_str(&record.password_blob()?, session.key())
    }

    /// Add a credential. Its id and timestamps are assigned here.
    pub async fn add(&self, draft: CredentialDraft) -> Result<CredentialRecord> {
        draft.validate()?;
        self.mutate(
            |session, records| {
                let record = seal_record(session, draft)?;
                records.push(record.clone());
                debug!(id = %record.id, "Credential added");
                Ok((record, true))
            },
            |record| SyncEvent::created(record).into_iter().collect(),
        )
        .await
    }

    /// Add several credentials in one cycle.
    pub async fn add_many(&self, drafts: Vec<CredentialDraft>) -> Result<Vec<CredentialRecord>> {
        for draft in &drafts {
            draft.validate()?;
        }
        self.mutate(
            |session, records| {
                let added = drafts
                    .into_iter()
                    .map(|draft| seal_record(session, draft))
                    .collect::<Result<Vec<_>>>()?;
                let changed = !added.is_empty();
                records.extend(added.iter().cloned());
                Ok((added, changed))
            },
            |added| added.iter().filter_map(SyncEvent::created).collect(),
        )
        .await
    }

    /// Apply a patch and bump `updated_at`.
    ///
    /// # Errors
    /// - `RecordNotFound` for an unknown id; nothing is written
    pub async fn update(&self, id: RecordId, patch: CredentialPatch) -> Result<CredentialRecord> {
        patch.validate()?;
        self.mutate(
            |session, records| {
                let record = records
                    .iter_mut()
                    .find(|r| r.id == id)
                    .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;

                if let Some(password) = &patch.password {
                    record.encrypted_password =
                        encrypt_str(password, session.key(), session.salt())?.to_json_string()?;
                }
                if let Some(domain) = &patch.domain {
                    record.domain = domain.trim().to_string();
                }
                if let Some(username) = patch.username {
                    record.username = username;
                }
                if let Some(notes) = patch.notes {
                    record.notes = Some(notes);
                }
                record.updated_at = CredentialRecord::timestamp_now().max(record.created_at);

                debug!(%id, "Credential updated");
                Ok((record.clone(), true))
            },
            |record| SyncEvent::updated(record).into_iter().collect(),
        )
        .await
    }

    /// Delete a credential.
    ///
    /// # Returns
    /// `false` if no record had that id; the vault is then left untouched.
    pub async fn delete(&self, id: RecordId) -> Result<bool> {
        self.mutate(
            |_, records| {
                let before = records.len();
                records.retain(|r| r.id != id);
                let removed = records.len() != before;
                if removed {
                    debug!(%id, "Credential deleted");
                }
                Ok((removed, removed))
            },
            |_| vec![SyncEvent::Deleted { id }],
        )
        .await
    }

    /// Replace the whole record list. No sync events are queued.
    ///
    /// # Errors
    /// - `DecryptionFailed` if any replacement password does not open under
    ///   the session key; nothing is written
    pub async fn replace_all(&self, replacement: Vec<CredentialRecord>) -> Result<()> {
        self.mutate(
            |session, records| {
                for record in &replacement {
                    decrypt_str(&record.password_blob()?, session.key())?;
                }
                *records = replacement;
                Ok(((), true))
            },
            |_| Vec::new(),
        )
        .await
    }

    /// Every credential with its password decrypted.
    pub async fn export(&self) -> Result<Vec<PlainCredential>> {
        let session = self.session.active().await?;
        let records = self.load(&session).await?;

        let exported = records
            .into_iter()
            .map(|r| {
                let password = decrypt_str(&r.password_blob()?, session.key())?;
                Ok(PlainCredential {
                    domain: r.domain,
                    username: r.username,
                    password,
                    notes: r.notes,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(count = exported.len(), "Credentials exported");
        Ok(exported)
    }

    /// Wait for the mutation queue. Held by a rotation for its whole run.
    pub(crate) async fn lock_queue(&self) -> MutexGuard<'_, ()> {
        self.queue.lock().await
    }

    /// Run one read-modify-write cycle.
    ///
    /// `op` returns its result and whether the records changed. Unchanged
    /// records are not written back. After a write, `events` turns the result
    /// into sync events, which are queued while the cycle still holds the
    /// queue.
    async fn mutate<T, F, E>(&self, op: F, events: E) -> Result<T>
    where
        F: FnOnce(&VaultSession, &mut Vec<CredentialRecord>) -> Result<(T, bool)>,
        E: FnOnce(&T) -> Vec<SyncEvent>,
    {
        let _queue = self.queue.lock().await;
        let session = self.session.active().await?;

        let mut records = self.load(&session).await?;
        let (value, changed) = op(&*session, &mut records)?;
        if changed {
            let blob = codec::seal(&records, session.key(), session.salt())?;
            let (name, sealed) = codec::entry(&blob)?;
            self.store.set(&name, sealed).await?;
            for event in events(&value) {
                self.outbox.emit(event);
            }
        }
        Ok(value)
    }

    async fn load(&self, session: &VaultSession) -> Result<Vec<CredentialRecord>> {
        match codec::read_blob(self.store.as_ref()).await? {
            Some(blob) => codec::open(&blob, session.key()),
            None => Ok(Vec::new()),
        }
    }
}

fn seal_record(session: &VaultSession, draft: CredentialDraft) -> Result<CredentialRecord> {
    let encrypted_password =
        encrypt_str(&draft.password, session.key(), session.salt())?.to_json_string()?;
    let now = CredentialRecord::timestamp_now();

    Ok(CredentialRecord {
        id: RecordId::new(),
        domain: draft.domain.trim().to_string(),
        username: draft.username.clone(),
        encrypted_password,
        notes: draft.notes.clone(),
        created_at: now,
        updated_at: now,
    })
}
