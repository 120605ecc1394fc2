//! Change notifications for remote synchronization.
//!
//! The vault never talks to the network. Each committed change drops a
//! [`SyncEvent`] into an outbox before the mutation queue is released, so
//! events arrive in commit order. Whoever owns the receiving end decides
//! whether and when to push them.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::record::CredentialRecord;
use sealpass_common::{RecordId, Result};
use sealpass_crypto::EncryptedBlob;

/// A credential as the remote service stores it.
///
/// Only ciphertext leaves the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub domain: String,
    pub username: String,
    pub encrypted_password: EncryptedBlob,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl RemoteEntry {
    pub fn from_record(record: &CredentialRecord) -> Result<Self> {
        Ok(Self {
            domain: record.domain.clone(),
            username: record.username.clone(),
            encrypted_password: record.password_blob()?,
            notes: record.notes.clone(),
        })
    }
}

/// A committed local change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Created { id: RecordId, entry: RemoteEntry },
    Updated { id: RecordId, entry: RemoteEntry },
    Deleted { id: RecordId },
    /// The master salt changed (base64).
    SaltChanged { salt: String },
}

impl SyncEvent {
    /// `Created` event for a newly committed record.
    ///
    /// `None` if the record's password blob cannot be parsed.
    pub fn created(record: &CredentialRecord) -> Option<Self> {
        remote_entry(record).map(|entry| SyncEvent::Created {
            id: record.id,
            entry,
        })
    }

    /// `Updated` event for a changed record.
    pub fn updated(record: &CredentialRecord) -> Option<Self> {
        remote_entry(record).map(|entry| SyncEvent::Updated {
            id: record.id,
            entry,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::Created { .. } => "created",
            SyncEvent::Updated { .. } => "updated",
            SyncEvent::Deleted { .. } => "deleted",
            SyncEvent::SaltChanged { .. } => "salt_changed",
        }
    }
}

fn remote_entry(record: &CredentialRecord) -> Option<RemoteEntry> {
    match RemoteEntry::from_record(record) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(id = %record.id, error = %e, "Skipping sync event for unreadable record");
            None
        }
    }
}

/// Sending side of the sync event queue.
///
/// Emitting never blocks and never fails; with no receiver attached the
/// event is discarded.
#[derive(Debug, Clone, Default)]
pub struct SyncOutbox {
    sender: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl SyncOutbox {
    /// Create an outbox and the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// An outbox that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: SyncEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        trace!(kind = event.kind(), "Queueing sync event");
        if sender.send(event).is_err() {
            trace!("Sync receiver gone, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sealpass_crypto::Salt;

    #[test]
    fn test_remote_entry_shape() {
        let blob = EncryptedBlob::from_parts(b"ct", &[0u8; 12], &Salt::generate());
        let now = Utc::now();
        let record = CredentialRecord {
            id: RecordId::new(),
            domain: "example.com".to_string(),
            username: "alice".to_string(),
            encrypted_password: blob.to_json_string().unwrap(),
            notes: None,
            created_at: now,
            updated_at: now,
        };

        let entry = RemoteEntry::from_record(&record).unwrap();
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["domain"], "example.com");
        assert_eq!(value["encryptedPassword"]["ciphertext"], blob.ciphertext);
        assert!(value.get("notes").is_none());
    }

    #[tokio::test]
    async fn test_outbox_delivers_in_order() {
        let (outbox, mut receiver) = SyncOutbox::channel();
        let id = RecordId::new();
        outbox.emit(SyncEvent::Deleted { id });
        outbox.emit(SyncEvent::SaltChanged {
            salt: "c2FsdA==".to_string(),
        });

        assert_eq!(receiver.recv().await, Some(SyncEvent::Deleted { id }));
        assert_eq!(receiver.recv().await.map(|e| e.kind()), Some("salt_changed"));
    }

    #[test]
    fn test_emit_without_receiver() {
        SyncOutbox::disabled().emit(SyncEvent::Deleted { id: RecordId::new() });

        let (outbox, receiver) = SyncOutbox::channel();
        drop(receiver);
        outbox.emit(SyncEvent::Deleted { id: RecordId::new() });
    }
}
