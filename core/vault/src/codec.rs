//! Sealing and opening the vault blob.
//!
//! The full record list is serialized to JSON and encrypted as a single
//! [`EncryptedBlob`] stored under the `vault` key.

use serde_json::Value;
use zeroize::Zeroizing;

use crate::record::CredentialRecord;
use sealpass_common::{Error, Result};
use sealpass_crypto::{decrypt, encrypt, EncryptedBlob, Salt, SessionKey};
use sealpass_storage::{keys, KvStore};

/// Read the stored vault blob, if any.
///
/// A stored value that is not a blob is reported as
/// [`Error::DecryptionFailed`].
pub async fn read_blob(store: &dyn KvStore) -> Result<Option<EncryptedBlob>> {
    match store.get(keys::VAULT).await? {
        None => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|_| Error::DecryptionFailed),
    }
}

/// Encrypt a record list into a vault blob.
pub fn seal(records: &[CredentialRecord], key: &SessionKey, salt: &Salt) -> Result<EncryptedBlob> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(records).map_err(|e| Error::Serialization(e.to_string()))?,
    );
    encrypt(&plaintext, key, salt)
}

/// Decrypt a vault blob into its record list.
pub fn open(blob: &EncryptedBlob, key: &SessionKey) -> Result<Vec<CredentialRecord>> {
    let plaintext = Zeroizing::new(decrypt(blob, key)?);
    serde_json::from_slice(&plaintext)
        .map_err(|e| Error::Serialization(format!("Corrupt vault contents: {}", e)))
}

/// Store entry for `blob`, for use in an atomic multi-key commit.
pub fn entry(blob: &EncryptedBlob) -> Result<(String, Value)> {
    let value = serde_json::to_value(blob).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok((keys::VAULT.to_string(), value))
}
