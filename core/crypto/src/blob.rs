//! The `EncryptedBlob` wire format.
//!
//! `{ "ciphertext": base64, "iv": base64, "salt": base64 }` is the only
//! form in which a secret is persisted or sent to the remote service.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::keys::Salt;
use sealpass_common::{Error, Result};

/// Ciphertext, IV and salt, each base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// AES-GCM ciphertext with the 16-byte tag appended.
    pub ciphertext: String,
    /// 12-byte IV, fresh for every encryption.
    pub iv: String,
    /// Salt of the key epoch the blob was sealed under.
    pub salt: String,
}

impl EncryptedBlob {
    /// Build a blob from raw parts.
    pub fn from_parts(ciphertext: &[u8], iv: &[u8], salt: &Salt) -> Self {
        Self {
            ciphertext: STANDARD.encode(ciphertext),
            iv: STANDARD.encode(iv),
            salt: salt.to_base64(),
        }
    }

    /// Decode the ciphertext field.
    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.ciphertext)
            .map_err(|e| Error::Serialization(format!("Invalid ciphertext encoding: {}", e)))
    }

    /// Decode the IV field.
    pub fn iv_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.iv)
            .map_err(|e| Error::Serialization(format!("Invalid IV encoding: {}", e)))
    }

    /// Decode the salt field.
    pub fn salt(&self) -> Result<Salt> {
        Salt::from_base64(&self.salt)
    }

    /// Serialize to a JSON string (the form embedded in credential records).
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let salt = Salt::from_bytes([1u8; 16]);
        let blob = EncryptedBlob::from_parts(b"ct", &[0u8; 12], &salt);
        let json = blob.to_json_string().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert!(object.contains_key("ciphertext"));
        assert!(object.contains_key("iv"));
        assert!(object.contains_key("salt"));
    }

    #[test]
    fn test_salt_field_decodes() {
        let salt = Salt::from_bytes([4u8; 16]);
        let blob = EncryptedBlob::from_parts(b"ct", &[0u8; 12], &salt);
        assert_eq!(blob.salt().unwrap(), salt);
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(EncryptedBlob::from_json_str("{\"ciphertext\": 1}").is_err());
    }
}
