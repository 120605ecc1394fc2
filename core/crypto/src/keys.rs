//! Key types with secure memory handling.
//!
//! Session keys zeroize their memory on drop so that a locked vault leaves
//! no key material behind.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use sealpass_common::{Error, Result};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LENGTH: usize = 32;

/// Length of a key-derivation salt in bytes.
pub const SALT_LENGTH: usize = 16;

/// Symmetric key derived from the master password.
///
/// Lives only in process memory, or base64-exported as a wrapped key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; KEY_LENGTH],
}

impl SessionKey {
    /// Create a session key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Export the raw key material as base64.
    pub fn export(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.key))
    }

    /// Import key material previously produced by [`SessionKey::export`].
    ///
    /// # Errors
    /// - Returns error if the input is not base64 or not KEY_LENGTH bytes
    pub fn import(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| Error::Crypto(format!("Invalid key encoding: {}", e)))?,
        );

        if bytes.len() != KEY_LENGTH {
            return Err(Error::Crypto(format!(
                "Invalid key length: expected {}, got {}",
                KEY_LENGTH,
                bytes.len()
            )));
        }

        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.key.ct_eq(&other.key).into()
    }
}

impl Eq for SessionKey {}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey([REDACTED])")
    }
}

/// Salt anchoring one key-derivation epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salt([u8; SALT_LENGTH]);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        Self(salt)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }

    /// Encode as standard base64, the persisted form.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Decode from standard base64.
    ///
    /// # Errors
    /// - Returns error if the input is not base64 or not SALT_LENGTH bytes
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Serialization(format!("Invalid salt encoding: {}", e)))?;

        let salt: [u8; SALT_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            Error::Serialization(format!(
                "Invalid salt length: expected {}, got {}",
                SALT_LENGTH,
                bytes.len()
            ))
        })?;

        Ok(Self(salt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salt_generate() {
        let salt1 = Salt::generate();
        let salt2 = Salt::generate();

        // Random salts should be different
        assert_ne!(salt1.as_bytes(), salt2.as_bytes());
    }

    #[test]
    fn test_salt_base64() {
        let salt = Salt::from_bytes([7u8; SALT_LENGTH]);
        let restored = Salt::from_base64(&salt.to_base64()).unwrap();
        assert_eq!(restored, salt);
    }

    #[test]
    fn test_salt_wrong_length_rejected() {
        let encoded = STANDARD.encode([1u8; 32]);
        assert!(Salt::from_base64(&encoded).is_err());
    }

    #[test]
    fn test_session_key_export_import() {
        let key = SessionKey::from_bytes([3u8; KEY_LENGTH]);
        let exported = key.export();
        let imported = SessionKey::import(&exported).unwrap();
        assert_eq!(imported, key);
    }

    #[test]
    fn test_session_key_import_rejects_short_key() {
        let encoded = STANDARD.encode([1u8; 16]);
        assert!(SessionKey::import(&encoded).is_err());
        assert!(SessionKey::import("not base64!").is_err());
    }

    #[test]
    fn test_session_key_debug_redacted() {
        let key = SessionKey::from_bytes([9u8; KEY_LENGTH]);
        assert_eq!(format!("{:?}", key), "SessionKey([REDACTED])");
    }
}
