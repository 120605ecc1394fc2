//! Authenticated encryption using AES-256-GCM.
//!
//! Each call draws a fresh 96-bit IV from the OS RNG, so encrypting the
//! same plaintext twice under one key never yields the same ciphertext.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::blob::EncryptedBlob;
use crate::keys::{Salt, SessionKey};
use sealpass_common::{Error, Result};

/// IV size for AES-GCM (12 bytes).
pub const IV_SIZE: usize = 12;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Encrypt plaintext under `key`.
///
/// # Postconditions
/// - Returns ciphertext+tag, a new random IV, and `salt` as metadata
/// - The ciphertext length is plaintext length + TAG_SIZE
///
/// # Errors
/// - Returns error if the cipher rejects the input
pub fn encrypt(plaintext: &[u8], key: &SessionKey, salt: &Salt) -> Result<EncryptedBlob> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Crypto(format!("Invalid key: {}", e)))?;
    let iv = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&iv, plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    Ok(EncryptedBlob::from_parts(&ciphertext, &iv, salt))
}

/// Decrypt a blob under `key`.
///
/// # Errors
/// - `DecryptionFailed` if the key is wrong, the blob was tampered with,
///   or its fields are not well-formed
///
/// # Security
/// - Authenticates before returning any plaintext
pub fn decrypt(blob: &EncryptedBlob, key: &SessionKey) -> Result<Vec<u8>> {
    let iv = blob.iv_bytes().map_err(|_| Error::DecryptionFailed)?;
    if iv.len() != IV_SIZE {
        return Err(Error::DecryptionFailed);
    }

    let ciphertext = blob.ciphertext_bytes().map_err(|_| Error::DecryptionFailed)?;
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::DecryptionFailed);
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Crypto(format!("Invalid key: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
        .map_err(|_| Error::DecryptionFailed)
}

/// Encrypt a UTF-8 string.
pub fn encrypt_str(plaintext: &str, key: &SessionKey, salt: &Salt) -> Result<EncryptedBlob> {
    encrypt(plaintext.as_bytes(), key, salt)
}

/// Decrypt a blob that holds a UTF-8 string.
pub fn decrypt_str(blob: &EncryptedBlob, key: &SessionKey) -> Result<Zeroizing<String>> {
    let bytes = decrypt(blob, key)?;
    String::from_utf8(bytes)
        .map(Zeroizing::new)
        .map_err(|_| Error::Serialization("Decrypted data is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_LENGTH;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use proptest::prelude::*;

    fn key(byte: u8) -> SessionKey {
        SessionKey::from_bytes([byte; KEY_LENGTH])
    }

    fn salt() -> Salt {
        Salt::from_bytes([7u8; 16])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let plaintext = b"Hello, World!";

        let blob = encrypt(plaintext, &key(42), &salt()).unwrap();
        let decrypted = decrypt(&blob, &key(42)).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_ciphertext_size() {
        let plaintext = b"Test message";

        let blob = encrypt(plaintext, &key(42), &salt()).unwrap();

        assert_eq!(blob.iv_bytes().unwrap().len(), IV_SIZE);
        assert_eq!(
            blob.ciphertext_bytes().unwrap().len(),
            plaintext.len() + TAG_SIZE
        );
    }

    #[test]
    fn test_different_iv_each_time() {
        let plaintext = b"Same plaintext";

        let blob1 = encrypt(plaintext, &key(42), &salt()).unwrap();
        let blob2 = encrypt(plaintext, &key(42), &salt()).unwrap();

        assert_ne!(blob1.iv, blob2.iv);
        assert_ne!(blob1.ciphertext, blob2.ciphertext);
    }

    #[test]
    fn test_salt_carried_as_metadata() {
        let blob = encrypt(b"x", &key(1), &salt()).unwrap();
        assert_eq!(blob.salt().unwrap(), salt());
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = encrypt(b"Secret data", &key(1), &salt()).unwrap();
        let result = decrypt(&blob, &key(2));

        assert!(matches!(result, Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut blob = encrypt(b"Important data", &key(42), &salt()).unwrap();

        let mut raw = blob.ciphertext_bytes().unwrap();
        raw[3] ^= 0xFF;
        blob.ciphertext = STANDARD.encode(raw);

        assert!(matches!(decrypt(&blob, &key(42)), Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_tampered_iv_fails() {
        let mut blob = encrypt(b"Important data", &key(42), &salt()).unwrap();
        blob.iv = STANDARD.encode([0u8; 8]);

        assert!(matches!(decrypt(&blob, &key(42)), Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_garbage_encoding_is_decryption_failure() {
        let blob = EncryptedBlob {
            ciphertext: "%%%".to_string(),
            iv: "%%%".to_string(),
            salt: salt().to_base64(),
        };
        assert!(matches!(decrypt(&blob, &key(1)), Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_empty_plaintext() {
        let blob = encrypt(b"", &key(42), &salt()).unwrap();
        assert!(decrypt(&blob, &key(42)).unwrap().is_empty());
    }

    #[test]
    fn test_string_helpers() {
        let blob = encrypt_str("hunter2", &key(8), &salt()).unwrap();
        assert_eq!(decrypt_str(&blob, &key(8)).unwrap().as_str(), "hunter2");
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..512),
            k in any::<u8>(),
        ) {
            let blob = encrypt(&data, &key(k), &salt()).unwrap();
            prop_assert_eq!(decrypt(&blob, &key(k)).unwrap(), data);
        }
    }
}
