//! Key derivation using PBKDF2-HMAC-SHA256.
//!
//! The iteration count is deliberately expensive to slow down offline
//! brute-force attempts against a stolen vault.

use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::keys::{Salt, SessionKey, KEY_LENGTH};
use sealpass_common::{Error, Result};

/// OWASP-recommended iteration count for PBKDF2-HMAC-SHA256.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Parameters for PBKDF2 key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Number of HMAC-SHA256 iterations.
    pub iterations: u32,
}

impl KdfParams {
    /// Parameters with a custom iteration count.
    ///
    /// Values below [`DEFAULT_ITERATIONS`] are only appropriate for tests.
    pub fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Derive a session key from a password and salt.
///
/// # Preconditions
/// - `password` must not be empty
/// - `params.iterations` must be non-zero
///
/// # Postconditions
/// - Returns a 256-bit key usable with AES-256-GCM
/// - The derived key is deterministic given the same inputs
///
/// # Errors
/// - Returns error if password is empty
/// - Returns error if the iteration count is zero
///
/// # Security
/// - Password is not stored or logged
/// - No caching: every call pays the full derivation cost
pub fn derive_key(password: &[u8], salt: &Salt, params: &KdfParams) -> Result<SessionKey> {
    if password.is_empty() {
        return Err(Error::InvalidInput("Password cannot be empty".to_string()));
    }

    if params.iterations == 0 {
        return Err(Error::Crypto(
            "Invalid KDF parameters: iterations must be non-zero".to_string(),
        ));
    }

    let mut key_bytes = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(password, salt.as_bytes(), params.iterations, &mut key_bytes);

    let key = SessionKey::from_bytes(key_bytes);
    zeroize::Zeroize::zeroize(&mut key_bytes);
    Ok(key)
}
