//! Common error types for SealPass.

use thiserror::Error;

/// Top-level error type for SealPass operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The supplied master password did not decrypt the vault.
    #[error("Invalid master password")]
    InvalidMasterPassword,

    /// The operation needs an active session key.
    #[error("Vault is locked")]
    VaultLocked,

    /// No vault has been initialized in this store.
    #[error("Vault has not been initialized")]
    VaultNotInitialized,

    /// A vault already exists in this store.
    #[error("Vault is already initialized")]
    VaultAlreadyInitialized,

    /// AEAD authentication failed: wrong key or tampered ciphertext.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// No credential record with the given id.
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Key rotation failed; persisted state is unchanged.
    #[error("Rotation aborted: {0}")]
    RotationAborted(String),

    /// Cryptographic operation failed for a reason other than authentication.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Remote collaborator could not be reached or failed transiently.
    #[error("Network error: {0}")]
    Network(String),

    /// Remote collaborator refused the request as malformed or conflicting.
    #[error("Remote rejected request: {0}")]
    Remote(String),

    /// Missing or rejected remote credentials.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Io(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
