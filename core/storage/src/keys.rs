//! Well-known store keys.

/// Base64 salt of the current key-derivation epoch.
pub const MASTER_SALT: &str = "masterSalt";

/// Encrypted vault blob.
pub const VAULT: &str = "vault";

/// Wrapped session key with its creation timestamp.
pub const PERSISTED_VAULT_KEY: &str = "persistedVaultKey";

/// Remote sync authentication state.
pub const AUTH_STATE: &str = "authState";

/// Mapping from local record ids to remote entry ids.
pub const REMOTE_IDS: &str = "remoteIds";
