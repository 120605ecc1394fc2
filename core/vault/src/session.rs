//! Vault session management.
//!
//! The session holds the derived key in memory while the vault is unlocked.
//! Keys are zeroized when the session is dropped, which is what `lock` does.
//!
//! Every transition that installs or removes a key takes the session write
//! guard. Vault mutations hold a read guard for the whole
//! encrypt-and-persist cycle, so a lock requested mid-mutation waits for the
//! write to land and never leaves a half-written vault behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::codec;
use crate::config::VaultConfig;
use crate::salt_store::SaltStore;
use sealpass_common::{Error, Result};
use sealpass_crypto::{derive_key, Salt, SessionKey};
use sealpass_storage::{keys, KvStore};

/// Externally visible vault state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultStatus {
    /// No salt has been stored yet.
    NoVault,
    /// Initialized, no key in memory.
    Locked,
    /// A session key is in memory.
    Unlocked,
}

impl fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VaultStatus::NoVault => "no vault",
            VaultStatus::Locked => "locked",
            VaultStatus::Unlocked => "unlocked",
        };
        f.write_str(label)
    }
}

/// Key material of an unlocked vault.
pub struct VaultSession {
    key: SessionKey,
    salt: Salt,
    unlocked_at: DateTime<Utc>,
}

impl VaultSession {
    pub(crate) fn new(key: SessionKey, salt: Salt) -> Self {
        Self {
            key,
            salt,
            unlocked_at: Utc::now(),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Salt of the epoch the key was derived in.
    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    pub fn unlocked_at(&self) -> DateTime<Utc> {
        self.unlocked_at
    }
}

/// Session key persisted so a restarted process can resume.
///
/// Stored as `{ "key": base64, "timestamp": millis }`. The timestamp is the
/// moment of unlock, so the TTL is not extended by later hydrations.
#[derive(Serialize, Deserialize)]
pub struct WrappedKey {
    key: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
}

impl WrappedKey {
    pub fn wrap(key: &SessionKey, timestamp: DateTime<Utc>) -> Self {
        Self {
            key: key.export().to_string(),
            timestamp,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.timestamp) > ttl
    }

    pub fn unwrap_key(&self) -> Result<SessionKey> {
        SessionKey::import(&self.key)
    }

    fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl Drop for WrappedKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedKey")
            .field("key", &"[REDACTED]")
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Read access to the active session.
pub type SessionGuard<'a> = RwLockReadGuard<'a, VaultSession>;

/// Owns the in-memory key and drives the Locked/Unlocked transitions.
pub struct SessionManager {
    store: Arc<dyn KvStore>,
    salts: SaltStore,
    config: VaultConfig,
    session: RwLock<Option<VaultSession>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn KvStore>, config: VaultConfig) -> Self {
        Self {
            salts: SaltStore::new(store.clone()),
            store,
            config,
            session: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn salts(&self) -> &SaltStore {
        &self.salts
    }

    pub async fn is_unlocked(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn status(&self) -> Result<VaultStatus> {
        if self.is_unlocked().await {
            return Ok(VaultStatus::Unlocked);
        }
        if self.salts.exists().await? {
            Ok(VaultStatus::Locked)
        } else {
            Ok(VaultStatus::NoVault)
        }
    }

    /// Borrow the active session.
    ///
    /// The guard keeps a concurrent `lock` waiting until it is dropped.
    ///
    /// # Errors
    /// - `VaultLocked` if no key is in memory
    pub async fn active(&self) -> Result<SessionGuard<'_>> {
        RwLockReadGuard::try_map(self.session.read().await, Option::as_ref)
            .map_err(|_| Error::VaultLocked)
    }

    /// Create a new vault protected by `password`.
    ///
    /// Stores a fresh salt and an encrypted empty vault in one commit and
    /// leaves the vault unlocked.
    ///
    /// # Errors
    /// - `VaultAlreadyInitialized` if a salt already exists
    /// - `InvalidInput` for an empty password
    pub async fn initialize(&self, password: &str) -> Result<Salt> {
        let salt = Salt::generate();
        let key = self.derive(password, salt).await?;

        let mut session = self.session.write().await;
        if self.salts.exists().await? {
            return Err(Error::VaultAlreadyInitialized);
        }

        let blob = codec::seal(&[], &key, &salt)?;
        let mut entries = vec![SaltStore::entry(&salt), codec::entry(&blob)?];
        if let Some(wrapped) = self.wrapped_key_entry(&key)? {
            entries.push(wrapped);
        }
        self.store.set_many(entries).await?;

        *session = Some(VaultSession::new(key, salt));
        info!("Vault initialized");
        Ok(salt)
    }

    /// Derive the key from `password` and unlock the vault.
    ///
    /// # Errors
    /// - `VaultNotInitialized` if no salt is stored
    /// - `InvalidMasterPassword` if the key does not open the vault; the
    ///   state is left unchanged
    pub async fn unlock(&self, password: &str) -> Result<()> {
        let salt = self.salts.load().await?.ok_or(Error::VaultNotInitialized)?;
        let key = self.derive(password, salt).await?;

        let mut session = self.session.write().await;

        // A rotation may have committed while the key was being derived.
        if self.salts.load().await? != Some(salt) {
            warn!("Salt changed during unlock");
            return Err(Error::InvalidMasterPassword);
        }

        match codec::read_blob(self.store.as_ref()).await {
            Ok(Some(blob)) => {
                codec::open(&blob, &key).map_err(|e| match e {
                    Error::DecryptionFailed => Error::InvalidMasterPassword,
                    other => other,
                })?;
            }
            Ok(None) => warn!("Salt present without a vault blob, unlocking unverified"),
            Err(Error::DecryptionFailed) => return Err(Error::InvalidMasterPassword),
            Err(e) => return Err(e),
        }

        if let Some((name, value)) = self.wrapped_key_entry(&key)? {
            self.store.set(&name, value).await?;
        }

        *session = Some(VaultSession::new(key, salt));
        info!("Vault unlocked");
        Ok(())
    }

    /// Restore the session from a persisted wrapped key.
    ///
    /// # Returns
    /// `true` if the vault is now unlocked. An absent, expired or unusable
    /// wrapped key yields `false`; expired and unusable keys are removed.
    pub async fn hydrate(&self) -> Result<bool> {
        let mut session = self.session.write().await;
        if session.is_some() {
            return Ok(true);
        }

        let Some(raw) = self.store.get(keys::PERSISTED_VAULT_KEY).await? else {
            return Ok(false);
        };
        if !self.config.persist_session_key {
            debug!("Session persistence disabled, discarding wrapped key");
            self.store.remove(keys::PERSISTED_VAULT_KEY).await?;
            return Ok(false);
        }

        let Some(salt) = self.salts.load().await? else {
            warn!("Wrapped key present without a salt, discarding");
            self.store.remove(keys::PERSISTED_VAULT_KEY).await?;
            return Ok(false);
        };

        let key = match self.read_wrapped(raw) {
            Ok(key) => key,
            Err(reason) => {
                info!(reason, "Discarding wrapped key");
                self.store.remove(keys::PERSISTED_VAULT_KEY).await?;
                return Ok(false);
            }
        };

        if let Some(blob) = codec::read_blob(self.store.as_ref()).await? {
            if codec::open(&blob, &key).is_err() {
                warn!("Wrapped key does not open the vault, discarding");
                self.store.remove(keys::PERSISTED_VAULT_KEY).await?;
                return Ok(false);
            }
        }

        *session = Some(VaultSession::new(key, salt));
        info!("Vault session restored");
        Ok(true)
    }

    fn read_wrapped(&self, raw: Value) -> std::result::Result<SessionKey, &'static str> {
        let wrapped: WrappedKey = serde_json::from_value(raw).map_err(|_| "malformed")?;
        if wrapped.is_expired(self.config.wrapped_key_ttl(), Utc::now()) {
            return Err("expired");
        }
        wrapped.unwrap_key().map_err(|_| "invalid key material")
    }

    /// Drop the key from memory and remove the wrapped key.
    ///
    /// Idempotent. Never touches the vault blob or the salt. Waits for any
    /// in-flight mutation to finish first.
    pub async fn lock(&self) -> Result<()> {
        let previous = self.session.write().await.take();
        let was_unlocked = previous.is_some();
        drop(previous);

        self.store.remove(keys::PERSISTED_VAULT_KEY).await?;
        if was_unlocked {
            info!("Vault locked");
        }
        Ok(())
    }

    /// Lock and forget the remote sync authentication state.
    pub async fn logout(&self) -> Result<()> {
        self.lock().await?;
        self.store.remove(keys::AUTH_STATE).await?;
        info!("Logged out");
        Ok(())
    }

    /// Run the key derivation off the async executor.
    pub(crate) async fn derive(&self, password: &str, salt: Salt) -> Result<SessionKey> {
        let password = Zeroizing::new(password.as_bytes().to_vec());
        let params = self.config.kdf.clone();

        tokio::task::spawn_blocking(move || derive_key(&password, &salt, &params))
            .await
            .map_err(|e| Error::Crypto(format!("Key derivation task failed: {}", e)))?
    }

    /// Exclusive access to the session slot, for commits that replace the key.
    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, Option<VaultSession>> {
        self.session.write().await
    }

    /// Store entry for the wrapped form of `key`, if persistence is enabled.
    pub(crate) fn wrapped_key_entry(&self, key: &SessionKey) -> Result<Option<(String, Value)>> {
        if !self.config.persist_session_key {
            return Ok(None);
        }
        let value = WrappedKey::wrap(key, Utc::now()).to_value()?;
        Ok(Some((keys::PERSISTED_VAULT_KEY.to_string(), value)))
    }
}
