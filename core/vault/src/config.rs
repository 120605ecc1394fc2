//! Vault configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use sealpass_common::{Error, Result};
use sealpass_crypto::KdfParams;

/// Default inactivity period before the vault locks itself (5 minutes).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 5 * 60;

/// Default lifetime of a persisted wrapped key (30 days).
pub const DEFAULT_WRAPPED_KEY_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Tunables for the session and key lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Key-derivation parameters.
    pub kdf: KdfParams,
    /// Seconds without an operation before auto-lock. `0` disables it.
    pub idle_timeout_secs: u64,
    /// Seconds a wrapped key stays usable for `hydrate`.
    pub wrapped_key_ttl_secs: u64,
    /// Persist a wrapped session key so a restarted process can resume
    /// without the master password.
    pub persist_session_key: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            wrapped_key_ttl_secs: DEFAULT_WRAPPED_KEY_TTL_SECS,
            persist_session_key: true,
        }
    }
}

impl VaultConfig {
    /// Inactivity timeout, or `None` when auto-lock is disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// Lifetime of a wrapped key.
    pub fn wrapped_key_ttl(&self) -> chrono::Duration {
        let secs = i64::try_from(self.wrapped_key_ttl_secs).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
    }

    /// Check the configuration for values that would make the vault unusable.
    ///
    /// # Errors
    /// - Zero KDF iterations
    /// - Zero wrapped-key TTL while session persistence is enabled
    pub fn validate(&self) -> Result<()> {
        if self.kdf.iterations == 0 {
            return Err(Error::InvalidInput(
                "kdf.iterations must be greater than zero".to_string(),
            ));
        }
        if self.persist_session_key && self.wrapped_key_ttl_secs == 0 {
            return Err(Error::InvalidInput(
                "wrapped_key_ttl_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}
