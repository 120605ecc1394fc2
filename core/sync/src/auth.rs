//! Remote authentication state.

use serde::{Deserialize, Serialize};
use std::fmt;

use sealpass_common::{Error, Result};
use sealpass_storage::{keys, KvStore};

/// Profile of the signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// Persisted under `authState`. Supplies the bearer token for sync calls.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub is_authenticated: bool,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub has_master_password: bool,
}

impl AuthState {
    /// Signed-in state carrying `token`.
    pub fn with_token(token: impl Into<String>, has_master_password: bool) -> Self {
        Self {
            is_authenticated: true,
            user: None,
            token: Some(token.into()),
            has_master_password,
        }
    }

    /// The token to send, if signed in.
    pub fn bearer_token(&self) -> Option<&str> {
        if !self.is_authenticated {
            return None;
        }
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    pub async fn load(store: &dyn KvStore) -> Result<Option<Self>> {
        match store.get(keys::AUTH_STATE).await? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::Serialization(format!("Invalid auth state: {}", e))),
        }
    }

    pub async fn save(&self, store: &dyn KvStore) -> Result<()> {
        let value = serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))?;
        store.set(keys::AUTH_STATE, value).await
    }

    pub async fn clear(store: &dyn KvStore) -> Result<()> {
        store.remove(keys::AUTH_STATE).await
    }
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("is_authenticated", &self.is_authenticated)
            .field("user", &self.user)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("has_master_password", &self.has_master_password)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealpass_storage::MemoryStore;

    #[tokio::test]
    async fn test_save_load_clear() {
        let store = MemoryStore::new();
        assert!(AuthState::load(&store).await.unwrap().is_none());

        let state = AuthState::with_token("jwt", true);
        state.save(&store).await.unwrap();

        let loaded = AuthState::load(&store).await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.bearer_token(), Some("jwt"));

        AuthState::clear(&store).await.unwrap();
        assert!(AuthState::load(&store).await.unwrap().is_none());
    }

    #[test]
    fn test_wire_shape() {
        let value = serde_json::to_value(AuthState::with_token("jwt", false)).unwrap();
        assert_eq!(value["isAuthenticated"], true);
        assert_eq!(value["hasMasterPassword"], false);
        assert_eq!(value["token"], "jwt");
    }

    #[test]
    fn test_no_token_when_signed_out() {
        let state = AuthState {
            is_authenticated: false,
            token: Some("stale".to_string()),
            ..Default::default()
        };
        assert_eq!(state.bearer_token(), None);
        assert!(!format!("{:?}", state).contains("stale"));
    }
}
