//! Remote vault API client.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use url::Url;

use sealpass_common::{Error, RecordId, Result};
use sealpass_vault::{CredentialRecord, RemoteEntry};

/// An entry as returned by the remote service, with its remote id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub entry: RemoteEntry,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteRecord {
    pub fn new(id: impl Into<String>, entry: RemoteEntry) -> Self {
        Self {
            id: id.into(),
            entry,
            created_at: None,
            updated_at: None,
        }
    }

    /// The local record for this entry, stored under `id`.
    ///
    /// Missing remote timestamps fall back to now.
    pub fn to_credential(&self, id: RecordId) -> Result<CredentialRecord> {
        let created_at = self
            .created_at
            .map(|at| at.trunc_subsecs(3))
            .unwrap_or_else(CredentialRecord::timestamp_now);
        let updated_at = self
            .updated_at
            .map(|at| at.trunc_subsecs(3))
            .unwrap_or(created_at)
            .max(created_at);

        Ok(CredentialRecord {
            id,
            domain: self.entry.domain.clone(),
            username: self.entry.username.clone(),
            encrypted_password: self.entry.encrypted_password.to_json_string()?,
            notes: self.entry.notes.clone(),
            created_at,
            updated_at,
        })
    }
}

/// The remote copy of a user's vault.
///
/// The remote side only ever sees ciphertext and the salt.
#[async_trait]
pub trait RemoteVault: Send + Sync {
    async fn create(&self, entry: &RemoteEntry) -> Result<RemoteRecord>;

    async fn update(&self, remote_id: &str, entry: &RemoteEntry) -> Result<RemoteRecord>;

    async fn delete(&self, remote_id: &str) -> Result<()>;

    async fn list(&self) -> Result<Vec<RemoteRecord>>;

    /// Publish the current master salt (base64).
    async fn set_salt(&self, salt: &str) -> Result<()>;

    /// The salt last published, if any.
    async fn get_salt(&self) -> Result<Option<String>>;
}

#[derive(Serialize)]
struct SaltBody<'a> {
    salt: &'a str,
}

#[derive(Deserialize)]
struct SaltResponse {
    #[serde(default)]
    salt: Option<String>,
}

/// [`RemoteVault`] over the REST API.
pub struct HttpRemoteVault {
    http: Client,
    base_url: Url,
    token: String,
}

impl HttpRemoteVault {
    /// Create a client for `base_url`, authenticating with `token`.
    ///
    /// # Errors
    /// - `InvalidInput` if `base_url` is not an absolute http(s) URL
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid API base URL: {}", e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!(
                "Unsupported API scheme: {}",
                base_url.scheme()
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .user_agent(concat!("SealPass/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    /// Resolve a route relative to the base URL.
    fn endpoint(&self, route: &str) -> Result<Url> {
        self.base_url
            .join(route.trim_start_matches('/'))
            .map_err(|e| Error::InvalidInput(format!("Invalid route {}: {}", route, e)))
    }

    fn entry_endpoint(&self, remote_id: &str) -> Result<Url> {
        let mut url = self.endpoint("vault")?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidInput("API base URL cannot have a path".to_string()))?
            .push(remote_id);
        Ok(url)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse response: {}", e)))
    }
}

impl fmt::Debug for HttpRemoteVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRemoteVault")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl RemoteVault for HttpRemoteVault {
    async fn create(&self, entry: &RemoteEntry) -> Result<RemoteRecord> {
        let response = self
            .http
            .post(self.endpoint("vault")?)
            .bearer_auth(&self.token)
            .json(entry)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to create entry: {}", e)))?;

        let record: RemoteRecord = Self::parse(response).await?;
        debug!(remote_id = %record.id, "Remote entry created");
        Ok(record)
    }

    async fn update(&self, remote_id: &str, entry: &RemoteEntry) -> Result<RemoteRecord> {
        let response = self
            .http
            .put(self.entry_endpoint(remote_id)?)
            .bearer_auth(&self.token)
            .json(entry)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to update entry: {}", e)))?;

        Self::parse(response).await
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.entry_endpoint(remote_id)?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to delete entry: {}", e)))?;

        check_status(response).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RemoteRecord>> {
        let response = self
            .http
            .get(self.endpoint("vault")?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to list entries: {}", e)))?;

        Self::parse(response).await
    }

    async fn set_salt(&self, salt: &str) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint("users/salt")?)
            .bearer_auth(&self.token)
            .json(&SaltBody { salt })
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to publish salt: {}", e)))?;

        check_status(response).await?;
        Ok(())
    }

    async fn get_salt(&self) -> Result<Option<String>> {
        let response = self
            .http
            .get(self.endpoint("users/salt")?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to fetch salt: {}", e)))?;

        let body: SaltResponse = Self::parse(response).await?;
        Ok(body.salt.filter(|s| !s.is_empty()))
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

/// Map a failed HTTP status to an error.
///
/// Timeouts, throttling and server faults are transient; other client
/// errors are not worth retrying.
fn status_error(status: StatusCode, body: &str) -> Error {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{} - {}", status, body)
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication(detail),
        StatusCode::NOT_FOUND => Error::RecordNotFound(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => Error::Network(detail),
        s if s.is_server_error() => Error::Network(detail),
        _ => Error::Remote(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        let client = HttpRemoteVault::new("https://sync.example/api", "t").unwrap();
        assert_eq!(
            client.endpoint("vault").unwrap().as_str(),
            "https://sync.example/api/vault"
        );
        assert_eq!(
            client.endpoint("/users/salt").unwrap().as_str(),
            "https://sync.example/api/users/salt"
        );
        assert_eq!(
            client.entry_endpoint("65a1f0").unwrap().as_str(),
            "https://sync.example/api/vault/65a1f0"
        );
    }

    #[test]
    fn test_entry_endpoint_escapes_id() {
        let client = HttpRemoteVault::new("https://sync.example/api/", "t").unwrap();
        let url = client.entry_endpoint("../users").unwrap();
        assert!(url.path().starts_with("/api/vault/"));
    }

    #[test]
    fn test_rejects_bad_base_url() {
        assert!(HttpRemoteVault::new("not a url", "t").is_err());
        assert!(HttpRemoteVault::new("ftp://sync.example", "t").is_err());
    }

    #[test]
    fn test_debug_hides_token() {
        let client = HttpRemoteVault::new("https://sync.example/api", "secret-token").unwrap();
        assert!(!format!("{:?}", client).contains("secret-token"));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, ""),
            Error::Authentication(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, ""),
            Error::RecordNotFound(_)
        ));
        assert!(status_error(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(!status_error(StatusCode::BAD_REQUEST, "bad").is_retryable());
    }

    #[test]
    fn test_remote_record_shape() {
        let json = serde_json::json!({
            "_id": "65a1f0",
            "userId": "u1",
            "domain": "example.com",
            "username": "alice",
            "encryptedPassword": { "ciphertext": "Y3Q=", "iv": "aXY=", "salt": "c2FsdA==" },
            "createdAt": "2024-01-01T00:00:00.000Z"
        });
        let record: RemoteRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.id, "65a1f0");
        assert_eq!(record.entry.domain, "example.com");
        assert_eq!(record.entry.notes, None);

        let local = record.to_credential(RecordId::new()).unwrap();
        assert_eq!(local.created_at.timestamp(), 1_704_067_200);
        assert_eq!(local.updated_at, local.created_at);
        assert_eq!(local.password_blob().unwrap(), record.entry.encrypted_password);
    }
}
