//! Credential records and the inputs that create or change them.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use sealpass_common::{Error, RecordId, Result};
use sealpass_crypto::EncryptedBlob;

/// One saved login.
///
/// The password is never held in clear: `encrypted_password` is the JSON
/// string of an [`EncryptedBlob`] sealed under the current session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub id: RecordId,
    pub domain: String,
    pub username: String,
    pub encrypted_password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Current time, truncated to the millisecond precision records are
    /// stored with.
    pub fn timestamp_now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }

    /// Parse the embedded password blob.
    ///
    /// A malformed field is reported as [`Error::DecryptionFailed`], the same
    /// as a blob that does not authenticate.
    pub fn password_blob(&self) -> Result<EncryptedBlob> {
        EncryptedBlob::from_json_str(&self.encrypted_password).map_err(|_| Error::DecryptionFailed)
    }

    /// Whether this record belongs to `domain`.
    ///
    /// Comparison ignores case and a leading `www.`, and a subdomain matches
    /// its parent in either direction.
    pub fn matches_domain(&self, domain: &str) -> bool {
        let query = normalize_domain(domain);
        if query.is_empty() {
            return false;
        }
        let own = normalize_domain(&self.domain);

        own == query || is_subdomain(&own, &query) || is_subdomain(&query, &own)
    }
}

/// Lowercase a domain and strip surrounding whitespace and a leading `www.`.
pub fn normalize_domain(domain: &str) -> String {
    let lowered = domain.trim().to_ascii_lowercase();
    match lowered.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lowered,
    }
}

fn is_subdomain(child: &str, parent: &str) -> bool {
    !parent.is_empty()
        && child.len() > parent.len()
        && child.ends_with(parent)
        && child.as_bytes()[child.len() - parent.len() - 1] == b'.'
}

/// A new credential, password in clear.
#[derive(Clone)]
pub struct CredentialDraft {
    pub domain: String,
    pub username: String,
    pub password: Zeroizing<String>,
    pub notes: Option<String>,
}

impl CredentialDraft {
    pub fn new(
        domain: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            username: username.into(),
            password: Zeroizing::new(password.into()),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// # Errors
    /// - Empty domain or username
    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(Error::InvalidInput("domain must not be empty".to_string()));
        }
        if self.username.is_empty() {
            return Err(Error::InvalidInput("username must not be empty".to_string()));
        }
        Ok(())
    }

    /// Whether every field an import needs is present.
    pub fn is_complete(&self) -> bool {
        self.validate().is_ok() && !self.password.is_empty()
    }
}

impl fmt::Debug for CredentialDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialDraft")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("notes", &self.notes)
            .finish()
    }
}

/// A partial update. `None` leaves the field unchanged.
#[derive(Clone, Default)]
pub struct CredentialPatch {
    pub domain: Option<String>,
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub notes: Option<String>,
}

impl CredentialPatch {
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.domain.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.notes.is_none()
    }

    /// # Errors
    /// - A domain or username that is present but empty
    pub fn validate(&self) -> Result<()> {
        if matches!(&self.domain, Some(d) if d.trim().is_empty()) {
            return Err(Error::InvalidInput("domain must not be empty".to_string()));
        }
        if matches!(&self.username, Some(u) if u.is_empty()) {
            return Err(Error::InvalidInput("username must not be empty".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for CredentialPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPatch")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("notes", &self.notes)
            .finish()
    }
}

/// A credential with its password decrypted, as produced by export.
#[derive(Clone)]
pub struct PlainCredential {
    pub domain: String,
    pub username: String,
    pub password: Zeroizing<String>,
    pub notes: Option<String>,
}

impl From<PlainCredential> for CredentialDraft {
    fn from(plain: PlainCredential) -> Self {
        Self {
            domain: plain.domain,
            username: plain.username,
            password: plain.password,
            notes: plain.notes,
        }
    }
}

impl fmt::Debug for PlainCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainCredential")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(domain: &str) -> CredentialRecord {
        let now = CredentialRecord::timestamp_now();
        CredentialRecord {
            id: RecordId::new(),
            domain: domain.to_string(),
            username: "alice".to_string(),
            encrypted_password: "{}".to_string(),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_timestamps_survive_serialization() {
        let rec = record("example.com");
        assert_eq!(rec.created_at.timestamp_subsec_nanos() % 1_000_000, 0);

        let back: CredentialRecord =
            serde_json::from_value(serde_json::to_value(&rec).unwrap()).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_record_wire_shape() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let rec = CredentialRecord {
            created_at: at,
            updated_at: at,
            ..record("example.com")
        };

        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["createdAt"], 1_700_000_000_123i64);
        assert_eq!(value["updatedAt"], 1_700_000_000_123i64);
        assert!(value["encryptedPassword"].is_string());
        assert!(value.get("notes").is_none());

        let back: CredentialRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_domain_matching() {
        let rec = record("Example.com");
        assert!(rec.matches_domain("example.com"));
        assert!(rec.matches_domain("www.example.com"));
        assert!(rec.matches_domain("login.example.com"));
        assert!(!rec.matches_domain("badexample.com"));
        assert!(!rec.matches_domain("example.org"));
        assert!(!rec.matches_domain(""));

        let sub = record("accounts.example.com");
        assert!(sub.matches_domain("example.com"));
        assert!(!sub.matches_domain("other.example.com"));
    }

    #[test]
    fn test_malformed_password_blob() {
        let rec = CredentialRecord {
            encrypted_password: "not json".to_string(),
            ..record("example.com")
        };
        assert!(matches!(rec.password_blob(), Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let draft = CredentialDraft::new("example.com", "alice", "hunter2");
        assert!(!format!("{:?}", draft).contains("hunter2"));

        let patch = CredentialPatch::default().password("hunter2");
        assert!(!format!("{:?}", patch).contains("hunter2"));
    }

    #[test]
    fn test_validation() {
        assert!(CredentialDraft::new(" ", "alice", "pw").validate().is_err());
        assert!(CredentialDraft::new("example.com", "", "pw").validate().is_err());
        assert!(!CredentialDraft::new("example.com", "alice", "").is_complete());
        assert!(CredentialDraft::new("example.com", "alice", "pw").is_complete());
        assert!(CredentialPatch::default().domain("").validate().is_err());
        assert!(CredentialPatch::default().is_empty());
    }
}
