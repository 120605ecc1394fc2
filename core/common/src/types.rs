//! Common types used throughout SealPass.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a credential record.
///
/// Assigned once when the record is created and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = crate::Error;

    /// Parse a record id.
    ///
    /// # Errors
    /// - Returns error if `s` is not a UUID
    fn from_str(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| crate::Error::InvalidInput(format!("Invalid record id '{}': {}", s, e)))
    }
}
