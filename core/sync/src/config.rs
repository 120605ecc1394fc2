//! Sync configuration.

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

/// Default API endpoint of the sync service.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3001/api";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL the REST routes are resolved against.
    pub api_base_url: String,
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"api_base_url": "https://sync.example/api"}"#).unwrap();
        assert_eq!(config.api_base_url, "https://sync.example/api");
        assert_eq!(config.retry, RetryConfig::default());
    }
}
