use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::session::ReferencePolicy;

/// Top-level configuration, read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
}

/// Where the validation backend lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Timeout for listing, delete and validate calls.
    pub timeout_secs: u64,
    pub upload_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 120,
            upload_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SessionConfig {
    pub reference_policy: ReferencePolicy,
    /// File extensions accepted for upload, without the dot. Empty accepts all.
    pub accepted_extensions: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reference_policy: ReferencePolicy::AllCompleted,
            accepted_extensions: vec!["pdf".to_string()],
        }
    }
}
