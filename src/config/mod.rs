//! Configuration loading.
//!
//! Resolution order, highest first: `--api-url` (or `DOC_VALIDATOR_API_URL`),
//! an explicit `--config` file, the platform config file, compiled defaults.

pub mod schema;

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::debug;

use crate::error::ConfigError;

pub use schema::{ApiConfig, Config, SessionConfig};

const CONFIG_FILE: &str = "config.toml";

/// `<config_dir>/config.toml` for this platform, if a home directory exists.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "doc-validator").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

impl Config {
    /// Load from `explicit` when given (it must exist), otherwise from the
    /// platform file when present, otherwise defaults.
    pub fn load(explicit: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let expanded = PathBuf::from(shellexpand::tilde(path).to_string());
            return Self::load_from(&expanded);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let shown = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: shown.clone(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: shown.clone(),
            message: e.to_string(),
        })?;
        config.validate()?;
        debug!(path = %shown, "loaded config");
        Ok(config)
    }

    /// Override the backend address, e.g. from the command line.
    pub fn with_api_url(mut self, url: Option<String>) -> Result<Self, ConfigError> {
        if let Some(url) = url {
            self.api.base_url = url;
            self.validate()?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "api.base_url".into(),
                message: format!("'{url}' must start with http:// or https://"),
            });
        }
        if self.api.timeout_secs == 0 || self.api.upload_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "api.timeout_secs".into(),
                message: "timeouts must be at least one second".into(),
            });
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// JSON Schema of the config file, pretty printed.
    pub fn json_schema() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&schemars::schema_for!(Config))
    }
}
