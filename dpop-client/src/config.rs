//! Configuration management for the client

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Authorization server token endpoint
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,

    /// Protected resource fetched after login
    #[serde(default = "default_resource_url")]
    pub resource_url: String,

    /// Where the key record lives
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

fn default_token_endpoint() -> String {
    "http://localhost:8080/token".to_string()
}

fn default_resource_url() -> String {
    "http://localhost:8080/protected".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token_endpoint: default_token_endpoint(),
            resource_url: default_resource_url(),
            storage: StorageConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Override for the file backend's directory
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
    Keyring,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            "keyring" => Ok(Self::Keyring),
            other => Err(ConfigError::InvalidValue {
                name: "storage backend".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(endpoint) = std::env::var("DPOP_TOKEN_ENDPOINT") {
            config.token_endpoint = endpoint;
        }
        if let Ok(url) = std::env::var("DPOP_RESOURCE_URL") {
            config.resource_url = url;
        }
        if let Ok(backend) = std::env::var("DPOP_STORAGE") {
            config.storage.backend = backend.parse()?;
        }
        config.storage.dir = std::env::var("DPOP_STORAGE_DIR").ok().map(PathBuf::from);
        if let Ok(timeout) = std::env::var("DPOP_HTTP_TIMEOUT_SECS") {
            config.http.timeout_secs = timeout.parse().map_err(|_| ConfigError::InvalidValue {
                name: "DPOP_HTTP_TIMEOUT_SECS".to_string(),
                value: timeout.clone(),
            })?;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("~/.config"));
        config_dir.join("dpop-client").join("config.yaml")
    }

    /// Load from default locations (file first, then env)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            Self::from_file(&config_path)
        } else {
            Self::from_env()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {name}: {value}")]
    InvalidValue { name: String, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
