//! Configuration management for the approval workflow service

use crate::error::{Result, WorkflowError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `BIZFLOW_SERVER_PORT=9000`
pub const ENV_PREFIX: &str = "BIZFLOW";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(alias = "host", default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    #[serde(alias = "data_root", default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// No webhook means notifications are only logged.
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_notification_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_notification_timeout(),
        }
    }
}

/// Static role membership used to resolve role-based approvers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// JSON array of workflow definitions published at startup
    #[serde(default)]
    pub definitions_path: Option<PathBuf>,
}

// Default functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_backend() -> StorageBackend {
    StorageBackend::File
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_DATA_ROOT)
}

fn default_notification_timeout() -> u64 {
    10
}

/// Flat environment overrides layered on top of the config file
#[derive(Debug, Default, Deserialize)]
pub struct EnvOverrides {
    pub server_bind_address: Option<String>,
    pub server_port: Option<u16>,
    pub storage_data_dir: Option<PathBuf>,
    pub notifications_webhook_url: Option<String>,
}

impl EnvOverrides {
    /// Collect `BIZFLOW_*` variables from the process environment
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl WorkflowConfig {
    /// Load configuration from a JSON file, then apply environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WorkflowError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: WorkflowConfig = serde_json::from_str(&content)
            .map_err(|e| WorkflowError::Config(format!("Failed to parse config: {}", e)))?;

        config.apply_overrides(EnvOverrides::from_env()?);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_json::from_str(json)
            .map_err(|e| WorkflowError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: EnvOverrides) {
        if let Some(bind_address) = overrides.server_bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(data_dir) = overrides.storage_data_dir {
            self.storage.data_dir = data_dir;
        }
        if let Some(url) = overrides.notifications_webhook_url {
            self.notifications.webhook_url = Some(url);
        }
    }

    /// Socket address string for the HTTP listener
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(WorkflowError::Config("Server port is required".to_string()));
        }

        if self.storage.backend == StorageBackend::File && self.storage.data_dir.as_os_str().is_empty() {
            return Err(WorkflowError::Config(
                "Storage data_dir is required for the file backend".to_string(),
            ));
        }

        if let Some(url) = &self.notifications.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(WorkflowError::Config(format!(
                    "Notification webhook must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }

        if self.notifications.timeout_secs == 0 {
            return Err(WorkflowError::Config(
                "Notification timeout must be at least one second".to_string(),
            ));
        }

        for (role, members) in &self.directory.roles {
            if role.trim().is_empty() {
                return Err(WorkflowError::Config("Role names are required".to_string()));
            }
            if members.iter().any(|m| m.trim().is_empty()) {
                return Err(WorkflowError::Config(format!(
                    "Role '{}' has an empty member id",
                    role
                )));
            }
        }

        Ok(())
    }
}
