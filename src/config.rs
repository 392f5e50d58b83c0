//! Configuration loading and management
//!
//! Handles parsing of `.taskflow.toml` configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;
use crate::model::{Priority, TaskStatus};

/// File name looked up at the project root
pub const CONFIG_FILE_NAME: &str = ".taskflow.toml";

pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Task defaults and lifecycle policy
    #[serde(default)]
    pub tasks: TasksConfig,

    /// Remote persistence settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// File-backed store settings
    #[serde(default)]
    pub store: StoreConfig,
}

/// Tasks configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Prefix of server-assigned ids
    #[serde(default = "default_task_id_prefix")]
    pub id_prefix: String,

    /// Status for new tasks that do not name one
    #[serde(default)]
    pub default_status: TaskStatus,

    /// Priority for new tasks that do not name one
    #[serde(default)]
    pub default_priority: Priority,

    /// Status `toggle` reopens a completed task into
    #[serde(default = "default_reopen_status")]
    pub reopen_status: TaskStatus,

    /// Refuse to complete a task while a blocking dependency is open
    #[serde(default)]
    pub enforce_readiness: bool,
}

fn default_task_id_prefix() -> String {
    "tf".to_string()
}

fn default_reopen_status() -> TaskStatus {
    TaskStatus::InProgress
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            id_prefix: default_task_id_prefix(),
            default_status: TaskStatus::default(),
            default_priority: Priority::default(),
            reopen_status: default_reopen_status(),
            enforce_readiness: false,
        }
    }
}

/// Remote persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Remote calls taking longer than this fail and roll back
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_remote_timeout_ms() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_MS
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_remote_timeout_ms(),
        }
    }
}

/// File-backed store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Task document, relative to the project root
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// How long to wait for the document lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".taskflow").join("tasks.json")
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Document path resolved against `root` unless already absolute.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            root.join(&self.path)
        }
    }
}

impl Config {
    /// Load configuration from a `.taskflow.toml` file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the project root, or return defaults
    pub fn load_from_root(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    path = %config_path.display(),
                    error = %err,
                    "ignoring invalid config"
                );
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        self.tasks.validate()?;
        if self.remote.timeout_ms == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "remote.timeout_ms must be > 0".to_string(),
            ));
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "store.path cannot be empty".to_string(),
            ));
        }
        if self.store.lock_timeout_ms == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "store.lock_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl TasksConfig {
    fn validate(&self) -> crate::error::Result<()> {
        let prefix = self.id_prefix.trim();
        if prefix.is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "tasks.id_prefix cannot be empty".to_string(),
            ));
        }
        if !prefix.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(crate::error::Error::InvalidConfig(
                "tasks.id_prefix must be alphanumeric".to_string(),
            ));
        }
        if self.reopen_status.is_completed() {
            return Err(crate::error::Error::InvalidConfig(
                "tasks.reopen_status cannot be 'completed'".to_string(),
            ));
        }
        Ok(())
    }
}
