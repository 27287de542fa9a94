//! # Terminal Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILLBOX_SYNC_MODE=offline                                          │
//! │     TILLBOX_BACKEND_URL=https://backend.example.com                    │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tillbox/terminal.toml (Linux)                            │
//! │     ~/Library/Application Support/com.tillbox.terminal/terminal.toml   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Till 1"
//! user_id = "owner-1"
//!
//! [backend]
//! url = "https://backend.example.com"
//! api_key = "anon-key"
//!
//! [sync]
//! mode = "online"
//! poll_interval_secs = 30
//!
//! [storage]
//! data_dir = "/var/lib/tillbox"
//!
//! [backup]
//! interval_mins = 60
//! keep = 14
//!
//! [inventory]
//! low_stock_threshold = 10
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tillbox_core::{new_id, DEFAULT_LOW_STOCK_THRESHOLD};
use tillbox_sync::{BackendSettings, SyncConfig, SyncSettings};

use crate::error::{TerminalError, TerminalResult};

const CONFIG_FILE: &str = "terminal.toml";
const DATABASE_FILE: &str = "tillbox.db";

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Generated on first run.
    #[serde(default = "new_id")]
    pub id: String,

    #[serde(default = "default_device_name")]
    pub name: String,

    /// Owner of this terminal's inventory rows.
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

fn default_device_name() -> String {
    "Till".to_string()
}

fn default_user_id() -> String {
    "local".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: new_id(),
            name: default_device_name(),
            user_id: default_user_id(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database location. Defaults to the platform data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Defaults to `<data_dir>/backups`.
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Minutes between automatic backups. 0 means manual only.
    #[serde(default = "default_backup_interval")]
    pub interval_mins: u64,

    /// Backups kept after each automatic backup.
    #[serde(default = "default_backup_keep")]
    pub keep: usize,
}

fn default_backup_interval() -> u64 {
    60
}

fn default_backup_keep() -> usize {
    14
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            interval_mins: default_backup_interval(),
            keep: default_backup_keep(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,
}

fn default_low_stock_threshold() -> i64 {
    DEFAULT_LOW_STOCK_THRESHOLD
}

impl Default for InventoryConfig {
    fn default() -> Self {
        InventoryConfig {
            low_stock_threshold: default_low_stock_threshold(),
        }
    }
}

// =============================================================================
// Terminal Configuration
// =============================================================================

/// Complete terminal configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub backend: BackendSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub inventory: InventoryConfig,
}

impl TerminalConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (terminal.toml)
    /// 3. Environment variables
    ///
    /// On first run the resulting file is written back so the generated
    /// device id stays stable.
    pub fn load(config_path: Option<PathBuf>) -> TerminalResult<Self> {
        let path = config_path.or_else(Self::default_config_path);
        let mut config = Self::default();
        let mut first_run = false;

        if let Some(path) = &path {
            if path.exists() {
                info!(?path, "Loading terminal config from file");
                let contents = std::fs::read_to_string(path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
                first_run = true;
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        if first_run {
            if let Some(path) = &path {
                if let Err(e) = config.save(path) {
                    warn!(?path, error = %e, "Could not write initial config");
                }
            }
        }

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, path: &Path) -> TerminalResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        info!(?path, "Terminal config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> TerminalResult<()> {
        if self.device.user_id.trim().is_empty() {
            return Err(TerminalError::Config("device.user_id is required".into()));
        }

        if self.inventory.low_stock_threshold < 0 {
            return Err(TerminalError::Config(
                "inventory.low_stock_threshold cannot be negative".into(),
            ));
        }

        if self.backup.keep == 0 {
            return Err(TerminalError::Config(
                "backup.keep must be at least 1".into(),
            ));
        }

        self.sync_config()
            .validate()
            .map_err(|e| TerminalError::Config(e.to_string()))
    }

    /// The `[sync]` and `[backend]` sections together.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            sync: self.sync.clone(),
            backend: self.backend.clone(),
        }
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(id) = var("TILLBOX_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(name) = var("TILLBOX_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Some(user_id) = var("TILLBOX_USER_ID") {
            self.device.user_id = user_id;
        }

        if let Some(mode) = var("TILLBOX_SYNC_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding sync mode from environment");
                    self.sync.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown sync mode in environment"),
            }
        }

        if let Some(url) = var("TILLBOX_BACKEND_URL") {
            debug!(url = %url, "Overriding backend URL from environment");
            self.backend.url = Some(url);
        }

        if let Some(key) = var("TILLBOX_API_KEY") {
            self.backend.api_key = key;
        }

        if let Some(dir) = var("TILLBOX_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(dir) = var("TILLBOX_BACKUP_DIR") {
            self.storage.backup_dir = Some(PathBuf::from(dir));
        }

        if let Some(mins) = var("TILLBOX_BACKUP_INTERVAL_MINS") {
            if let Ok(m) = mins.parse::<u64>() {
                self.backup.interval_mins = m;
            }
        }

        if let Some(threshold) = var("TILLBOX_LOW_STOCK_THRESHOLD") {
            if let Ok(t) = threshold.parse::<i64>() {
                self.inventory.low_stock_threshold = t;
            }
        }
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("com", "tillbox", "terminal")
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    // =========================================================================
    // Paths
    // =========================================================================

    pub fn data_dir(&self) -> TerminalResult<PathBuf> {
        if let Some(dir) = &self.storage.data_dir {
            return Ok(dir.clone());
        }
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| TerminalError::Config("Could not determine app data directory".into()))
    }

    pub fn database_path(&self) -> TerminalResult<PathBuf> {
        Ok(self.data_dir()?.join(DATABASE_FILE))
    }

    pub fn backup_dir(&self) -> TerminalResult<PathBuf> {
        if let Some(dir) = &self.storage.backup_dir {
            return Ok(dir.clone());
        }
        Ok(self.data_dir()?.join("backups"))
    }
}
