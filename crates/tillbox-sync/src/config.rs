//! # Sync Configuration
//!
//! Settings for the sync queue, the drain worker and the remote backend.
//!
//! These are the `[sync]` and `[backend]` sections of the terminal config
//! file; loading and environment overrides live in the terminal app.
//!
//! ## Configuration File Format
//! ```toml
//! [sync]
//! mode = "online"          # online | offline
//! poll_interval_secs = 30
//! retry_delay_secs = 5
//! max_retries_sale = 5
//! max_retries_sale_items = 5
//! max_retries_inventory = 3
//!
//! [backend]
//! url = "https://backend.example.com"
//! api_key = "anon-key"
//! request_timeout_secs = 15
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::mutation::MutationKind;

// =============================================================================
// Sync Mode
// =============================================================================

/// Whether this terminal pushes its writes to the backend.
///
/// ## Mode Selection
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                        Sync Mode Behavior                               │
/// │                                                                         │
/// │  ONLINE (Default)                                                      │
/// │  ────────────────                                                      │
/// │  • Mutations are queued and drained to the backend                     │
/// │  • Requires [backend] url                                              │
/// │                                                                         │
/// │  OFFLINE                                                               │
/// │  ───────                                                               │
/// │  • Mutations are still queued, nothing is sent                         │
/// │  • Switching back to online drains the backlog                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Online,

    /// Queue locally, never send.
    Offline,
}

impl SyncMode {
    /// Returns true if the drain worker should run.
    pub fn is_sync_enabled(&self) -> bool {
        matches!(self, SyncMode::Online)
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Online => write!(f, "online"),
            SyncMode::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" | "auto" => Ok(SyncMode::Online),
            "offline" | "disabled" => Ok(SyncMode::Offline),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown sync mode: '{}'. Valid options: online, offline",
                other
            ))),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Queue and worker behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub mode: SyncMode,

    /// Interval between timer-driven drains (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Fixed pause after a failed attempt (seconds).
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_max_retries_sale")]
    pub max_retries_sale: u32,

    #[serde(default = "default_max_retries_sale_items")]
    pub max_retries_sale_items: u32,

    #[serde(default = "default_max_retries_inventory")]
    pub max_retries_inventory: u32,
}

fn default_poll_interval() -> u64 {
    30
}
fn default_retry_delay() -> u64 {
    5
}
fn default_max_retries_sale() -> u32 {
    5
}
fn default_max_retries_sale_items() -> u32 {
    5
}
fn default_max_retries_inventory() -> u32 {
    3
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: SyncMode::default(),
            poll_interval_secs: default_poll_interval(),
            retry_delay_secs: default_retry_delay(),
            max_retries_sale: default_max_retries_sale(),
            max_retries_sale_items: default_max_retries_sale_items(),
            max_retries_inventory: default_max_retries_inventory(),
        }
    }
}

impl SyncSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Attempts allowed before an item of `kind` is dead-lettered.
    pub fn max_retries(&self, kind: MutationKind) -> u32 {
        match kind {
            MutationKind::Sale => self.max_retries_sale,
            MutationKind::SaleItems => self.max_retries_sale_items,
            MutationKind::Inventory => self.max_retries_inventory,
        }
    }
}

// =============================================================================
// Backend Settings
// =============================================================================

/// Remote REST backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL, e.g. `https://backend.example.com`.
    #[serde(default)]
    pub url: Option<String>,

    /// Sent as `apikey` and as the bearer token.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    15
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings {
            url: None,
            api_key: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BackendSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parses and checks the base URL.
    pub fn base_url(&self) -> SyncResult<Url> {
        let raw = self
            .url
            .as_deref()
            .ok_or_else(|| SyncError::InvalidConfig("backend url is not set".into()))?;
        let url = Url::parse(raw)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "Backend URL must start with http:// or https://, got: {}",
                raw
            )));
        }
        Ok(url)
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub backend: BackendSettings,
}

impl SyncConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }

        for kind in MutationKind::ALL {
            if self.sync.max_retries(kind) == 0 {
                return Err(SyncError::InvalidConfig(format!(
                    "max_retries for {} must be at least 1",
                    kind
                )));
            }
        }

        if self.backend.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        // Offline terminals may run without a backend.
        if self.sync.mode.is_sync_enabled() || self.backend.url.is_some() {
            self.backend.base_url()?;
        }

        Ok(())
    }

    /// Returns the sync mode.
    pub fn mode(&self) -> SyncMode {
        self.sync.mode
    }

    /// Returns true if sync is enabled.
    pub fn is_sync_enabled(&self) -> bool {
        self.sync.mode.is_sync_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn online() -> SyncConfig {
        SyncConfig {
            backend: BackendSettings {
                url: Some("https://backend.example.com".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_sync_mode_parsing() {
        assert_eq!("online".parse::<SyncMode>().unwrap(), SyncMode::Online);
        assert_eq!("OFFLINE".parse::<SyncMode>().unwrap(), SyncMode::Offline);
        assert_eq!("disabled".parse::<SyncMode>().unwrap(), SyncMode::Offline);
        assert!("primary".parse::<SyncMode>().is_err());
    }

    #[test]
    fn test_defaults() {
        let settings = SyncSettings::default();
        assert_eq!(settings.poll_interval(), Duration::from_secs(30));
        assert_eq!(settings.retry_delay(), Duration::from_secs(5));
        assert_eq!(settings.max_retries(MutationKind::Sale), 5);
        assert_eq!(settings.max_retries(MutationKind::SaleItems), 5);
        assert_eq!(settings.max_retries(MutationKind::Inventory), 3);
    }

    #[test]
    fn test_config_validation() {
        assert!(online().validate().is_ok());

        // Online without a backend is not usable.
        let mut config = SyncConfig::default();
        assert!(config.validate().is_err());

        // Offline without a backend is fine.
        config.sync.mode = SyncMode::Offline;
        assert!(config.validate().is_ok());

        let mut config = online();
        config.backend.url = Some("ws://backend.example.com".into());
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        let mut config = online();
        config.sync.max_retries_inventory = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let config: SyncConfig = serde_json::from_str(
            r#"{"sync": {"mode": "offline", "max_retries_sale": 2}}"#,
        )
        .unwrap();
        assert_eq!(config.mode(), SyncMode::Offline);
        assert_eq!(config.sync.max_retries_sale, 2);
        assert_eq!(config.sync.max_retries_inventory, 3);
        assert_eq!(config.backend.request_timeout_secs, 15);
    }
}
