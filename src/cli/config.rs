//! Configuration file handling for yasai-gate
//!
//! Manages configuration stored in `~/.config/yasai-gate/config.toml` (or
//! platform equivalent). Missing or unparsable files fall back to defaults.
//!
//! ## Example Config File
//!
//! ```toml
//! version = 1
//!
//! [unlock]
//! duration_secs = 43200
//! sweep_interval_secs = 300
//! lockable_items = ["だいこん", "いちご"]
//! persist_retries = 1
//!
//! [ads]
//! load_timeout_ms = 5000
//! reload_after_show = true
//!
//! [entitlement]
//! poll_interval_secs = 60
//!
//! [display]
//! remaining_style = "japanese"
//! locale = "ja"
//!
//! [output]
//! default_format = "human"
//! color = true
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{Collator, LockableSet};
use crate::gate::GateSettings;
use crate::subsystem::SubsystemSettings;
use crate::unlock::RemainingStyle;

// Config file format version
// Bump this when making breaking changes to the config structure
const CONFIG_VERSION: u32 = 1;
const LEGACY_CONFIG_VERSION: u32 = 0;

/// Unlock window that early builds shipped for testing
const LEGACY_TEST_DURATION_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Config file format version for migrations
    #[serde(default = "default_config_version")]
    pub version: u32,

    #[serde(default)]
    pub unlock: UnlockConfig,

    #[serde(default)]
    pub ads: AdsConfig,

    #[serde(default)]
    pub entitlement: EntitlementConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_config_version() -> u32 {
    LEGACY_CONFIG_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockConfig {
    /// How long one reward unlocks an item
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Item ids that require an unlock
    #[serde(default)]
    pub lockable_items: Vec<String>,

    /// Extra save attempts after a reward when the first save fails
    #[serde(default = "default_persist_retries")]
    pub persist_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdsConfig {
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Load the next rewarded unit after every presentation
    #[serde(default = "default_true")]
    pub reload_after_show: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub remaining_style: RemainingStyle,

    /// Locale used for name collation
    #[serde(default = "default_locale")]
    pub locale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format (human, json)
    #[serde(default = "default_format")]
    pub default_format: String,

    #[serde(default = "default_true")]
    pub color: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Override for the data directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

// =============================================================================
// Default Value Functions
// =============================================================================

fn default_duration_secs() -> u64 {
    crate::unlock::UNLOCK_DURATION.as_secs()
}

fn default_sweep_interval_secs() -> u64 {
    crate::unlock::SWEEP_INTERVAL.as_secs()
}

fn default_persist_retries() -> u32 {
    1
}

fn default_load_timeout_ms() -> u64 {
    crate::clock::duration_ms(crate::gate::DEFAULT_LOAD_TIMEOUT)
}

fn default_poll_interval_secs() -> u64 {
    crate::entitlement::ENTITLEMENT_POLL_INTERVAL.as_secs()
}

fn default_locale() -> String {
    "ja".to_string()
}

fn default_format() -> String {
    "human".to_string()
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Default Implementations
// =============================================================================

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            unlock: UnlockConfig::default(),
            ads: AdsConfig::default(),
            entitlement: EntitlementConfig::default(),
            display: DisplayConfig::default(),
            output: OutputConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            lockable_items: Vec::new(),
            persist_retries: default_persist_retries(),
        }
    }
}

impl Default for AdsConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: default_load_timeout_ms(),
            reload_after_show: true,
        }
    }
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            remaining_style: RemainingStyle::default(),
            locale: default_locale(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            color: true,
        }
    }
}

// =============================================================================
// Configuration Loading and Saving
// =============================================================================

impl GateConfig {
    /// Get the default configuration file path
    ///
    /// - Linux: `~/.config/yasai-gate/config.toml`
    /// - macOS: `~/Library/Application Support/yasai-gate/config.toml`
    /// - Windows: `%APPDATA%\yasai-gate\config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("yasai-gate")
            .join("config.toml")
    }

    pub fn load() -> Self {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    ///
    /// Returns default configuration if the file doesn't exist or can't be parsed.
    /// Performs automatic migration if the config version is outdated.
    pub fn load_from(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<Self>(&content) {
                Ok(mut config) => {
                    tracing::debug!("Loaded config from {:?}", path);

                    let original_version = config.version;
                    config.migrate_if_needed();
                    let normalized = config.normalize();

                    if config.version != original_version || normalized {
                        tracing::info!(
                            "Config updated (version {} -> {})",
                            original_version,
                            config.version
                        );
                        if let Err(e) = config.save_to(path.clone()) {
                            tracing::warn!("Failed to persist migrated config {:?}: {}", path, e);
                        }
                    }

                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config at {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!("Config file not found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    fn migrate_if_needed(&mut self) {
        match self.version {
            LEGACY_CONFIG_VERSION => {
                if self.unlock.duration_secs == LEGACY_TEST_DURATION_SECS {
                    tracing::info!(
                        "Migrating config: resetting test unlock duration to {}s",
                        default_duration_secs()
                    );
                    self.unlock.duration_secs = default_duration_secs();
                }
                self.version = CONFIG_VERSION;
            }
            CONFIG_VERSION => {}
            _ => {
                tracing::warn!(
                    "Config version {} is newer than supported version {}. Some settings may be ignored.",
                    self.version,
                    CONFIG_VERSION
                );
            }
        }
    }

    /// Replace values that would stall timers or make no sense; returns
    /// whether anything changed
    fn normalize(&mut self) -> bool {
        let mut changed = false;

        if self.unlock.duration_secs == 0 {
            self.unlock.duration_secs = default_duration_secs();
            changed = true;
        }
        if self.unlock.sweep_interval_secs == 0 {
            self.unlock.sweep_interval_secs = default_sweep_interval_secs();
            changed = true;
        }
        if self.entitlement.poll_interval_secs == 0 {
            self.entitlement.poll_interval_secs = default_poll_interval_secs();
            changed = true;
        }

        let mut seen = std::collections::HashSet::new();
        let items: Vec<String> = self
            .unlock
            .lockable_items
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        if items != self.unlock.lockable_items {
            self.unlock.lockable_items = items;
            changed = true;
        }

        if !["human", "json"].contains(&self.output.default_format.as_str()) {
            self.output.default_format = default_format();
            changed = true;
        }

        changed
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    ///
    /// Creates parent directories if they don't exist.
    pub fn save_to(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&path, content)?;
        tracing::debug!("Saved config to {:?}", path);

        Ok(())
    }

    /// Data directory for the durable store
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(crate::storage::default_data_dir)
    }

    /// Runtime settings for [`crate::subsystem::UnlockSubsystem`]
    pub fn subsystem_settings(&self) -> SubsystemSettings {
        SubsystemSettings {
            gate: GateSettings {
                unlock_duration: Duration::from_secs(self.unlock.duration_secs),
                load_timeout: Duration::from_millis(self.ads.load_timeout_ms),
                reload_after_show: self.ads.reload_after_show,
                persist_retries: self.unlock.persist_retries,
            },
            sweep_interval: Duration::from_secs(self.unlock.sweep_interval_secs),
            entitlement_poll_interval: Duration::from_secs(self.entitlement.poll_interval_secs),
            lockable: LockableSet::new(self.unlock.lockable_items.iter().cloned()),
            remaining_style: self.display.remaining_style,
            collator: Collator::for_locale(&self.display.locale),
        }
    }

    /// Get a configuration value by key path
    ///
    /// Key path uses dot notation: `unlock.duration_secs`
    pub fn get(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["unlock", "duration_secs"] => Some(self.unlock.duration_secs.to_string()),
            ["unlock", "sweep_interval_secs"] => Some(self.unlock.sweep_interval_secs.to_string()),
            ["unlock", "lockable_items"] => Some(self.unlock.lockable_items.join(",")),
            ["unlock", "persist_retries"] => Some(self.unlock.persist_retries.to_string()),
            ["ads", "load_timeout_ms"] => Some(self.ads.load_timeout_ms.to_string()),
            ["ads", "reload_after_show"] => Some(self.ads.reload_after_show.to_string()),
            ["entitlement", "poll_interval_secs"] => {
                Some(self.entitlement.poll_interval_secs.to_string())
            }
            ["display", "remaining_style"] => Some(self.display.remaining_style.to_string()),
            ["display", "locale"] => Some(self.display.locale.clone()),
            ["output", "default_format"] => Some(self.output.default_format.clone()),
            ["output", "color"] => Some(self.output.color.to_string()),
            ["storage", "data_dir"] => Some(self.data_dir().display().to_string()),
            _ => None,
        }
    }

    /// Set a configuration value by key path
    ///
    /// Returns an error if the key is invalid or the value can't be parsed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["unlock", "duration_secs"] => {
                self.unlock.duration_secs = parse_positive(key, value)?;
            }
            ["unlock", "sweep_interval_secs"] => {
                self.unlock.sweep_interval_secs = parse_positive(key, value)?;
            }
            ["unlock", "lockable_items"] => {
                self.unlock.lockable_items = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            ["unlock", "persist_retries"] => {
                self.unlock.persist_retries = parse_value(key, value, "non-negative integer")?;
            }
            ["ads", "load_timeout_ms"] => {
                self.ads.load_timeout_ms = parse_positive(key, value)?;
            }
            ["ads", "reload_after_show"] => {
                self.ads.reload_after_show = parse_value(key, value, "true or false")?;
            }
            ["entitlement", "poll_interval_secs"] => {
                self.entitlement.poll_interval_secs = parse_positive(key, value)?;
            }
            ["display", "remaining_style"] => {
                self.display.remaining_style = parse_value(key, value, "japanese or clock")?;
            }
            ["display", "locale"] => {
                if value.trim().is_empty() {
                    return Err(invalid(key, value, "locale tag such as ja or en"));
                }
                self.display.locale = value.trim().to_string();
            }
            ["output", "default_format"] => {
                if !["human", "json"].contains(&value) {
                    return Err(invalid(key, value, "human or json"));
                }
                self.output.default_format = value.to_string();
            }
            ["output", "color"] => {
                self.output.color = parse_value(key, value, "true or false")?;
            }
            ["storage", "data_dir"] => {
                self.storage.data_dir = if value.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            _ => {
                return Err(ConfigError::UnknownKey(key.to_string()));
            }
        }

        self.normalize();
        Ok(())
    }

    /// List all configuration keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        [
            "unlock.duration_secs",
            "unlock.sweep_interval_secs",
            "unlock.lockable_items",
            "unlock.persist_retries",
            "ads.load_timeout_ms",
            "ads.reload_after_show",
            "entitlement.poll_interval_secs",
            "display.remaining_style",
            "display.locale",
            "output.default_format",
            "output.color",
            "storage.data_dir",
        ]
        .iter()
        .filter_map(|key| self.get(key).map(|value| (key.to_string(), value)))
        .collect()
    }
}

fn invalid(key: &str, value: &str, expected: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str, expected: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value, expected))
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
{
    let parsed: T = parse_value(key, value, "positive integer")?;
    if parsed == T::default() {
        return Err(invalid(key, value, "positive integer"));
    }
    Ok(parsed)
}

// =============================================================================
// Errors
// =============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: '{value}' (expected {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Tests
// =============================================================================
