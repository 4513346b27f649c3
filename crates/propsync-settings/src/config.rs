//! Configuration for propsync
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats stored in the platform config directory.
//!
//! Configuration is organized into logical sections:
//! - Event bus settings (history, diagnostics for unexpected fields)
//! - Binding settings (rejection revert delay, error class)
//! - Path settings (legacy root namespace)
//! - Logging settings (level filter, output format)

use crate::error::{ConfigError, SettingsError, SettingsResult};
use propsync_binding::BindingConfig;
use propsync_core::{DottedPathResolver, EventBus, EventBusConfig, EventTypeRegistry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name under the platform config directory
pub const APP_DIR_NAME: &str = "propsync";

/// Default config file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Event bus settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// Keep a history of dispatched events
    pub enable_history: bool,
    /// Maximum number of events kept in history
    pub max_history_size: usize,
    /// Age after which history entries are dropped
    pub history_retention_secs: u64,
    /// Log unexpected payload fields at warn level (debug otherwise)
    pub warn_on_unexpected_fields: bool,
}

impl Default for BusSettings {
    fn default() -> Self {
        let defaults = EventBusConfig::default();
        Self {
            enable_history: defaults.enable_history,
            max_history_size: defaults.max_history_size,
            history_retention_secs: defaults.history_retention.as_secs(),
            warn_on_unexpected_fields: true,
        }
    }
}

/// Binding settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingSettings {
    /// Delay before a rejected view reverts on its own
    pub revert_delay_ms: u64,
    /// Class added to a view while it shows a rejected value
    pub error_class: String,
}

impl Default for BindingSettings {
    fn default() -> Self {
        let defaults = BindingConfig::default();
        Self {
            revert_delay_ms: defaults.revert_delay.as_millis() as u64,
            error_class: defaults.error_class,
        }
    }
}

/// Path settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Leading token stripped from every path; empty disables stripping
    pub root_namespace: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            root_namespace: propsync_core::DEFAULT_ROOT_NAMESPACE.to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when RUST_LOG is not set
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete propsync configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub bus: BusSettings,
    pub binding: BindingSettings,
    pub paths: PathSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(other.unwrap_or("<none>").to_string()).into()),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform config directory for propsync
    pub fn config_dir() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .or_else(dirs::home_dir)
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(SettingsError::ConfigDirectory)
    }

    /// Default config file location
    pub fn default_path() -> SettingsResult<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::read(path, e))?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SettingsError::write(parent, e))?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::write(path, e))?;
        Ok(())
    }

    /// Load `path` if it exists, otherwise return defaults
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.bus.enable_history && self.bus.max_history_size == 0 {
            return Err(ConfigError::ValueOutOfRange {
                key: "bus.max_history_size".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        if self.binding.revert_delay_ms == 0 {
            return Err(SettingsError::invalid(
                "binding.revert_delay_ms",
                "must be > 0",
            ));
        }

        if self.binding.error_class.trim().is_empty()
            || self.binding.error_class.contains(char::is_whitespace)
        {
            return Err(SettingsError::invalid(
                "binding.error_class",
                "must be a single non-empty class name",
            ));
        }

        let namespace = self.paths.root_namespace.trim();
        if namespace.contains(['.', '[', ']']) {
            return Err(ConfigError::InvalidNamespace(namespace.to_string()).into());
        }

        if self.logging.level.trim().is_empty() {
            return Err(SettingsError::invalid("logging.level", "must not be empty"));
        }

        Ok(())
    }

    pub fn event_bus_config(&self) -> EventBusConfig {
        EventBusConfig {
            enable_history: self.bus.enable_history,
            max_history_size: self.bus.max_history_size,
            history_retention: Duration::from_secs(self.bus.history_retention_secs),
        }
    }

    /// Bus with the standard event types and these settings
    pub fn event_bus(&self) -> EventBus {
        let registry = EventTypeRegistry::standard_builder()
            .warn_on_unexpected_fields(self.bus.warn_on_unexpected_fields)
            .build();
        EventBus::with_registry(registry, self.event_bus_config())
    }

    pub fn binding_config(&self) -> BindingConfig {
        BindingConfig {
            revert_delay: Duration::from_millis(self.binding.revert_delay_ms),
            error_class: self.binding.error_class.trim().to_string(),
        }
    }

    pub fn path_resolver(&self) -> DottedPathResolver {
        DottedPathResolver::new(self.paths.root_namespace.as_str())
    }
}
