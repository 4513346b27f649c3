//! Error types for the settings crate.
//!
//! [`SettingsError`] covers reading, writing and parsing config files;
//! [`ConfigError`] covers values that parse but cannot be used.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or saving a config file.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The config file could not be read.
    #[error("Failed to read config {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    /// The config file or its directory could not be written.
    #[error("Failed to write config {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    /// A setting holds a value propsync cannot use.
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    /// Neither a config nor a home directory is known for this user.
    #[error("No config or home directory available")]
    ConfigDirectory,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SettingsError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn read(path: &std::path::Path, source: io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn write(path: &std::path::Path, source: io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Structural problems with a config file or one of its values.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Only `.toml` and `.json` files are understood.
    #[error("Unsupported config format '{0}' (expected toml or json)")]
    UnsupportedFormat(String),

    /// A numeric value is outside its accepted range.
    #[error("Value out of range for '{key}': {value}")]
    ValueOutOfRange { key: String, value: String },

    /// The root namespace must be a single plain path segment.
    #[error("Root namespace '{0}' is not a single path segment")]
    InvalidNamespace(String),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_settings_error_display() {
        let err = SettingsError::invalid("binding.revert_delay_ms", "must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid setting 'binding.revert_delay_ms': must be positive"
        );

        let err = SettingsError::read(
            Path::new("/etc/propsync/config.toml"),
            io::Error::new(io::ErrorKind::NotFound, "not found"),
        );
        assert_eq!(
            err.to_string(),
            "Failed to read config /etc/propsync/config.toml: not found"
        );
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err: SettingsError = ConfigError::InvalidNamespace("app.model".to_string()).into();
        assert!(matches!(err, SettingsError::Config(_)));
        assert_eq!(
            err.to_string(),
            "Root namespace 'app.model' is not a single path segment"
        );

        let err: SettingsError = ConfigError::UnsupportedFormat("yaml".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Unsupported config format 'yaml' (expected toml or json)"
        );
    }
}
