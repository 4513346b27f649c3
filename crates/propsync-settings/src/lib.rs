//! propsync Settings Crate
//!
//! Handles configuration files for the event bus, bindings, paths and logging.

pub mod config;
pub mod error;

pub use config::{
    BindingSettings, BusSettings, Config, LoggingSettings, PathSettings, APP_DIR_NAME,
    CONFIG_FILE_NAME,
};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
