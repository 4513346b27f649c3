//! # propsync
//!
//! Reactive state synchronization between UI views and a path-addressed
//! model, mediated by a schema-validated event bus.
//!
//! ## Architecture
//!
//! propsync is organized as a workspace with multiple crates:
//!
//! 1. **propsync-core** - Event schemas, event bus, object paths, errors
//! 2. **propsync-binding** - Views, bindings, binding manager, reference model owner
//! 3. **propsync-settings** - Configuration files and validation
//! 4. **propsync** - Logging setup, stack assembly and the headless demo
//!
//! ## Data flow
//!
//! - A user edit becomes a `VIEW_TO_MODEL_PROPERTY_CHANGED` proposal
//! - The model owner accepts it and announces `MODEL_TO_VIEW_PROPERTY_CHANGED`,
//!   or answers with `PROPERTY_CHANGE_REJECTED`
//! - The binding manager routes both back to the bindings they concern

use std::rc::Rc;

pub use propsync_binding::{
    Binding, BindingConfig, BindingContext, BindingManager, BindingOptions,
    ComponentBindingOptions, ComponentNotification, DependentBindingOptions, DependentEffect,
    HeadlessView, LocalTokioScheduler, ManualClock, ObjectModel, TimerScheduler, View, ViewId,
    ViewKind,
};
pub use propsync_core::{
    event_types, fields, payload, DottedPathResolver, Error, Event, EventBus, EventTypeRegistry,
    ObjectPath, PathResolver, Result, Schema, SchemaError, WiringError,
};
pub use propsync_settings::{Config, LoggingSettings, SettingsError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
/// - INFO as the default level
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with(&LoggingSettings::default())
}

/// Initialize logging from the `[logging]` config section
///
/// RUST_LOG takes precedence over `settings.level`.
pub fn init_logging_with(settings: &LoggingSettings) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(settings.level.trim()))?;

    if settings.json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_line_number(true)
            .pretty();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

/// A bus, resolver and binding manager wired from one [`Config`]
pub struct SyncStack {
    pub bus: EventBus,
    pub resolver: Rc<dyn PathResolver>,
    pub manager: BindingManager,
}

impl SyncStack {
    pub fn from_config(config: &Config, scheduler: Rc<dyn TimerScheduler>) -> anyhow::Result<Self> {
        config.validate()?;
        let bus = config.event_bus();
        let resolver: Rc<dyn PathResolver> = Rc::new(config.path_resolver());
        let ctx = BindingContext::new(bus.clone(), Rc::clone(&resolver), scheduler)
            .with_config(config.binding_config());
        let manager = BindingManager::new(ctx)?;
        tracing::debug!(
            "Sync stack ready (history: {}, revert delay: {} ms)",
            config.bus.enable_history,
            config.binding.revert_delay_ms
        );
        Ok(Self {
            bus,
            resolver,
            manager,
        })
    }

    /// Reference model owner on this stack's bus, already attached
    pub fn attach_model(&self, root: serde_json::Value) -> anyhow::Result<ObjectModel> {
        let model = ObjectModel::new(self.bus.clone(), Rc::clone(&self.resolver), root);
        model.attach()?;
        Ok(model)
    }
}
