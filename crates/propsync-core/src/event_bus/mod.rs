//! # Event Bus Module
//!
//! Provides the schema-validated event bus used for decoupled communication
//! between views, bindings and the model owner.
//!
//! ## Overview
//!
//! - Every event type is declared in an [`EventTypeRegistry`] with a schema
//! - Publishers dispatch a payload map; the registry validates it and fills defaults
//! - Subscribers are keyed by event type and run synchronously, each in isolation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use propsync_core::event_bus::{event_types, fields, payload, EventBus};
//! use serde_json::json;
//!
//! let bus = EventBus::new();
//!
//! let subscription = bus.subscribe(event_types::MODEL_TO_VIEW_PROPERTY_CHANGED, |event| {
//!     println!("{} changed", event.value(fields::PROPERTY));
//!     Ok(())
//! })?;
//!
//! bus.dispatch(
//!     event_types::MODEL_TO_VIEW_PROPERTY_CHANGED,
//!     payload([
//!         (fields::OBJECT_PATH, json!("user")),
//!         (fields::PROPERTY, json!("name")),
//!         (fields::VALUE, json!("Ada")),
//!     ]),
//! )?;
//!
//! subscription.unsubscribe();
//! ```

mod bus;
mod schema;

pub use bus::*;
pub use schema::*;
