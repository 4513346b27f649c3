//! # propsync Core
//!
//! Core types for propsync, the reactive state-synchronization layer.
//! Provides the event type registry and schema validation, the event bus,
//! object paths, and the shared error taxonomy.

pub mod error;
pub mod event_bus;
pub mod path;
pub mod types;
pub mod value;

pub use error::{Error, Result, SchemaError, WiringError};

// Re-export event bus for convenience
pub use event_bus::{
    event_types, fields, payload, Event, EventBus, EventBusConfig, EventId, EventListener,
    EventTypeRegistry, EventTypeRegistryBuilder, FieldType, OptionalField, Schema, Subscription,
    SubscriptionId,
};

pub use path::{
    matches_change, matches_subtree, DottedPathResolver, ObjectPath, PathIndex, PathResolver,
    DEFAULT_ROOT_NAMESPACE,
};

// Re-export type aliases for convenience
pub use types::{
    shared, shared_none, Shared, SharedHashMap, SharedOption, SharedVec, ValueFormatter,
    ValueParser, ValuePredicate,
};
