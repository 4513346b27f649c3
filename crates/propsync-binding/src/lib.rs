//! # propsync Binding
//!
//! Two-way bindings between views and path-addressed model slots.
//!
//! - [`Binding`]: one view value bound to one model property
//! - Component bindings: callbacks observing a model subtree
//! - Dependent bindings: derived editable/visibility effects
//! - [`BindingManager`]: owns bindings and routes model events to them
//! - [`ObjectModel`]: a reference model owner that validates proposals
//!
//! Everything here is single-threaded and runs on the UI thread.

pub mod binding;
pub mod component;
pub mod dependent;
pub mod manager;
pub mod model;
pub mod timer;
pub mod view;

pub use binding::{
    number_parser, read_view_value, text_formatter, write_view_value, Binding, BindingConfig,
    BindingContext, BindingId, BindingOptions, BindingRole, BindingState, UpdateGuard,
    DEFAULT_ERROR_CLASS, DEFAULT_REVERT_DELAY, VALIDATION_ERROR_ATTRIBUTE,
};
pub use component::{
    component_binding, ComponentBindingOptions, ComponentCallback, ComponentNotification,
    ModelChange, ModelSnapshot,
};
pub use dependent::{
    dependent_binding, editable, visibility, DependentBindingOptions, DependentEffect,
    DISABLED_CLASS, HIDDEN_CLASS,
};
pub use manager::BindingManager;
pub use model::{ObjectModel, Validator, MODEL_SOURCE};
pub use timer::{LocalTokioScheduler, ManualClock, TimerCallback, TimerHandle, TimerScheduler};
pub use view::{
    HeadlessView, View, ViewError, ViewEvent, ViewEventHandler, ViewId, ViewKind, ViewListenerId,
};
