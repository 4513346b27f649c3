//! Two-way binding between one view and one model slot
//!
//! A [`Binding`] owns the listeners it installs: one view listener that
//! turns user edits into `VIEW_TO_MODEL_PROPERTY_CHANGED` proposals, and bus
//! subscriptions that write accepted model values back into the view. An
//! [`UpdateGuard`] held during model-to-view writes stops the view's own
//! change notification from echoing back to the model.
//!
//! Component and dependent bindings share this type; they differ only in
//! what they do with a matching model change (see [`BindingKind`]).

use crate::component::{ComponentCallback, ComponentNotification, ModelChange, ModelSnapshot};
use crate::dependent::DependentEffect;
use crate::timer::{TimerHandle, TimerScheduler};
use crate::view::{View, ViewEventHandler, ViewId, ViewListenerId};
use propsync_core::event_bus::{
    event_types, fields, payload, Event, EventBus, EventId, Subscription,
};
use propsync_core::path::{matches_change, matches_subtree, ObjectPath, PathResolver};
use propsync_core::types::{ValueFormatter, ValueParser, ValuePredicate};
use propsync_core::value::{display_string, is_truthy};
use propsync_core::{Error, Result, WiringError};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Attribute set on a view while it shows a rejected value
pub const VALIDATION_ERROR_ATTRIBUTE: &str = "data-validation-error";

/// Default delay before a rejected view reverts on its own
pub const DEFAULT_REVERT_DELAY: Duration = Duration::from_millis(2000);

/// Default class added to a view while it shows a rejected value
pub const DEFAULT_ERROR_CLASS: &str = "validation-error";

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique binding identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl BindingId {
    fn next() -> Self {
        Self(NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding-{}", self.0)
    }
}

/// Rejection recovery settings shared by all bindings of a manager
#[derive(Debug, Clone, PartialEq)]
pub struct BindingConfig {
    pub revert_delay: Duration,
    pub error_class: String,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            revert_delay: DEFAULT_REVERT_DELAY,
            error_class: DEFAULT_ERROR_CLASS.to_string(),
        }
    }
}

/// Everything a binding needs from its surroundings
#[derive(Clone)]
pub struct BindingContext {
    pub bus: EventBus,
    pub resolver: Rc<dyn PathResolver>,
    pub scheduler: Rc<dyn TimerScheduler>,
    pub config: BindingConfig,
    /// Set by the manager, which routes model changes itself
    pub(crate) managed: bool,
}

impl BindingContext {
    pub fn new(
        bus: EventBus,
        resolver: Rc<dyn PathResolver>,
        scheduler: Rc<dyn TimerScheduler>,
    ) -> Self {
        Self {
            bus,
            resolver,
            scheduler,
            config: BindingConfig::default(),
            managed: false,
        }
    }

    pub fn with_config(mut self, config: BindingConfig) -> Self {
        self.config = config;
        self
    }
}

/// Observable lifecycle state of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Idle,
    /// A view change is being dispatched
    ViewToModelPending,
    /// A model value is being written into the view
    ModelToViewUpdating,
    /// The view shows a rejected value
    Error,
}

/// What a binding does with a matching model change
pub(crate) enum BindingKind {
    Value,
    Component {
        callback: RefCell<Option<ComponentCallback>>,
        snapshot: RefCell<Option<ModelSnapshot>>,
    },
    Dependent {
        effect: DependentEffect,
        predicate: ValuePredicate,
    },
}

/// Public summary of [`BindingKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingRole {
    Value,
    Component,
    Dependent(DependentEffect),
}

/// Scoped hold on a binding's "updating from model" flag
///
/// The flag is set on creation and cleared on drop, including during unwinding.
#[must_use = "the flag is released as soon as the guard is dropped"]
pub struct UpdateGuard<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> UpdateGuard<'a> {
    pub fn acquire(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(true);
        Self { flag, previous }
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

/// Configuration for a value binding
pub struct BindingOptions {
    pub(crate) view: Rc<dyn View>,
    pub(crate) path: Option<String>,
    pub(crate) object_path: Option<String>,
    pub(crate) property: Option<String>,
    pub(crate) view_attribute: String,
    pub(crate) view_event: Option<String>,
    pub(crate) model_events: Vec<String>,
    pub(crate) parser: Option<ValueParser>,
    pub(crate) formatter: Option<ValueFormatter>,
}

impl BindingOptions {
    pub fn new(view: Rc<dyn View>) -> Self {
        Self {
            view,
            path: None,
            object_path: None,
            property: None,
            view_attribute: "value".to_string(),
            view_event: None,
            model_events: Vec::new(),
            parser: None,
            formatter: None,
        }
    }

    /// Full path ("user.name"); split into object path and property
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Object path, used together with [`property`](Self::property)
    pub fn object_path(mut self, object_path: impl Into<String>) -> Self {
        self.object_path = Some(object_path.into());
        self
    }

    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// View property or attribute holding the value (default "value")
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.view_attribute = attribute.into();
        self
    }

    /// View event signalling a user change; defaults by view kind
    pub fn view_event(mut self, event: impl Into<String>) -> Self {
        self.view_event = Some(event.into());
        self
    }

    /// Listen for an extra model event type besides MODEL_TO_VIEW_PROPERTY_CHANGED
    pub fn model_event(mut self, event_type: impl Into<String>) -> Self {
        self.model_events.push(event_type.into());
        self
    }

    pub fn parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(Value) -> Value + 'static,
    {
        self.parser = Some(Rc::new(parser));
        self
    }

    pub fn formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&Value) -> Value + 'static,
    {
        self.formatter = Some(Rc::new(formatter));
        self
    }
}

/// Resolved target and wiring for a new binding
pub(crate) struct BindingParts {
    pub view: Rc<dyn View>,
    pub object_path: ObjectPath,
    pub property: String,
    pub view_attribute: String,
    pub view_event: Option<String>,
    pub model_events: Vec<String>,
    pub parser: Option<ValueParser>,
    pub formatter: Option<ValueFormatter>,
    pub kind: BindingKind,
}

/// Parse the target of a binding from either a full path or object path + property
pub(crate) fn resolve_target(
    resolver: &dyn PathResolver,
    path: Option<&str>,
    object_path: Option<&str>,
    property: Option<&str>,
) -> Result<(ObjectPath, String)> {
    match (property, path) {
        (Some(property), _) => {
            let property = property.trim();
            if property.is_empty() {
                return Err(Error::invalid_path(
                    object_path.unwrap_or_default(),
                    "property is empty",
                ));
            }
            let object_path = resolver.parse_object_path(object_path.unwrap_or_default())?;
            object_path.with_property(property)?;
            Ok((object_path, property.to_string()))
        }
        (None, Some(path)) => resolver.split_property(path),
        (None, None) => Err(Error::invalid_path("", "binding needs a path or a property")),
    }
}

/// Read the object path and property a change event refers to
///
/// Malformed events are logged and skipped.
pub(crate) fn change_target(
    resolver: &dyn PathResolver,
    event: &Event,
) -> Option<(ObjectPath, String)> {
    let raw_path = event.str_field(fields::OBJECT_PATH).unwrap_or_default();
    let property = event.str_field(fields::PROPERTY).unwrap_or_default();
    match resolver.parse_object_path(raw_path) {
        Ok(path) => Some((path, property.to_string())),
        Err(err) => {
            tracing::warn!(
                "Ignoring {} {} with bad object path: {}",
                event.event_type(),
                event.id(),
                err
            );
            None
        }
    }
}

/// Read the current value out of a view
pub fn read_view_value(view: &dyn View, attribute: &str) -> Value {
    match attribute {
        "value" => view.get_property("value").unwrap_or(Value::Null),
        "checked" => Value::Bool(view.get_property("checked").is_some_and(|v| is_truthy(&v))),
        other => view
            .get_property(other)
            .or_else(|| view.get_attribute(other).map(Value::String))
            .unwrap_or(Value::Null),
    }
}

/// Write a value into a view following the usual element conventions
pub fn write_view_value(view: &dyn View, attribute: &str, value: Value) {
    let result = match attribute {
        "checked" => view.set_property("checked", Value::Bool(is_truthy(&value))),
        "textContent" | "innerHTML" => {
            view.set_property(attribute, Value::String(display_string(&value)))
        }
        "value" => view.set_property("value", value),
        other => match view.set_property(other, value.clone()) {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::trace!("Falling back to attribute '{}': {}", other, err);
                view.set_attribute(other, &display_string(&value));
                Ok(())
            }
        },
    };
    if let Err(err) = result {
        tracing::warn!("Failed to write '{}' on view {}: {}", attribute, view.id(), err);
    }
}

/// Parser turning text input into a JSON number; unparseable text stays as is
pub fn number_parser(raw: Value) -> Value {
    match &raw {
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                json!(i)
            } else if let Some(n) = trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
            {
                Value::Number(n)
            } else {
                raw
            }
        }
        _ => raw,
    }
}

/// Formatter rendering any value as display text
pub fn text_formatter(value: &Value) -> Value {
    Value::String(display_string(value))
}

pub struct Binding {
    id: BindingId,
    object_path: ObjectPath,
    property: String,
    target: ObjectPath,
    full_path: String,
    view: RefCell<Option<Rc<dyn View>>>,
    view_id: ViewId,
    view_attribute: String,
    view_event: Option<String>,
    model_events: Vec<String>,
    parser: Option<ValueParser>,
    formatter: Option<ValueFormatter>,
    pub(crate) kind: BindingKind,
    bus: EventBus,
    resolver: Rc<dyn PathResolver>,
    scheduler: Rc<dyn TimerScheduler>,
    config: BindingConfig,
    updating: Cell<bool>,
    dispatching: Cell<bool>,
    in_error: Cell<bool>,
    last_handled: Cell<Option<EventId>>,
    last_valid_value: RefCell<Option<Value>>,
    revert_timer: Cell<Option<TimerHandle>>,
    view_listeners: RefCell<Vec<ViewListenerId>>,
    recovery_listeners: RefCell<Vec<ViewListenerId>>,
    subscriptions: RefCell<Vec<Subscription>>,
    destroyed: Cell<bool>,
}

impl Binding {
    /// Create a standalone value binding and wire its listeners
    pub fn new(options: BindingOptions, ctx: &BindingContext) -> Result<Rc<Self>> {
        let (object_path, property) = resolve_target(
            ctx.resolver.as_ref(),
            options.path.as_deref(),
            options.object_path.as_deref(),
            options.property.as_deref(),
        )?;
        let view_event = options
            .view_event
            .unwrap_or_else(|| options.view.kind().default_event().to_string());

        Self::build(
            BindingParts {
                view: options.view,
                object_path,
                property,
                view_attribute: options.view_attribute,
                view_event: Some(view_event),
                model_events: options.model_events,
                parser: options.parser,
                formatter: options.formatter,
                kind: BindingKind::Value,
            },
            ctx,
        )
    }

    pub(crate) fn build(parts: BindingParts, ctx: &BindingContext) -> Result<Rc<Self>> {
        if let Some(event) = parts.view_event.as_deref() {
            if event.trim().is_empty() {
                return Err(WiringError::InvalidEventType {
                    event_type: event.to_string(),
                }
                .into());
            }
        }
        for event_type in &parts.model_events {
            if event_type.trim().is_empty() {
                return Err(WiringError::InvalidEventType {
                    event_type: event_type.clone(),
                }
                .into());
            }
        }

        // The manager routes MODEL_TO_VIEW itself; standalone bindings listen directly.
        let mut model_events = Vec::with_capacity(parts.model_events.len() + 1);
        if !ctx.managed {
            model_events.push(event_types::MODEL_TO_VIEW_PROPERTY_CHANGED.to_string());
        }
        for event_type in parts.model_events {
            if !model_events.contains(&event_type) {
                model_events.push(event_type);
            }
        }

        let target = parts
            .object_path
            .with_property(&parts.property)
            .unwrap_or_else(|_| parts.object_path.clone());
        let full_path = target.to_string();

        let binding = Rc::new(Self {
            id: BindingId::next(),
            view_id: parts.view.id(),
            view: RefCell::new(Some(parts.view)),
            object_path: parts.object_path,
            property: parts.property,
            target,
            full_path,
            view_attribute: parts.view_attribute,
            view_event: parts.view_event,
            model_events,
            parser: parts.parser,
            formatter: parts.formatter,
            kind: parts.kind,
            bus: ctx.bus.clone(),
            resolver: Rc::clone(&ctx.resolver),
            scheduler: Rc::clone(&ctx.scheduler),
            config: ctx.config.clone(),
            updating: Cell::new(false),
            dispatching: Cell::new(false),
            in_error: Cell::new(false),
            last_handled: Cell::new(None),
            last_valid_value: RefCell::new(None),
            revert_timer: Cell::new(None),
            view_listeners: RefCell::new(Vec::new()),
            recovery_listeners: RefCell::new(Vec::new()),
            subscriptions: RefCell::new(Vec::new()),
            destroyed: Cell::new(false),
        });

        if let Err(err) = binding.wire() {
            binding.destroy();
            return Err(err);
        }
        tracing::debug!(
            "Created {} on view {} for '{}'",
            binding.id,
            binding.view_id,
            binding.full_path
        );
        Ok(binding)
    }

    fn wire(self: &Rc<Self>) -> Result<()> {
        if let (Some(event), Some(view)) = (self.view_event.as_deref(), self.view()) {
            let weak = Rc::downgrade(self);
            let handler: ViewEventHandler = Rc::new(move |_| {
                if let Some(binding) = weak.upgrade() {
                    binding.handle_view_change();
                }
            });
            let id = view.add_event_listener(event, handler);
            self.view_listeners.borrow_mut().push(id);
        }

        for event_type in &self.model_events {
            let weak = Rc::downgrade(self);
            let subscription = self.bus.subscribe(event_type, move |event| {
                if let Some(binding) = weak.upgrade() {
                    binding.handle_model_change(event);
                }
                Ok(())
            })?;
            self.subscriptions.borrow_mut().push(subscription);
        }
        Ok(())
    }

    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn object_path(&self) -> &ObjectPath {
        &self.object_path
    }

    /// Bound property; empty for component bindings observing a subtree
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Full canonical path of the bound slot
    pub fn path(&self) -> &str {
        &self.full_path
    }

    pub fn view_id(&self) -> &ViewId {
        &self.view_id
    }

    /// The bound view, or None once destroyed
    pub fn view(&self) -> Option<Rc<dyn View>> {
        self.view.borrow().clone()
    }

    pub fn view_attribute(&self) -> &str {
        &self.view_attribute
    }

    pub fn view_event(&self) -> Option<&str> {
        self.view_event.as_deref()
    }

    /// Event types this binding subscribed to on the bus
    pub fn model_events(&self) -> &[String] {
        &self.model_events
    }

    pub fn role(&self) -> BindingRole {
        match &self.kind {
            BindingKind::Value => BindingRole::Value,
            BindingKind::Component { .. } => BindingRole::Component,
            BindingKind::Dependent { effect, .. } => BindingRole::Dependent(*effect),
        }
    }

    pub fn is_updating_from_model(&self) -> bool {
        self.updating.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub fn is_in_error(&self) -> bool {
        self.in_error.get()
    }

    pub fn state(&self) -> BindingState {
        if self.updating.get() {
            BindingState::ModelToViewUpdating
        } else if self.dispatching.get() {
            BindingState::ViewToModelPending
        } else if self.in_error.get() {
            BindingState::Error
        } else {
            BindingState::Idle
        }
    }

    /// Last model value this binding accepted or was told about
    pub fn last_valid_value(&self) -> Option<Value> {
        self.last_valid_value.borrow().clone()
    }

    /// Suppress view-to-model dispatch while the guard is held
    ///
    /// For hosts writing to the view programmatically outside a model change.
    pub fn begin_model_update(&self) -> UpdateGuard<'_> {
        UpdateGuard::acquire(&self.updating)
    }

    /// Does a change at `(path, property)` concern this binding?
    pub fn matches(&self, path: &ObjectPath, property: &str) -> bool {
        match &self.kind {
            BindingKind::Component { .. } if self.property.is_empty() => {
                matches_subtree(&self.object_path, path, property)
            }
            _ => matches_change(&self.object_path, &self.property, path, property),
        }
    }

    /// Turn the view's current value into a change proposal
    pub fn handle_view_change(&self) {
        if self.updating.get() {
            tracing::trace!("{}: view change during model update discarded", self.id);
            return;
        }
        if !matches!(self.kind, BindingKind::Value) {
            return;
        }
        let Some(view) = self.view() else {
            tracing::debug!("{}: view change after destroy ignored", self.id);
            return;
        };

        let raw = read_view_value(view.as_ref(), &self.view_attribute);
        let value = match &self.parser {
            Some(parser) => parser(raw),
            None => raw,
        };

        let data = payload([
            (fields::OBJECT_PATH, Value::String(self.object_path.to_string())),
            (fields::PROPERTY, Value::String(self.property.clone())),
            (fields::VALUE, value),
            (fields::PATH, Value::String(self.full_path.clone())),
            (fields::SOURCE_VIEW, Value::String(self.view_id.to_string())),
        ]);

        let result = {
            let _pending = UpdateGuard::acquire(&self.dispatching);
            self.bus
                .dispatch(event_types::VIEW_TO_MODEL_PROPERTY_CHANGED, data)
        };
        if let Err(err) = result {
            tracing::error!(
                "{}: failed to propose change to '{}': {}",
                self.id,
                self.full_path,
                err
            );
        }
    }

    /// Apply a model change event if it concerns this binding
    pub fn handle_model_change(&self, event: &Event) {
        let Some((path, property)) = change_target(self.resolver.as_ref(), event) else {
            return;
        };
        if self.matches(&path, &property) {
            self.apply_model_change(event, &path, &property);
        }
    }

    /// Apply an already-matched change
    ///
    /// Each event is applied at most once, and an event older than the last
    /// one applied is skipped so a re-entrant newer value is never overwritten.
    pub(crate) fn apply_model_change(&self, event: &Event, path: &ObjectPath, property: &str) {
        let stale = self.last_handled.get().is_some_and(|last| event.id() <= last);
        if self.destroyed.get() || stale {
            return;
        }
        self.last_handled.set(Some(event.id()));
        let value = event.value(fields::VALUE);

        match &self.kind {
            BindingKind::Value => {
                if let Some(slot) = self.slot_value(path, property, value) {
                    self.apply_model_value(&slot);
                }
            }
            BindingKind::Component { callback, snapshot } => {
                let callback = callback.borrow().clone();
                let Some(callback) = callback else {
                    return;
                };
                let model = snapshot.borrow().clone().map(|snapshot| snapshot());
                let changed_path = match path.with_property(property) {
                    Ok(full) => full.to_string(),
                    Err(_) => path.to_string(),
                };
                callback(&ComponentNotification::Changed(ModelChange {
                    object_path: path,
                    property,
                    changed_path: &changed_path,
                    value,
                    model: model.as_ref(),
                    event,
                }));
            }
            BindingKind::Dependent { effect, predicate } => {
                let Some(slot) = self.slot_value(path, property, value) else {
                    return;
                };
                if let Some(view) = self.view() {
                    effect.apply(view.as_ref(), predicate(&slot));
                }
            }
        }
    }

    /// The part of a change's value that belongs to this binding's slot
    ///
    /// A replaced array carries the whole new array, and an element binding
    /// picks its own node out of it (`Null` once the element is gone). None when
    /// the changed node does not contain the slot, e.g. `items.length` for a
    /// binding on `items[0].name`.
    fn slot_value(&self, path: &ObjectPath, property: &str, value: &Value) -> Option<Value> {
        if *path == self.object_path && property == self.property {
            return Some(value.clone());
        }
        let changed = path.with_property(property).ok()?;
        if !self.target.starts_with(&changed) {
            tracing::debug!(
                "{}: change at '{}' does not carry a value for '{}'",
                self.id,
                changed,
                self.full_path
            );
            return None;
        }
        Some(
            self.target
                .lookup_below(&changed, value)
                .cloned()
                .unwrap_or(Value::Null),
        )
    }

    fn apply_model_value(&self, value: &Value) {
        let Some(view) = self.view() else {
            return;
        };
        {
            let _guard = UpdateGuard::acquire(&self.updating);
            write_view_value(view.as_ref(), &self.view_attribute, self.format(value));
        }
        *self.last_valid_value.borrow_mut() = Some(value.clone());
        if self.in_error.get() {
            self.clear_error(view.as_ref());
        }
    }

    fn format(&self, value: &Value) -> Value {
        match &self.formatter {
            Some(formatter) => formatter(value),
            None => value.clone(),
        }
    }

    /// Show a rejection on the view and schedule the revert
    pub fn handle_rejection(self: &Rc<Self>, event: &Event) {
        if self.destroyed.get() {
            return;
        }
        let errors: Vec<String> = match event.value(fields::VALIDATION_ERRORS) {
            Value::Array(items) => items.iter().map(display_string).collect(),
            Value::Null => Vec::new(),
            other => vec![display_string(other)],
        };

        match &self.kind {
            BindingKind::Component { callback, .. } => {
                let callback = callback.borrow().clone();
                if let Some(callback) = callback {
                    let path = event.str_field(fields::PROPERTY_PATH).unwrap_or_default();
                    callback(&ComponentNotification::ValidationFailed {
                        path,
                        errors: &errors,
                        event,
                    });
                }
                return;
            }
            BindingKind::Dependent { .. } => return,
            BindingKind::Value => {}
        }

        let Some(view) = self.view() else {
            return;
        };
        tracing::debug!("{}: '{}' rejected: {}", self.id, self.full_path, errors.join("; "));

        view.add_class(&self.config.error_class);
        view.set_attribute(VALIDATION_ERROR_ATTRIBUTE, &errors.join("; "));
        *self.last_valid_value.borrow_mut() = Some(event.value(fields::CURRENT_VALUE).clone());
        self.in_error.set(true);

        if let Some(previous) = self.revert_timer.take() {
            self.scheduler.cancel(previous);
        }
        let weak = Rc::downgrade(self);
        let handle = self.scheduler.schedule(
            self.config.revert_delay,
            Box::new(move || {
                if let Some(binding) = weak.upgrade() {
                    binding.revert_to_last_valid();
                }
            }),
        );
        self.revert_timer.set(Some(handle));

        if self.recovery_listeners.borrow().is_empty() {
            self.install_recovery_listeners(view.as_ref());
        }
    }

    fn install_recovery_listeners(self: &Rc<Self>, view: &dyn View) {
        let weak = Rc::downgrade(self);
        let on_key: ViewEventHandler = Rc::new(move |event| {
            if event.key.as_deref() == Some("Escape") {
                if let Some(binding) = weak.upgrade() {
                    binding.revert_to_last_valid();
                }
            }
        });
        let weak = Rc::downgrade(self);
        let on_blur: ViewEventHandler = Rc::new(move |_| {
            if let Some(binding) = weak.upgrade() {
                binding.revert_to_last_valid();
            }
        });

        let mut listeners = self.recovery_listeners.borrow_mut();
        listeners.push(view.add_event_listener("keydown", on_key));
        listeners.push(view.add_event_listener("blur", on_blur));
    }

    /// Restore the last valid value and leave the error state
    pub fn revert_to_last_valid(&self) {
        if !self.in_error.get() {
            return;
        }
        let Some(view) = self.view() else {
            self.in_error.set(false);
            return;
        };
        let last = self.last_valid_value.borrow().clone().unwrap_or(Value::Null);
        {
            let _guard = UpdateGuard::acquire(&self.updating);
            write_view_value(view.as_ref(), &self.view_attribute, self.format(&last));
        }
        self.clear_error(view.as_ref());
        tracing::debug!("{}: reverted '{}'", self.id, self.full_path);
    }

    fn clear_error(&self, view: &dyn View) {
        self.in_error.set(false);
        if let Some(handle) = self.revert_timer.take() {
            self.scheduler.cancel(handle);
        }
        view.remove_class(&self.config.error_class);
        view.remove_attribute(VALIDATION_ERROR_ATTRIBUTE);

        let listeners: Vec<ViewListenerId> =
            self.recovery_listeners.borrow_mut().drain(..).collect();
        for id in listeners {
            if let Err(err) = view.remove_event_listener(id) {
                tracing::warn!("{}: {}", self.id, err);
            }
        }
    }

    /// Detach from the view and the bus; safe to call more than once
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        if let Some(handle) = self.revert_timer.take() {
            self.scheduler.cancel(handle);
        }
        self.in_error.set(false);

        let listeners: Vec<ViewListenerId> = self
            .view_listeners
            .borrow_mut()
            .drain(..)
            .chain(self.recovery_listeners.borrow_mut().drain(..))
            .collect();
        let view = self.view.borrow_mut().take();
        if let Some(view) = view {
            for id in listeners {
                if let Err(err) = view.remove_event_listener(id) {
                    tracing::warn!("{}: failed to remove view listener: {}", self.id, err);
                }
            }
        }

        let subscriptions: Vec<Subscription> = self.subscriptions.borrow_mut().drain(..).collect();
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        if let BindingKind::Component { callback, snapshot } = &self.kind {
            callback.borrow_mut().take();
            snapshot.borrow_mut().take();
        }
        tracing::debug!("Destroyed {} on view {}", self.id, self.view_id);
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("path", &self.full_path)
            .field("view", &self.view_id)
            .field("role", &self.role())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualClock;
    use crate::view::HeadlessView;
    use propsync_core::DottedPathResolver;

    fn context() -> (BindingContext, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new());
        let ctx = BindingContext::new(
            EventBus::new(),
            Rc::new(DottedPathResolver::default()),
            clock.clone(),
        );
        (ctx, clock)
    }

    fn model_change(path: &str, property: &str, value: Value) -> serde_json::Map<String, Value> {
        payload([
            (fields::OBJECT_PATH, json!(path)),
            (fields::PROPERTY, json!(property)),
            (fields::VALUE, value),
        ])
    }

    #[test]
    fn test_update_guard_restores_on_drop() {
        let flag = Cell::new(false);
        {
            let _outer = UpdateGuard::acquire(&flag);
            assert!(flag.get());
            {
                let _inner = UpdateGuard::acquire(&flag);
            }
            assert!(flag.get());
        }
        assert!(!flag.get());
    }

    #[test]
    fn test_update_guard_restores_on_panic() {
        let flag = Cell::new(false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = UpdateGuard::acquire(&flag);
            panic!("view write failed");
        }));
        assert!(result.is_err());
        assert!(!flag.get());
    }

    #[test]
    fn test_resolve_target_forms() {
        let resolver = DottedPathResolver::default();
        let (path, property) =
            resolve_target(&resolver, Some("root.user.name"), None, None).unwrap();
        assert_eq!(path.to_string(), "user");
        assert_eq!(property, "name");

        let (path, property) =
            resolve_target(&resolver, None, Some("items[2]"), Some("label")).unwrap();
        assert_eq!(path.to_string(), "items[2]");
        assert_eq!(property, "label");

        assert!(resolve_target(&resolver, None, None, None).is_err());
        assert!(resolve_target(&resolver, Some(""), None, None).is_err());
        assert!(resolve_target(&resolver, None, Some("user"), Some(" ")).is_err());
    }

    #[test]
    fn test_view_change_dispatches_proposal() {
        let (ctx, _) = context();
        let view = HeadlessView::text_input("name-input");
        let _binding =
            Binding::new(BindingOptions::new(view.clone()).path("user.name"), &ctx).unwrap();

        let proposals = Rc::new(RefCell::new(Vec::new()));
        let seen = proposals.clone();
        let _sub = ctx
            .bus
            .subscribe(event_types::VIEW_TO_MODEL_PROPERTY_CHANGED, move |event| {
                seen.borrow_mut().push(event.fields().clone());
                Ok(())
            })
            .unwrap();

        view.user_input(json!("Ada"), "change");

        let proposals = proposals.borrow();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0][fields::OBJECT_PATH], json!("user"));
        assert_eq!(proposals[0][fields::PROPERTY], json!("name"));
        assert_eq!(proposals[0][fields::VALUE], json!("Ada"));
        assert_eq!(proposals[0][fields::SOURCE_VIEW], json!("name-input"));
        assert_eq!(proposals[0][fields::SOURCE], json!("binding"));
    }

    #[test]
    fn test_model_change_writes_view_without_echo() {
        let (ctx, _) = context();
        let view = HeadlessView::text_input("name-input");
        view.echo_writes_as(Some("change"));
        let binding =
            Binding::new(BindingOptions::new(view.clone()).path("user.name"), &ctx).unwrap();

        let proposals = Rc::new(Cell::new(0));
        let count = proposals.clone();
        let _sub = ctx
            .bus
            .subscribe(event_types::VIEW_TO_MODEL_PROPERTY_CHANGED, move |_| {
                count.set(count.get() + 1);
                Ok(())
            })
            .unwrap();

        ctx.bus
            .dispatch(
                event_types::MODEL_TO_VIEW_PROPERTY_CHANGED,
                model_change("user", "name", json!("Grace")),
            )
            .unwrap();

        assert_eq!(view.value(), json!("Grace"));
        assert_eq!(proposals.get(), 0);
        assert!(!binding.is_updating_from_model());
        assert_eq!(binding.last_valid_value(), Some(json!("Grace")));
    }

    #[test]
    fn test_guard_blocks_view_change() {
        let (ctx, _) = context();
        let view = HeadlessView::text_input("name-input");
        let binding =
            Binding::new(BindingOptions::new(view.clone()).path("user.name"), &ctx).unwrap();
        let proposals = Rc::new(Cell::new(0));
        let count = proposals.clone();
        let _sub = ctx
            .bus
            .subscribe(event_types::VIEW_TO_MODEL_PROPERTY_CHANGED, move |_| {
                count.set(count.get() + 1);
                Ok(())
            })
            .unwrap();

        {
            let _guard = binding.begin_model_update();
            assert_eq!(binding.state(), BindingState::ModelToViewUpdating);
            view.user_input(json!("ignored"), "change");
        }
        assert_eq!(proposals.get(), 0);

        view.user_input(json!("kept"), "change");
        assert_eq!(proposals.get(), 1);
    }

    #[test]
    fn test_unrelated_change_is_ignored() {
        let (ctx, _) = context();
        let view = HeadlessView::text_input("name-input");
        view.user_input(json!("before"), "input");
        let _binding =
            Binding::new(BindingOptions::new(view.clone()).path("user.name"), &ctx).unwrap();

        ctx.bus
            .dispatch(
                event_types::MODEL_TO_VIEW_PROPERTY_CHANGED,
                model_change("user", "email", json!("a@b.c")),
            )
            .unwrap();
        assert_eq!(view.value(), json!("before"));
    }

    #[test]
    fn test_array_replacement_reaches_element_binding() {
        let (ctx, _) = context();
        let view = HeadlessView::text_input("item-name");
        let _binding = Binding::new(
            BindingOptions::new(view.clone())
                .object_path("items[2]")
                .property("name")
                .formatter(|_| json!("refreshed")),
            &ctx,
        )
        .unwrap();

        ctx.bus
            .dispatch(
                event_types::MODEL_TO_VIEW_PROPERTY_CHANGED,
                model_change("", "items", json!([])),
            )
            .unwrap();
        assert_eq!(view.value(), json!("refreshed"));
    }

    #[test]
    fn test_checkbox_conventions() {
        let (ctx, _) = context();
        let view = HeadlessView::checkbox("agree");
        let binding = Binding::new(
            BindingOptions::new(view.clone())
                .path("terms.accepted")
                .attribute("checked"),
            &ctx,
        )
        .unwrap();
        assert_eq!(binding.view_event(), Some("change"));

        ctx.bus
            .dispatch(
                event_types::MODEL_TO_VIEW_PROPERTY_CHANGED,
                model_change("terms", "accepted", json!(1)),
            )
            .unwrap();
        assert_eq!(view.get_property("checked"), Some(json!(true)));
    }

    #[test]
    fn test_attribute_fallback_when_property_unsupported() {
        let (ctx, _) = context();
        let view = HeadlessView::new("badge", crate::view::ViewKind::Other);
        view.reject_property("title");
        let _binding = Binding::new(
            BindingOptions::new(view.clone()).path("user.title").attribute("title"),
            &ctx,
        )
        .unwrap();

        ctx.bus
            .dispatch(
                event_types::MODEL_TO_VIEW_PROPERTY_CHANGED,
                model_change("user", "title", json!(7)),
            )
            .unwrap();
        assert_eq!(view.get_attribute("title").as_deref(), Some("7"));
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let (ctx, _) = context();
        let view = HeadlessView::text_input("name-input");
        let binding =
            Binding::new(BindingOptions::new(view.clone()).path("user.name"), &ctx).unwrap();
        assert_eq!(view.total_listener_count(), 1);
        assert_eq!(ctx.bus.listener_count(event_types::MODEL_TO_VIEW_PROPERTY_CHANGED), 1);

        binding.destroy();
        binding.destroy();

        assert!(binding.is_destroyed());
        assert!(binding.view().is_none());
        assert_eq!(view.total_listener_count(), 0);
        assert_eq!(view.removed_listener_count(), 1);
        assert_eq!(ctx.bus.listener_count(event_types::MODEL_TO_VIEW_PROPERTY_CHANGED), 0);
    }

    #[test]
    fn test_empty_model_event_is_rejected() {
        let (ctx, _) = context();
        let view = HeadlessView::text_input("name-input");
        let err = Binding::new(
            BindingOptions::new(view.clone()).path("user.name").model_event(""),
            &ctx,
        )
        .unwrap_err();
        assert!(err.is_wiring_error());
        assert_eq!(view.total_listener_count(), 0);
    }

    #[test]
    fn test_number_parser() {
        assert_eq!(number_parser(json!("42")), json!(42));
        assert_eq!(number_parser(json!(" 2.5 ")), json!(2.5));
        assert_eq!(number_parser(json!("abc")), json!("abc"));
        assert_eq!(number_parser(json!(true)), json!(true));
        assert_eq!(text_formatter(&json!(3)), json!("3"));
    }
}
