//! View abstraction
//!
//! A view is any UI element a binding reads from and writes to. The binding
//! engine only needs property/attribute access, event listener registration
//! and class toggling, so hosts (a DOM bridge, a native toolkit, a test
//! harness) implement [`View`] for their own element type.

use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Stable identifier of a view, used to route rejections back to their origin
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(String);

impl ViewId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ViewId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of form element, which decides the default view event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    TextInput,
    NumberInput,
    Checkbox,
    Radio,
    Select,
    TextArea,
    Other,
}

impl ViewKind {
    /// Event that signals a committed user change for this kind
    pub fn default_event(self) -> &'static str {
        match self {
            ViewKind::TextInput
            | ViewKind::NumberInput
            | ViewKind::Checkbox
            | ViewKind::Radio
            | ViewKind::Select => "change",
            ViewKind::TextArea | ViewKind::Other => "input",
        }
    }
}

/// A UI event delivered to view listeners
#[derive(Debug, Clone, PartialEq)]
pub struct ViewEvent {
    pub name: String,
    /// Key name for keyboard events ("Escape", "Enter", ...)
    pub key: Option<String>,
}

impl ViewEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
        }
    }

    pub fn key_down(key: impl Into<String>) -> Self {
        Self {
            name: "keydown".to_string(),
            key: Some(key.into()),
        }
    }
}

/// Callback registered on a view
pub type ViewEventHandler = Rc<dyn Fn(&ViewEvent)>;

/// Handle returned by [`View::add_event_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewListenerId(pub u64);

/// Errors raised by view implementations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    #[error("View {view} does not support property '{property}'")]
    UnsupportedProperty { view: String, property: String },

    #[error("View {view} has no listener {listener:?}")]
    UnknownListener { view: String, listener: ViewListenerId },

    #[error("View {view} is detached")]
    Detached { view: String },
}

/// A UI element that bindings can drive
pub trait View {
    fn id(&self) -> ViewId;

    fn kind(&self) -> ViewKind;

    fn get_property(&self, name: &str) -> Option<Value>;

    fn set_property(&self, name: &str, value: Value) -> Result<(), ViewError>;

    fn get_attribute(&self, name: &str) -> Option<String>;

    fn set_attribute(&self, name: &str, value: &str);

    fn remove_attribute(&self, name: &str);

    fn add_event_listener(&self, event: &str, handler: ViewEventHandler) -> ViewListenerId;

    fn remove_event_listener(&self, listener: ViewListenerId) -> Result<(), ViewError>;

    fn add_class(&self, class: &str);

    fn remove_class(&self, class: &str);

    fn has_class(&self, class: &str) -> bool;
}

/// In-memory view for headless hosts and tests
///
/// Stores properties, attributes and classes in maps and dispatches events
/// synchronously to registered handlers.
pub struct HeadlessView {
    id: ViewId,
    kind: ViewKind,
    properties: RefCell<HashMap<String, Value>>,
    attributes: RefCell<HashMap<String, String>>,
    classes: RefCell<BTreeSet<String>>,
    listeners: RefCell<Vec<(ViewListenerId, String, ViewEventHandler)>>,
    next_listener: Cell<u64>,
    unsupported: RefCell<HashSet<String>>,
    echo_event: RefCell<Option<String>>,
    removed_listeners: Cell<usize>,
}

impl HeadlessView {
    pub fn new(id: impl Into<ViewId>, kind: ViewKind) -> Rc<Self> {
        Rc::new(Self {
            id: id.into(),
            kind,
            properties: RefCell::new(HashMap::new()),
            attributes: RefCell::new(HashMap::new()),
            classes: RefCell::new(BTreeSet::new()),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(1),
            unsupported: RefCell::new(HashSet::new()),
            echo_event: RefCell::new(None),
            removed_listeners: Cell::new(0),
        })
    }

    pub fn text_input(id: impl Into<ViewId>) -> Rc<Self> {
        Self::new(id, ViewKind::TextInput)
    }

    pub fn checkbox(id: impl Into<ViewId>) -> Rc<Self> {
        Self::new(id, ViewKind::Checkbox)
    }

    /// Make `set_property(name, ..)` fail, as for elements without that property
    pub fn reject_property(&self, name: &str) {
        self.unsupported.borrow_mut().insert(name.to_string());
    }

    /// Fire `event` whenever "value" or "checked" is written programmatically
    ///
    /// Some hosts report programmatic writes as user changes; this mimics them.
    pub fn echo_writes_as(&self, event: Option<&str>) {
        *self.echo_event.borrow_mut() = event.map(str::to_string);
    }

    /// Simulate a user typing `value` and committing with `event`
    pub fn user_input(&self, value: Value, event: &str) {
        self.properties
            .borrow_mut()
            .insert("value".to_string(), value);
        self.fire(&ViewEvent::new(event));
    }

    /// Simulate a user toggling a checkbox
    pub fn user_toggle(&self, checked: bool) {
        self.properties
            .borrow_mut()
            .insert("checked".to_string(), Value::Bool(checked));
        self.fire(&ViewEvent::new("change"));
    }

    pub fn press_key(&self, key: &str) {
        self.fire(&ViewEvent::key_down(key));
    }

    pub fn blur(&self) {
        self.fire(&ViewEvent::new("blur"));
    }

    /// Deliver `event` to every handler registered for its name
    pub fn fire(&self, event: &ViewEvent) {
        let handlers: Vec<ViewEventHandler> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, name, _)| *name == event.name)
            .map(|(_, _, handler)| Rc::clone(handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn value(&self) -> Value {
        self.properties
            .borrow()
            .get("value")
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(_, name, _)| name == event)
            .count()
    }

    pub fn total_listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn removed_listener_count(&self) -> usize {
        self.removed_listeners.get()
    }

    pub fn classes(&self) -> Vec<String> {
        self.classes.borrow().iter().cloned().collect()
    }
}

impl View for HeadlessView {
    fn id(&self) -> ViewId {
        self.id.clone()
    }

    fn kind(&self) -> ViewKind {
        self.kind
    }

    fn get_property(&self, name: &str) -> Option<Value> {
        self.properties.borrow().get(name).cloned()
    }

    fn set_property(&self, name: &str, value: Value) -> Result<(), ViewError> {
        if self.unsupported.borrow().contains(name) {
            return Err(ViewError::UnsupportedProperty {
                view: self.id.to_string(),
                property: name.to_string(),
            });
        }
        self.properties.borrow_mut().insert(name.to_string(), value);

        let echo = self.echo_event.borrow().clone();
        if let Some(event) = echo {
            if name == "value" || name == "checked" {
                self.fire(&ViewEvent::new(event));
            }
        }
        Ok(())
    }

    fn get_attribute(&self, name: &str) -> Option<String> {
        self.attributes.borrow().get(name).cloned()
    }

    fn set_attribute(&self, name: &str, value: &str) {
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
    }

    fn remove_attribute(&self, name: &str) {
        self.attributes.borrow_mut().remove(name);
    }

    fn add_event_listener(&self, event: &str, handler: ViewEventHandler) -> ViewListenerId {
        let id = ViewListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .push((id, event.to_string(), handler));
        id
    }

    fn remove_event_listener(&self, listener: ViewListenerId) -> Result<(), ViewError> {
        let mut listeners = self.listeners.borrow_mut();
        let Some(pos) = listeners.iter().position(|(id, _, _)| *id == listener) else {
            return Err(ViewError::UnknownListener {
                view: self.id.to_string(),
                listener,
            });
        };
        listeners.remove(pos);
        self.removed_listeners.set(self.removed_listeners.get() + 1);
        Ok(())
    }

    fn add_class(&self, class: &str) {
        self.classes.borrow_mut().insert(class.to_string());
    }

    fn remove_class(&self, class: &str) {
        self.classes.borrow_mut().remove(class);
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.borrow().contains(class)
    }
}

impl fmt::Debug for HeadlessView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessView")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("properties", &self.properties.borrow())
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}
