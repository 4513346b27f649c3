//! Reference model owner
//!
//! The binding engine never touches model data. [`ObjectModel`] is the
//! authority it talks to: it listens for change proposals, runs per-path
//! validators, and either applies the value and announces it or answers
//! with a rejection aimed at the proposing view.

use propsync_core::event_bus::{event_types, fields, payload, Event, EventBus, Subscription};
use propsync_core::path::{ObjectPath, PathResolver};
use propsync_core::Result;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Checks a proposed value; `Err` carries human-readable reasons
pub type Validator = Rc<dyn Fn(&Value) -> std::result::Result<(), Vec<String>>>;

/// Source tag on changes announced by the model
pub const MODEL_SOURCE: &str = "model";

struct ModelInner {
    bus: EventBus,
    resolver: Rc<dyn PathResolver>,
    root: RefCell<Value>,
    validators: RefCell<HashMap<String, Validator>>,
    subscription: RefCell<Option<Subscription>>,
}

impl ModelInner {
    /// Canonical key for a path, so "root.user.age" and "user.age" share validators
    fn key(&self, path: &str) -> Result<String> {
        Ok(self.resolver.parse_object_path(path)?.to_string())
    }

    fn get(&self, path: &str) -> Option<Value> {
        let root = self.root.borrow();
        self.resolver.get_value_from_path(&root, path).cloned()
    }

    fn set(&self, path: &str, value: Value) -> Result<Value> {
        let full = self.resolver.parse_object_path(path)?;
        self.set_at(&full, value)
    }

    /// Write at an already-normalized path
    fn set_at(&self, full: &ObjectPath, value: Value) -> Result<Value> {
        let (object_path, property) = full.split_last()?;
        let old = {
            let mut root = self.root.borrow_mut();
            full.assign(&mut root, value.clone())?
        };
        self.bus.dispatch(
            event_types::MODEL_TO_VIEW_PROPERTY_CHANGED,
            payload([
                (fields::OBJECT_PATH, Value::String(object_path.to_string())),
                (fields::PROPERTY, Value::String(property)),
                (fields::VALUE, value),
                (fields::OLD_VALUE, old.clone()),
                (fields::SOURCE, Value::String(MODEL_SOURCE.to_string())),
            ]),
        )?;
        Ok(old)
    }

    fn handle_proposal(&self, event: &Event) -> anyhow::Result<()> {
        let object_path = self
            .resolver
            .parse_object_path(event.str_field(fields::OBJECT_PATH).unwrap_or_default())?;
        let property = event.str_field(fields::PROPERTY).unwrap_or_default();
        let full = object_path.with_property(property)?;
        let key = full.to_string();
        let value = event.value(fields::VALUE).clone();

        let validator = self.validators.borrow().get(&key).cloned();
        if let Some(validator) = validator {
            if let Err(errors) = validator(&value) {
                tracing::debug!("Rejected '{}': {}", key, errors.join("; "));
                let current = full.lookup(&self.root.borrow()).cloned().unwrap_or(Value::Null);
                let source_view = event.str_field(fields::SOURCE_VIEW).unwrap_or_default();
                self.bus.dispatch(
                    event_types::PROPERTY_CHANGE_REJECTED,
                    payload([
                        (fields::PROPERTY_PATH, Value::String(key)),
                        (fields::REJECTED_VALUE, value),
                        (
                            fields::VALIDATION_ERRORS,
                            Value::Array(errors.into_iter().map(Value::String).collect()),
                        ),
                        (fields::CURRENT_VALUE, current),
                        (fields::SOURCE_VIEW, Value::String(source_view.to_string())),
                    ]),
                )?;
                return Ok(());
            }
        }

        self.set_at(&full, value)?;
        Ok(())
    }
}

/// Model data with validation, driven through the event bus
#[derive(Clone)]
pub struct ObjectModel {
    inner: Rc<ModelInner>,
}

impl ObjectModel {
    pub fn new(bus: EventBus, resolver: Rc<dyn PathResolver>, root: Value) -> Self {
        Self {
            inner: Rc::new(ModelInner {
                bus,
                resolver,
                root: RefCell::new(root),
                validators: RefCell::new(HashMap::new()),
                subscription: RefCell::new(None),
            }),
        }
    }

    /// Start answering VIEW_TO_MODEL_PROPERTY_CHANGED proposals
    pub fn attach(&self) -> Result<()> {
        if self.is_attached() {
            return Ok(());
        }
        let weak: Weak<ModelInner> = Rc::downgrade(&self.inner);
        let subscription = self
            .inner
            .bus
            .subscribe(event_types::VIEW_TO_MODEL_PROPERTY_CHANGED, move |event| {
                match weak.upgrade() {
                    Some(inner) => inner.handle_proposal(event),
                    None => Ok(()),
                }
            })?;
        *self.inner.subscription.borrow_mut() = Some(subscription);
        Ok(())
    }

    /// Stop answering proposals; false if not attached
    pub fn detach(&self) -> bool {
        let subscription = self.inner.subscription.borrow_mut().take();
        subscription.is_some_and(Subscription::unsubscribe)
    }

    pub fn is_attached(&self) -> bool {
        self.inner.subscription.borrow().is_some()
    }

    /// Install a validator for a full path, replacing any previous one
    pub fn add_validator<F>(&self, path: &str, validator: F) -> Result<()>
    where
        F: Fn(&Value) -> std::result::Result<(), Vec<String>> + 'static,
    {
        let key = self.inner.key(path)?;
        self.inner
            .validators
            .borrow_mut()
            .insert(key, Rc::new(validator));
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.inner.get(path)
    }

    /// Write a value and announce it; returns the previous value
    pub fn set(&self, path: &str, value: Value) -> Result<Value> {
        self.inner.set(path, value)
    }

    /// Copy of the whole model
    pub fn snapshot(&self) -> Value {
        self.inner.root.borrow().clone()
    }
}

impl std::fmt::Debug for ObjectModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectModel")
            .field("root", &self.inner.root.borrow())
            .field("validators", &self.inner.validators.borrow().len())
            .field("attached", &self.is_attached())
            .finish()
    }
}
