//! Event Bus implementation.
//!
//! Provides the keyed, schema-validated `EventBus` used by bindings and model
//! owners. Dispatch is synchronous: every listener registered for a type has
//! run by the time `dispatch` returns.

use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{Result, WiringError};
use super::schema::{Event, EventId, EventTypeRegistry};

/// Subscription handle identifying one registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new unique subscription ID
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Listener callback. Errors are logged by the bus and never reach the dispatcher.
pub type EventListener = Rc<dyn Fn(&Event) -> anyhow::Result<()>>;

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Whether to keep event history.
    pub enable_history: bool,
    /// Maximum number of events to retain in history.
    pub max_history_size: usize,
    /// How long to retain events in history.
    pub history_retention: Duration,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            enable_history: false,
            max_history_size: 1000,
            history_retention: Duration::from_secs(300),
        }
    }
}

/// Event with timestamp for history
#[derive(Debug, Clone)]
struct TimestampedEvent {
    event: Event,
    timestamp: Instant,
}

struct ListenerEntry {
    id: SubscriptionId,
    listener: EventListener,
    once: bool,
    fired: Cell<bool>,
    active: Cell<bool>,
}

struct BusInner {
    registry: EventTypeRegistry,
    listeners: RefCell<HashMap<String, Vec<Rc<ListenerEntry>>>>,
    history: RefCell<VecDeque<TimestampedEvent>>,
    next_event_id: Cell<u64>,
    config: EventBusConfig,
}

impl BusInner {
    fn remove(&self, event_type: &str, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(entries) = listeners.get_mut(event_type) else {
            return false;
        };
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return false;
        };

        let entry = entries.remove(pos);
        entry.active.set(false);
        if entries.is_empty() {
            listeners.remove(event_type);
        }
        tracing::debug!("Subscription {} to {} removed", id, event_type);
        true
    }
}

/// Handle returned by [`EventBus::subscribe`]
///
/// Removing a listener is explicit; dropping the handle leaves it registered.
#[must_use = "keep the subscription to be able to unsubscribe"]
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    event_type: String,
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Remove exactly this listener
    ///
    /// Returns false if it was already gone or the bus no longer exists.
    pub fn unsubscribe(self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.remove(&self.event_type, self.id))
    }
}

/// Keyed publish/subscribe dispatcher
///
/// Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<BusInner>,
}

impl EventBus {
    /// Create a bus over the standard event catalog
    pub fn new() -> Self {
        Self::with_registry(EventTypeRegistry::standard(), EventBusConfig::default())
    }

    /// Create a bus with a custom catalog and configuration
    pub fn with_registry(registry: EventTypeRegistry, config: EventBusConfig) -> Self {
        Self {
            inner: Rc::new(BusInner {
                registry,
                listeners: RefCell::new(HashMap::new()),
                history: RefCell::new(VecDeque::new()),
                next_event_id: Cell::new(0),
                config,
            }),
        }
    }

    /// Register a listener for `event_type`
    pub fn subscribe<F>(&self, event_type: &str, listener: F) -> Result<Subscription>
    where
        F: Fn(&Event) -> anyhow::Result<()> + 'static,
    {
        self.insert(event_type, Rc::new(listener), false)
    }

    /// Register a listener that is removed after its first invocation
    pub fn subscribe_once<F>(&self, event_type: &str, listener: F) -> Result<Subscription>
    where
        F: Fn(&Event) -> anyhow::Result<()> + 'static,
    {
        self.insert(event_type, Rc::new(listener), true)
    }

    fn insert(
        &self,
        event_type: &str,
        listener: EventListener,
        once: bool,
    ) -> Result<Subscription> {
        if event_type.trim().is_empty() {
            return Err(WiringError::InvalidEventType {
                event_type: event_type.to_string(),
            }
            .into());
        }
        if !self.inner.registry.is_declared(event_type) {
            tracing::warn!("Subscribing to undeclared event type {}", event_type);
        }

        let id = SubscriptionId::new();
        self.inner
            .listeners
            .borrow_mut()
            .entry(event_type.to_string())
            .or_default()
            .push(Rc::new(ListenerEntry {
                id,
                listener,
                once,
                fired: Cell::new(false),
                active: Cell::new(true),
            }));
        tracing::debug!("Subscription {} to {} added", id, event_type);

        Ok(Subscription {
            bus: Rc::downgrade(&self.inner),
            event_type: event_type.to_string(),
            id,
        })
    }

    /// Remove a listener by id
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, event_type: &str, id: SubscriptionId) -> bool {
        self.inner.remove(event_type, id)
    }

    /// Build and deliver an event
    ///
    /// Schema failures are returned. Listener failures are logged and do not
    /// stop the remaining listeners. Returns the number of listeners invoked.
    pub fn dispatch(&self, event_type: &str, data: Map<String, Value>) -> Result<usize> {
        let mut event = self.inner.registry.create(event_type, data)?;
        let seq = self.inner.next_event_id.get() + 1;
        self.inner.next_event_id.set(seq);
        event.assign_id(EventId(seq));

        if self.inner.config.enable_history {
            self.add_to_history(&event);
        }

        // Snapshot so listeners may subscribe, unsubscribe or dispatch re-entrantly.
        let snapshot: Vec<Rc<ListenerEntry>> = self
            .inner
            .listeners
            .borrow()
            .get(event_type)
            .cloned()
            .unwrap_or_default();

        let mut invoked = 0;
        for entry in snapshot {
            if !entry.active.get() {
                continue;
            }
            if entry.once {
                if entry.fired.replace(true) {
                    continue;
                }
                self.inner.remove(event_type, entry.id);
            }

            invoked += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| (entry.listener)(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(
                        "Listener {} for {} {} failed: {:#}",
                        entry.id,
                        event_type,
                        event.id(),
                        err
                    );
                }
                Err(payload) => {
                    tracing::error!(
                        "Listener {} for {} {} panicked: {}",
                        entry.id,
                        event_type,
                        event.id(),
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        tracing::trace!("Dispatched {} {} to {} listeners", event_type, event.id(), invoked);
        Ok(invoked)
    }

    /// Whether any listener is registered for `event_type`
    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.listener_count(event_type) > 0
    }

    /// Number of listeners registered for `event_type`
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.inner
            .listeners
            .borrow()
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Get the number of active subscriptions across all types
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.borrow().values().map(Vec::len).sum()
    }

    pub fn registry(&self) -> &EventTypeRegistry {
        &self.inner.registry
    }

    /// Get recent event history (if enabled)
    ///
    /// Returns events since the given instant, or all history if None.
    pub fn history(&self, since: Option<Instant>) -> Vec<Event> {
        if !self.inner.config.enable_history {
            return Vec::new();
        }

        let history = self.inner.history.borrow();
        match since {
            Some(since) => history
                .iter()
                .filter(|e| e.timestamp >= since)
                .map(|e| e.event.clone())
                .collect(),
            None => history.iter().map(|e| e.event.clone()).collect(),
        }
    }

    /// Clear event history
    pub fn clear_history(&self) {
        self.inner.history.borrow_mut().clear();
    }

    /// Get the current configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.inner.config
    }

    /// Add an event to history, maintaining size and age limits
    fn add_to_history(&self, event: &Event) {
        let mut history = self.inner.history.borrow_mut();
        let now = Instant::now();

        history.push_back(TimestampedEvent {
            event: event.clone(),
            timestamp: now,
        });

        let retention = self.inner.config.history_retention;
        while history
            .front()
            .is_some_and(|e| now.duration_since(e.timestamp) > retention)
        {
            history.pop_front();
        }

        while history.len() > self.inner.config.max_history_size {
            history.pop_front();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("config", &self.inner.config)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
