//! Binding manager
//!
//! Owns every binding created through it and routes model events to them.
//! Routing is a fixed table of (event type, handler) pairs subscribed once
//! when the manager is created and unsubscribed when it is dropped.

use crate::binding::{change_target, Binding, BindingContext, BindingOptions, BindingRole};
use crate::component::{component_binding, ComponentBindingOptions};
use crate::dependent::{dependent_binding, DependentBindingOptions, DependentEffect};
use crate::view::ViewId;
use crate::BindingId;
use propsync_core::event_bus::{event_types, fields, Event, Subscription};
use propsync_core::Result;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

type RouteHandler = fn(&ManagerInner, &Event);

/// Event types the manager routes, and to what
const ROUTES: [(&str, RouteHandler); 2] = [
    (
        event_types::MODEL_TO_VIEW_PROPERTY_CHANGED,
        ManagerInner::route_model_change,
    ),
    (
        event_types::PROPERTY_CHANGE_REJECTED,
        ManagerInner::route_rejection,
    ),
];

struct ManagerInner {
    ctx: BindingContext,
    bindings: RefCell<Vec<Rc<Binding>>>,
    by_view: RefCell<HashMap<ViewId, Vec<BindingId>>>,
    subscriptions: RefCell<Vec<Subscription>>,
}

impl ManagerInner {
    fn snapshot(&self) -> Vec<Rc<Binding>> {
        self.bindings.borrow().clone()
    }

    fn route_model_change(&self, event: &Event) {
        let Some((path, property)) = change_target(self.ctx.resolver.as_ref(), event) else {
            return;
        };
        let matched: Vec<Rc<Binding>> = self
            .snapshot()
            .into_iter()
            .filter(|b| b.matches(&path, &property))
            .collect();
        if matched.is_empty() {
            tracing::debug!("No binding for change at '{}' / '{}'", path, property);
            return;
        }

        for binding in matched {
            let result = catch_unwind(AssertUnwindSafe(|| {
                binding.apply_model_change(event, &path, &property)
            }));
            if result.is_err() {
                tracing::error!("{} panicked while applying {}", binding.id(), event.id());
            }
        }
    }

    fn route_rejection(&self, event: &Event) {
        let property_path = event.str_field(fields::PROPERTY_PATH).unwrap_or_default();
        let (path, property) = match self.ctx.resolver.split_property(property_path) {
            Ok(target) => target,
            Err(err) => {
                tracing::warn!("Ignoring rejection with bad path: {}", err);
                return;
            }
        };
        let source_view = event.str_field(fields::SOURCE_VIEW).unwrap_or_default();

        let mut routed = false;
        for binding in self.snapshot() {
            if !binding.matches(&path, &property) {
                continue;
            }
            match binding.role() {
                BindingRole::Value if !routed && binding.view_id().as_str() == source_view => {
                    binding.handle_rejection(event);
                    routed = true;
                }
                BindingRole::Component => binding.handle_rejection(event),
                _ => {}
            }
        }
        if !routed {
            tracing::warn!(
                "No binding on view '{}' for rejected change to '{}'",
                source_view,
                property_path
            );
        }
    }

    fn register(&self, binding: &Rc<Binding>) {
        self.bindings.borrow_mut().push(Rc::clone(binding));
        self.by_view
            .borrow_mut()
            .entry(binding.view_id().clone())
            .or_default()
            .push(binding.id());
    }

    fn remove(&self, id: BindingId) -> bool {
        let Some(binding) = self.bindings.borrow().iter().find(|b| b.id() == id).cloned() else {
            return false;
        };
        binding.destroy();
        self.bindings.borrow_mut().retain(|b| b.id() != id);

        let mut by_view = self.by_view.borrow_mut();
        if let Some(ids) = by_view.get_mut(binding.view_id()) {
            ids.retain(|b| *b != id);
            if ids.is_empty() {
                by_view.remove(binding.view_id());
            }
        }
        true
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        for subscription in self.subscriptions.get_mut().drain(..) {
            subscription.unsubscribe();
        }
        for binding in self.bindings.get_mut().drain(..) {
            binding.destroy();
        }
    }
}

/// Registry of bindings and router of model events
pub struct BindingManager {
    inner: Rc<ManagerInner>,
}

impl BindingManager {
    /// Create a manager and subscribe its routes on `ctx.bus`
    pub fn new(ctx: BindingContext) -> Result<Self> {
        let mut ctx = ctx;
        ctx.managed = true;
        let inner = Rc::new(ManagerInner {
            ctx,
            bindings: RefCell::new(Vec::new()),
            by_view: RefCell::new(HashMap::new()),
            subscriptions: RefCell::new(Vec::new()),
        });

        for (event_type, handler) in ROUTES {
            let weak: Weak<ManagerInner> = Rc::downgrade(&inner);
            let subscription = inner.ctx.bus.subscribe(event_type, move |event| {
                if let Some(inner) = weak.upgrade() {
                    handler(&inner, event);
                }
                Ok(())
            })?;
            inner.subscriptions.borrow_mut().push(subscription);
        }
        tracing::debug!("Binding manager routing {} event types", ROUTES.len());
        Ok(Self { inner })
    }

    /// Context for standalone bindings sharing this manager's bus, resolver and scheduler
    ///
    /// Bindings built from it subscribe to model changes themselves; the
    /// manager only routes to bindings it created.
    pub fn context(&self) -> BindingContext {
        BindingContext {
            managed: false,
            ..self.inner.ctx.clone()
        }
    }

    pub fn create_binding(&self, options: BindingOptions) -> Result<Rc<Binding>> {
        let binding = Binding::new(options, &self.inner.ctx)?;
        self.inner.register(&binding);
        Ok(binding)
    }

    pub fn create_component_binding(
        &self,
        options: ComponentBindingOptions,
    ) -> Result<Rc<Binding>> {
        let binding = component_binding(options, &self.inner.ctx)?;
        self.inner.register(&binding);
        Ok(binding)
    }

    /// Create a dependent binding; `kind` is "editable" or "visibility"
    pub fn create_dependent_binding(
        &self,
        kind: &str,
        options: DependentBindingOptions,
    ) -> Result<Rc<Binding>> {
        let effect: DependentEffect = kind.parse()?;
        let binding = dependent_binding(effect, options, &self.inner.ctx)?;
        self.inner.register(&binding);
        Ok(binding)
    }

    /// Destroy and forget a binding; false if this manager does not hold it
    pub fn remove_binding(&self, binding: &Binding) -> bool {
        self.inner.remove(binding.id())
    }

    pub fn remove_bindings_for_view(&self, view: &ViewId) -> usize {
        let ids = self.inner.by_view.borrow().get(view).cloned().unwrap_or_default();
        ids.into_iter().filter(|id| self.inner.remove(*id)).count()
    }

    /// Remove every binding whose object path equals `object_path`
    pub fn remove_bindings_for_path(&self, object_path: &str) -> Result<usize> {
        let path = self.inner.ctx.resolver.parse_object_path(object_path)?;
        let ids: Vec<BindingId> = self
            .inner
            .snapshot()
            .iter()
            .filter(|b| *b.object_path() == path)
            .map(|b| b.id())
            .collect();
        Ok(ids.into_iter().filter(|id| self.inner.remove(*id)).count())
    }

    pub fn remove_all_bindings(&self) -> usize {
        let ids: Vec<BindingId> = self.inner.snapshot().iter().map(|b| b.id()).collect();
        let removed = ids.into_iter().filter(|id| self.inner.remove(*id)).count();
        tracing::debug!("Removed {} bindings", removed);
        removed
    }

    pub fn find(&self, id: BindingId) -> Option<Rc<Binding>> {
        self.inner.bindings.borrow().iter().find(|b| b.id() == id).cloned()
    }

    pub fn bindings(&self) -> Vec<Rc<Binding>> {
        self.inner.snapshot()
    }

    pub fn bindings_for_view(&self, view: &ViewId) -> Vec<Rc<Binding>> {
        let ids = self.inner.by_view.borrow().get(view).cloned().unwrap_or_default();
        ids.into_iter().filter_map(|id| self.find(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.bindings.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Route a model change to matching bindings, as the bus subscription does
    pub fn handle_model_to_view_property_changed(&self, event: &Event) {
        self.inner.route_model_change(event);
    }

    /// Route a rejection to the binding on its source view
    pub fn handle_property_change_rejected(&self, event: &Event) {
        self.inner.route_rejection(event);
    }
}

impl std::fmt::Debug for BindingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingManager")
            .field("bindings", &self.len())
            .field("views", &self.inner.by_view.borrow().len())
            .finish()
    }
}
