//! Component bindings
//!
//! A component binding has no view value of its own. It observes a model
//! subtree (or a single property) and hands every matching change, and every
//! rejection aimed at it, to a callback.

use crate::binding::{resolve_target, Binding, BindingContext, BindingKind, BindingParts};
use crate::model::ObjectModel;
use crate::view::View;
use propsync_core::event_bus::Event;
use propsync_core::path::ObjectPath;
use propsync_core::Result;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// A model change delivered to a component
#[derive(Debug, Clone, Copy)]
pub struct ModelChange<'a> {
    pub object_path: &'a ObjectPath,
    pub property: &'a str,
    /// Canonical full path of the changed slot
    pub changed_path: &'a str,
    pub value: &'a Value,
    /// Whole model after the change, when the binding was given a snapshot source
    pub model: Option<&'a Value>,
    pub event: &'a Event,
}

/// What a component callback is told about
#[derive(Debug, Clone, Copy)]
pub enum ComponentNotification<'a> {
    Changed(ModelChange<'a>),
    ValidationFailed {
        path: &'a str,
        errors: &'a [String],
        event: &'a Event,
    },
}

pub type ComponentCallback = Rc<dyn Fn(&ComponentNotification<'_>)>;

/// Produces the current model for [`ModelChange::model`]
pub type ModelSnapshot = Rc<dyn Fn() -> Value>;

/// Configuration for a component binding
pub struct ComponentBindingOptions {
    pub(crate) view: Rc<dyn View>,
    pub(crate) path: Option<String>,
    pub(crate) property: Option<String>,
    pub(crate) model_events: Vec<String>,
    pub(crate) callback: ComponentCallback,
    pub(crate) snapshot: Option<ModelSnapshot>,
}

impl ComponentBindingOptions {
    pub fn new<F>(view: Rc<dyn View>, callback: F) -> Self
    where
        F: Fn(&ComponentNotification<'_>) + 'static,
    {
        Self {
            view,
            path: None,
            property: None,
            model_events: Vec::new(),
            callback: Rc::new(callback),
            snapshot: None,
        }
    }

    /// Subtree to observe; empty or absent observes the whole model
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Narrow observation to a single property under the path
    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn model_event(mut self, event_type: impl Into<String>) -> Self {
        self.model_events.push(event_type.into());
        self
    }

    /// Hand the callback a copy of `model` with every change
    pub fn model(self, model: &ObjectModel) -> Self {
        let model = model.clone();
        self.snapshot_with(move || model.snapshot())
    }

    pub fn snapshot_with<F>(mut self, snapshot: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        self.snapshot = Some(Rc::new(snapshot));
        self
    }
}

/// Create a component binding without a manager
pub fn component_binding(
    options: ComponentBindingOptions,
    ctx: &BindingContext,
) -> Result<Rc<Binding>> {
    let (object_path, property) = match options.property.as_deref() {
        Some(_) => resolve_target(
            ctx.resolver.as_ref(),
            None,
            options.path.as_deref(),
            options.property.as_deref(),
        )?,
        None => (
            ctx.resolver
                .parse_object_path(options.path.as_deref().unwrap_or_default())?,
            String::new(),
        ),
    };

    Binding::build(
        BindingParts {
            view: options.view,
            object_path,
            property,
            view_attribute: String::new(),
            view_event: None,
            model_events: options.model_events,
            parser: None,
            formatter: None,
            kind: BindingKind::Component {
                callback: RefCell::new(Some(options.callback)),
                snapshot: RefCell::new(options.snapshot),
            },
        },
        ctx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingRole;
    use crate::timer::ManualClock;
    use crate::view::{HeadlessView, ViewKind};
    use propsync_core::event_bus::{event_types, fields, payload, EventBus};
    use propsync_core::types::{shared, SharedVec};
    use propsync_core::DottedPathResolver;
    use serde_json::json;

    fn context() -> BindingContext {
        BindingContext::new(
            EventBus::new(),
            Rc::new(DottedPathResolver::default()),
            Rc::new(ManualClock::new()),
        )
    }

    fn changed(ctx: &BindingContext, path: &str, property: &str) {
        ctx.bus
            .dispatch(
                event_types::MODEL_TO_VIEW_PROPERTY_CHANGED,
                payload([
                    (fields::OBJECT_PATH, json!(path)),
                    (fields::PROPERTY, json!(property)),
                    (fields::VALUE, json!("x")),
                ]),
            )
            .unwrap();
    }

    fn recorder() -> (SharedVec<String>, impl Fn(&ComponentNotification<'_>)) {
        let log = shared(Vec::new());
        let sink = log.clone();
        let callback = move |n: &ComponentNotification<'_>| match n {
            ComponentNotification::Changed(change) => {
                sink.borrow_mut().push(change.changed_path.to_string())
            }
            ComponentNotification::ValidationFailed { path, .. } => {
                sink.borrow_mut().push(format!("invalid:{path}"))
            }
        };
        (log, callback)
    }

    #[test]
    fn test_subtree_component_sees_nested_and_replacing_changes() {
        let ctx = context();
        let view = HeadlessView::new("profile-card", ViewKind::Other);
        let (log, callback) = recorder();
        let binding = component_binding(
            ComponentBindingOptions::new(view, callback).path("user"),
            &ctx,
        )
        .unwrap();
        assert_eq!(binding.role(), BindingRole::Component);
        assert_eq!(binding.view_event(), None);

        changed(&ctx, "user", "name");
        changed(&ctx, "user.address", "city");
        changed(&ctx, "", "user");
        changed(&ctx, "settings", "theme");

        assert_eq!(*log.borrow(), vec!["user.name", "user.address.city", "user"]);
    }

    #[test]
    fn test_root_component_sees_everything() {
        let ctx = context();
        let view = HeadlessView::new("app", ViewKind::Other);
        let (log, callback) = recorder();
        let _binding =
            component_binding(ComponentBindingOptions::new(view, callback), &ctx).unwrap();

        changed(&ctx, "user", "name");
        changed(&ctx, "settings", "theme");
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_property_component_uses_exact_match() {
        let ctx = context();
        let view = HeadlessView::new("name-label", ViewKind::Other);
        let (log, callback) = recorder();
        let _binding = component_binding(
            ComponentBindingOptions::new(view, callback)
                .path("user")
                .property("name"),
            &ctx,
        )
        .unwrap();

        changed(&ctx, "user", "name");
        changed(&ctx, "user", "email");
        assert_eq!(*log.borrow(), vec!["user.name"]);
    }

    #[test]
    fn test_change_carries_model_snapshot() {
        let ctx = context();
        let model = ObjectModel::new(
            ctx.bus.clone(),
            ctx.resolver.clone(),
            json!({ "user": { "name": "Ada", "age": 36 } }),
        );
        let view = HeadlessView::new("profile-card", ViewKind::Other);
        let seen = shared(Vec::new());
        let sink = seen.clone();
        let _binding = component_binding(
            ComponentBindingOptions::new(view, move |n: &ComponentNotification<'_>| {
                if let ComponentNotification::Changed(change) = n {
                    sink.borrow_mut().push(change.model.cloned());
                }
            })
            .path("user")
            .model(&model),
            &ctx,
        )
        .unwrap();

        model.set("user.name", json!("Grace")).unwrap();
        model.set("user.age", json!(37)).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                Some(json!({ "user": { "name": "Grace", "age": 36 } })),
                Some(json!({ "user": { "name": "Grace", "age": 37 } })),
            ]
        );
    }

    #[test]
    fn test_change_without_snapshot_source_has_no_model() {
        let ctx = context();
        let view = HeadlessView::new("app", ViewKind::Other);
        let seen = shared(Vec::new());
        let sink = seen.clone();
        let _binding = component_binding(
            ComponentBindingOptions::new(view, move |n: &ComponentNotification<'_>| {
                if let ComponentNotification::Changed(change) = n {
                    sink.borrow_mut().push(change.model.is_some());
                }
            }),
            &ctx,
        )
        .unwrap();

        changed(&ctx, "user", "name");
        assert_eq!(*seen.borrow(), vec![false]);
    }

    #[test]
    fn test_destroyed_component_drops_callback() {
        let ctx = context();
        let view = HeadlessView::new("app", ViewKind::Other);
        let (log, callback) = recorder();
        let binding =
            component_binding(ComponentBindingOptions::new(view, callback), &ctx).unwrap();

        binding.destroy();
        changed(&ctx, "user", "name");
        assert!(log.borrow().is_empty());
        assert_eq!(Rc::strong_count(&log), 1);
    }
}
