//! Dependent bindings
//!
//! A dependent binding derives a boolean from a model value and applies it
//! to a view as an effect. It only reads the model and never proposes
//! changes.

use crate::binding::{resolve_target, Binding, BindingContext, BindingKind, BindingParts};
use crate::view::View;
use propsync_core::types::ValuePredicate;
use propsync_core::value::is_truthy;
use propsync_core::{Error, Result, WiringError};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Class set while an `editable` binding has disabled its view
pub const DISABLED_CLASS: &str = "is-disabled";

/// Class set while a `visibility` binding has hidden its view
pub const HIDDEN_CLASS: &str = "is-hidden";

/// Effect a dependent binding applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependentEffect {
    /// Enabled when the predicate holds, disabled otherwise
    Editable,
    /// Shown when the predicate holds, hidden otherwise
    Visibility,
}

impl DependentEffect {
    pub fn as_str(self) -> &'static str {
        match self {
            DependentEffect::Editable => "editable",
            DependentEffect::Visibility => "visibility",
        }
    }

    /// Set the view's state for a predicate result
    pub fn apply(self, view: &dyn View, on: bool) {
        let (property, class) = match self {
            DependentEffect::Editable => ("disabled", DISABLED_CLASS),
            DependentEffect::Visibility => ("hidden", HIDDEN_CLASS),
        };
        if let Err(err) = view.set_property(property, Value::Bool(!on)) {
            tracing::trace!("Falling back to attribute '{}': {}", property, err);
            if on {
                view.remove_attribute(property);
            } else {
                view.set_attribute(property, "");
            }
        }
        if on {
            view.remove_class(class);
        } else {
            view.add_class(class);
        }
    }
}

impl fmt::Display for DependentEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependentEffect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "editable" => Ok(DependentEffect::Editable),
            "visibility" => Ok(DependentEffect::Visibility),
            _ => Err(WiringError::UnknownDependentBindingType { kind: s.to_string() }.into()),
        }
    }
}

/// Configuration for a dependent binding
pub struct DependentBindingOptions {
    pub(crate) view: Rc<dyn View>,
    pub(crate) path: Option<String>,
    pub(crate) object_path: Option<String>,
    pub(crate) property: Option<String>,
    pub(crate) predicate: Option<ValuePredicate>,
    pub(crate) initial: Option<Value>,
    pub(crate) model_events: Vec<String>,
}

impl DependentBindingOptions {
    pub fn new(view: Rc<dyn View>) -> Self {
        Self {
            view,
            path: None,
            object_path: None,
            property: None,
            predicate: None,
            initial: None,
            model_events: Vec::new(),
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn object_path(mut self, object_path: impl Into<String>) -> Self {
        self.object_path = Some(object_path.into());
        self
    }

    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// Decide the effect from the model value; defaults to truthiness
    pub fn predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + 'static,
    {
        self.predicate = Some(Rc::new(predicate));
        self
    }

    /// Apply the effect for this value right away
    pub fn initial_value(mut self, value: Value) -> Self {
        self.initial = Some(value);
        self
    }

    pub fn model_event(mut self, event_type: impl Into<String>) -> Self {
        self.model_events.push(event_type.into());
        self
    }
}

/// Create a dependent binding without a manager
pub fn dependent_binding(
    effect: DependentEffect,
    options: DependentBindingOptions,
    ctx: &BindingContext,
) -> Result<Rc<Binding>> {
    let (object_path, property) = resolve_target(
        ctx.resolver.as_ref(),
        options.path.as_deref(),
        options.object_path.as_deref(),
        options.property.as_deref(),
    )?;
    let predicate: ValuePredicate = match options.predicate {
        Some(predicate) => predicate,
        None => Rc::new(is_truthy),
    };

    if let Some(initial) = &options.initial {
        effect.apply(options.view.as_ref(), predicate(initial));
    }

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
            kind: BindingKind::Dependent { effect, predicate },
        },
        ctx,
    )
}

/// Toggle `disabled` on the view from the watched value
pub fn editable(options: DependentBindingOptions, ctx: &BindingContext) -> Result<Rc<Binding>> {
    dependent_binding(DependentEffect::Editable, options, ctx)
}

/// Toggle `hidden` on the view from the watched value
pub fn visibility(options: DependentBindingOptions, ctx: &BindingContext) -> Result<Rc<Binding>> {
    dependent_binding(DependentEffect::Visibility, options, ctx)
}
