//! Shorthand for the shared-state and callback types used across propsync.
//!
//! Bindings, views and listeners all live on one UI thread, so shared
//! mutable state is `Rc<RefCell<T>>` and callbacks are `Rc<dyn Fn>`.
//!
//! ```rust,ignore
//! use propsync_core::types::*;
//!
//! let seen: SharedVec<Event> = shared(Vec::new());
//! let to_upper: ValueFormatter = Rc::new(|v| json!(display_string(v).to_uppercase()));
//! ```

use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Interior-mutable state shared between closures on the UI thread.
pub type Shared<T> = Rc<RefCell<T>>;

/// Shared slot filled in after construction (e.g. a subscription handle).
pub type SharedOption<T> = Rc<RefCell<Option<T>>>;

pub type SharedVec<T> = Rc<RefCell<Vec<T>>>;

pub type SharedHashMap<K, V> = Rc<RefCell<HashMap<K, V>>>;

/// Raw view value to model value.
pub type ValueParser = Rc<dyn Fn(Value) -> Value>;

/// Model value to the value written into a view.
pub type ValueFormatter = Rc<dyn Fn(&Value) -> Value>;

/// Model value to the on/off state of a derived view effect.
pub type ValuePredicate = Rc<dyn Fn(&Value) -> bool>;

#[inline]
pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

#[inline]
pub fn shared_none<T>() -> SharedOption<T> {
    Rc::new(RefCell::new(None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shared_state_is_visible_through_clones() {
        let log: SharedVec<&str> = shared(Vec::new());
        let writer = Rc::clone(&log);
        writer.borrow_mut().push("change");
        assert_eq!(*log.borrow(), vec!["change"]);

        let slot: SharedOption<String> = shared_none();
        assert!(slot.borrow().is_none());
        *slot.borrow_mut() = Some("sub-1".to_string());
        assert_eq!(slot.borrow().as_deref(), Some("sub-1"));
    }

    #[test]
    fn test_value_callbacks() {
        let parser: ValueParser = Rc::new(|v| json!([v]));
        let formatter: ValueFormatter = Rc::new(|v| json!(v.to_string()));
        let predicate: ValuePredicate = Rc::new(|v| v.is_string());

        assert_eq!(parser(json!(1)), json!([1]));
        assert_eq!(formatter(&json!(1)), json!("1"));
        assert!(predicate(&json!("x")));
    }
}
