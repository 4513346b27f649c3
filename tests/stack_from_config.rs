use propsync::{BindingOptions, Config, HeadlessView, ManualClock, SyncStack, View};
use serde_json::json;
use std::rc::Rc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_stack_honours_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("propsync.toml");
    std::fs::write(
        &path,
        r#"
        [binding]
        revert_delay_ms = 300
        error_class = "has-error"

        [paths]
        root_namespace = "app"

        [bus]
        enable_history = true
        "#,
    )
    .unwrap();
    let config = Config::load_from_file(&path).unwrap();

    let clock = Rc::new(ManualClock::new());
    let stack = SyncStack::from_config(&config, clock.clone()).unwrap();
    let model = stack.attach_model(json!({ "user": { "age": 30 } })).unwrap();
    model
        .add_validator("app.user.age", |v| {
            if v.as_i64().is_some_and(|age| age >= 0) {
                Ok(())
            } else {
                Err(vec!["Age must not be negative".to_string()])
            }
        })
        .unwrap();

    let view = HeadlessView::text_input("age-input");
    stack
        .manager
        .create_binding(BindingOptions::new(view.clone()).path("app.user.age"))
        .unwrap();

    view.user_input(json!(-1), "change");
    assert!(view.has_class("has-error"));

    clock.advance(Duration::from_millis(300));
    assert!(!view.has_class("has-error"));
    assert_eq!(view.value(), json!(30));

    view.user_input(json!(31), "change");
    assert_eq!(model.get("user.age"), Some(json!(31)));
    assert!(!stack.bus.history(None).is_empty());
}

#[test]
fn test_invalid_config_is_refused() {
    let mut config = Config::default();
    config.binding.revert_delay_ms = 0;
    assert!(SyncStack::from_config(&config, Rc::new(ManualClock::new())).is_err());
}
