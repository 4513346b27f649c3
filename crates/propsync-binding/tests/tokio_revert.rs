use propsync_binding::{
    BindingConfig, BindingContext, BindingManager, BindingOptions, HeadlessView,
    LocalTokioScheduler, ObjectModel, View,
};
use propsync_core::{DottedPathResolver, EventBus, PathResolver};
use serde_json::json;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;

#[tokio::test(start_paused = true)]
async fn test_revert_runs_on_tokio_timer() {
    LocalSet::new()
        .run_until(async {
            let bus = EventBus::new();
            let resolver: Rc<dyn PathResolver> = Rc::new(DottedPathResolver::default());
            let scheduler = Rc::new(LocalTokioScheduler::new());
            let ctx = BindingContext::new(bus.clone(), resolver.clone(), scheduler.clone())
                .with_config(BindingConfig {
                    revert_delay: Duration::from_millis(500),
                    error_class: "invalid".to_string(),
                });
            let manager = BindingManager::new(ctx).unwrap();

            let model = ObjectModel::new(bus, resolver, json!({ "user": { "email": "a@b.c" } }));
            model
                .add_validator("user.email", |v| {
                    if v.as_str().is_some_and(|s| s.contains('@')) {
                        Ok(())
                    } else {
                        Err(vec!["Email must contain @".to_string()])
                    }
                })
                .unwrap();
            model.attach().unwrap();

            let view = HeadlessView::text_input("email-input");
            manager
                .create_binding(BindingOptions::new(view.clone()).path("user.email"))
                .unwrap();

            view.user_input(json!("nope"), "change");
            assert!(view.has_class("invalid"));
            assert_eq!(scheduler.pending_count(), 1);

            tokio::time::sleep(Duration::from_millis(400)).await;
            assert!(view.has_class("invalid"));

            tokio::time::sleep(Duration::from_millis(200)).await;
            assert!(!view.has_class("invalid"));
            assert_eq!(view.value(), json!("a@b.c"));
            assert_eq!(scheduler.pending_count(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_blur_cancels_pending_revert() {
    LocalSet::new()
        .run_until(async {
            let bus = EventBus::new();
            let resolver: Rc<dyn PathResolver> = Rc::new(DottedPathResolver::default());
            let scheduler = Rc::new(LocalTokioScheduler::new());
            let ctx = BindingContext::new(bus.clone(), resolver.clone(), scheduler.clone());
            let manager = BindingManager::new(ctx).unwrap();

            let model = ObjectModel::new(bus, resolver, json!({ "user": { "age": 30 } }));
            model
                .add_validator("user.age", |v| {
                    if v.is_number() {
                        Ok(())
                    } else {
                        Err(vec!["Age must be a number".to_string()])
                    }
                })
                .unwrap();
            model.attach().unwrap();

            let view = HeadlessView::text_input("age-input");
            manager
                .create_binding(BindingOptions::new(view.clone()).path("user.age"))
                .unwrap();

            view.user_input(json!("old"), "change");
            assert_eq!(scheduler.pending_count(), 1);

            view.blur();
            assert_eq!(view.value(), json!(30));
            assert_eq!(scheduler.pending_count(), 0);
        })
        .await;
}
