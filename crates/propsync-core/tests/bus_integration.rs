use propsync_core::{
    event_types, fields, payload, DottedPathResolver, Error, EventBus, EventBusConfig,
    EventTypeRegistry, FieldType, PathResolver, Schema, SchemaError, SharedVec,
};
use serde_json::json;
use std::rc::Rc;

fn bus_with_custom_types() -> EventBus {
    let registry = EventTypeRegistry::standard_builder()
        .schema(
            "FORM_SUBMITTED",
            Schema::new()
                .required("FormId", FieldType::String)
                .optional("Values", FieldType::Object),
        )
        .alias("FORM_POSTED", "FORM_SUBMITTED")
        .build();
    EventBus::with_registry(
        registry,
        EventBusConfig {
            enable_history: true,
            ..EventBusConfig::default()
        },
    )
}

#[test]
fn test_custom_type_and_alias_share_schema() {
    let bus = bus_with_custom_types();
    let seen: SharedVec<serde_json::Value> = propsync_core::shared(Vec::new());

    let sink = seen.clone();
    let _sub = bus
        .subscribe("FORM_POSTED", move |event| {
            sink.borrow_mut().push(event.value("Values").clone());
            Ok(())
        })
        .unwrap();

    bus.dispatch("FORM_POSTED", payload([("FormId", json!("signup"))]))
        .unwrap();
    assert_eq!(*seen.borrow(), vec![json!({})]);

    let err = bus
        .dispatch("FORM_POSTED", payload([("Values", json!({}))]))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Schema(SchemaError::MissingRequiredField { ref field, .. }) if field == "FormId"
    ));
    assert_eq!(bus.history(None).len(), 1);
}

#[test]
fn test_server_error_alias_uses_client_error_schema() {
    let bus = EventBus::new();
    let delivered = bus
        .dispatch(
            event_types::SERVER_ERROR,
            payload([
                (fields::ID, json!("E42")),
                (fields::MESSAGE, json!("backend unavailable")),
            ]),
        )
        .unwrap();
    assert_eq!(delivered, 0);

    assert!(bus
        .dispatch(event_types::SERVER_WARNING, payload([(fields::ID, json!("W1"))]))
        .is_err());
}

#[test]
fn test_listener_driven_model_update() {
    let bus = EventBus::new();
    let resolver = Rc::new(DottedPathResolver::new("app"));
    let model = propsync_core::shared(json!({ "user": { "tags": [] } }));

    let (r, m) = (resolver.clone(), model.clone());
    let _sub = bus
        .subscribe(event_types::VIEW_TO_MODEL_PROPERTY_CHANGED, move |event| {
            let object_path =
                r.parse_object_path(event.str_field(fields::OBJECT_PATH).unwrap_or_default())?;
            let property = event.str_field(fields::PROPERTY).unwrap_or_default();
            let full = object_path.with_property(property)?;
            let value = event.value(fields::VALUE).clone();
            r.set_value_at_path(&mut m.borrow_mut(), &full.to_string(), value)?;
            Ok(())
        })
        .unwrap();

    bus.dispatch(
        event_types::VIEW_TO_MODEL_PROPERTY_CHANGED,
        payload([
            (fields::OBJECT_PATH, json!("app.user.tags")),
            (fields::PROPERTY, json!("0")),
            (fields::VALUE, json!("admin")),
        ]),
    )
    .unwrap();

    // "tags.0" addresses an object key, not an index; the listener error is logged, not raised.
    assert_eq!(resolver.get_value_from_path(&model.borrow(), "app.user.tags"), Some(&json!([])));

    bus.dispatch(
        event_types::VIEW_TO_MODEL_PROPERTY_CHANGED,
        payload([
            (fields::OBJECT_PATH, json!("app.user")),
            (fields::PROPERTY, json!("name")),
            (fields::VALUE, json!("Ada")),
        ]),
    )
    .unwrap();
    assert_eq!(
        resolver.get_value_from_path(&model.borrow(), "user.name"),
        Some(&json!("Ada"))
    );
}
