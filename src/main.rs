//! Headless demo: binds a few in-memory views to a model and walks through
//! an accepted edit, a rejected edit with timed revert, and teardown.
//!
//! Usage: `propsync [config.toml|config.json]`

use propsync::{
    init_logging_with, BindingOptions, Config, DependentBindingOptions, HeadlessView,
    LocalTokioScheduler, SyncStack, View,
};
use serde_json::json;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args_os().nth(1) {
        Some(path) => Config::load_from_file(&PathBuf::from(path))?,
        None => Config::load_or_default(&Config::default_path()?)?,
    };
    init_logging_with(&config.logging)?;
    tracing::info!("propsync {} (built {})", propsync::VERSION, propsync::BUILD_DATE);

    LocalSet::new().run_until(run(config)).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    let scheduler = Rc::new(LocalTokioScheduler::new());
    let stack = SyncStack::from_config(&config, scheduler)?;
    let model = stack.attach_model(json!({
        "user": { "name": "Ada", "age": 36, "isAdmin": false }
    }))?;
    model.add_validator("user.age", |value| match value.as_i64() {
        Some(age) if (0..=150).contains(&age) => Ok(()),
        _ => Err(vec!["Age must be between 0 and 150".to_string()]),
    })?;

    let name = HeadlessView::text_input("name-input");
    let age = HeadlessView::text_input("age-input");
    let admin_tools = HeadlessView::new("admin-tools", propsync::ViewKind::Other);

    stack
        .manager
        .create_binding(BindingOptions::new(name.clone()).path("root.user.name"))?;
    stack.manager.create_binding(
        BindingOptions::new(age.clone())
            .path("root.user.age")
            .parser(propsync_binding::number_parser),
    )?;
    stack.manager.create_dependent_binding(
        "visibility",
        DependentBindingOptions::new(admin_tools.clone())
            .path("root.user.isAdmin")
            .initial_value(json!(false)),
    )?;

    name.user_input(json!("Ada Lovelace"), "change");
    tracing::info!("user.name is now {}", model.get("user.name").unwrap_or_default());

    age.user_input(json!("200"), "change");
    tracing::info!(
        "age input rejected: {}",
        age.get_attribute(propsync_binding::VALIDATION_ERROR_ATTRIBUTE)
            .unwrap_or_default()
    );

    tokio::time::sleep(Duration::from_millis(config.binding.revert_delay_ms + 50)).await;
    tracing::info!("age input reverted to {}", age.value());

    model.set("user.isAdmin", json!(true))?;
    tracing::info!(
        "admin tools hidden: {}",
        admin_tools.get_property("hidden").unwrap_or_default()
    );

    let removed = stack.manager.remove_all_bindings();
    tracing::info!("removed {} bindings", removed);
    Ok(())
}
