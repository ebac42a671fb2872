mod common;

use apim::{Plan, ResourceHandler, ResourceState, get_resource};
use common::{FakeArm, child, context};
use serde_json::{Value, json};
use wiremock::MockServer;

async fn create_logger(server: &MockServer) -> String {
    let handler = get_resource("azurerm_api_management_logger", context(server)).unwrap();
    let state = handler
        .create(&json!({
            "name": "appinsights",
            "api_management_name": "svc",
            "resource_group_name": "rg",
            "application_insights": [{"connection_string": "InstrumentationKey=abc"}]
        }))
        .await
        .unwrap();
    state.id
}

fn diagnostic_config(logger_id: &str, operation_name_format: &str) -> Value {
    json!({
        "identifier": "applicationinsights",
        "api_management_name": "svc",
        "resource_group_name": "rg",
        "api_management_logger_id": logger_id,
        "sampling_percentage": 1.0,
        "always_log_errors": true,
        "verbosity": "verbose",
        "operation_name_format": operation_name_format
    })
}

fn assert_logging_settings(state: &ResourceState) {
    assert_eq!(state.get("sampling_percentage"), Some(&json!(1.0)));
    assert_eq!(state.get("always_log_errors"), Some(&json!(true)));
    assert_eq!(state.get_str("verbosity"), Some("verbose"));
}

async fn create_then_rename_operations(
    handler: &dyn ResourceHandler,
    fake: &FakeArm,
    config: Value,
    renamed: Value,
) {
    let created = handler.create(&config).await.unwrap();
    assert_logging_settings(&created);
    assert_eq!(created.get_str("operation_name_format"), Some("Name"));

    let read = handler.read(&created).await.unwrap().unwrap();
    assert_eq!(read, created);

    assert_eq!(
        handler.plan(&read, &renamed).unwrap(),
        Plan::Update {
            changed: vec!["operation_name_format".to_string()]
        }
    );
    let updated = handler.update(&read, &renamed).await.unwrap();
    assert_logging_settings(&updated);
    assert_eq!(updated.get_str("operation_name_format"), Some("Url"));

    let stored = fake.get(&updated.id).unwrap();
    assert_eq!(stored["properties"]["sampling"]["percentage"], json!(1.0));
    assert_eq!(stored["properties"]["sampling"]["samplingType"], "fixed");
    assert_eq!(stored["properties"]["alwaysLog"], "allErrors");
    assert_eq!(stored["properties"]["verbosity"], "verbose");
    assert_eq!(stored["properties"]["operationNameFormat"], "Url");

    let reread = handler.read(&updated).await.unwrap().unwrap();
    assert_eq!(reread, updated);
}

#[tokio::test]
async fn test_service_diagnostic_keeps_logging_settings_across_update() {
    let server = MockServer::start().await;
    let fake = FakeArm::mount(&server).await;
    let logger_id = create_logger(&server).await;
    let handler = get_resource("azurerm_api_management_diagnostic", context(&server)).unwrap();

    create_then_rename_operations(
        handler.as_ref(),
        &fake,
        diagnostic_config(&logger_id, "Name"),
        diagnostic_config(&logger_id, "Url"),
    )
    .await;

    assert!(fake.get(&child("/diagnostics/applicationinsights")).is_some());
}

#[tokio::test]
async fn test_api_diagnostic_keeps_logging_settings_across_update() {
    let server = MockServer::start().await;
    let fake = FakeArm::mount(&server).await;
    let logger_id = create_logger(&server).await;
    let handler =
        get_resource("azurerm_api_management_api_diagnostic", context(&server)).unwrap();

    let mut config = diagnostic_config(&logger_id, "Name");
    config["api_name"] = json!("echo");
    let mut renamed = diagnostic_config(&logger_id, "Url");
    renamed["api_name"] = json!("echo");

    create_then_rename_operations(handler.as_ref(), &fake, config, renamed).await;

    assert!(
        fake.get(&child("/apis/echo/diagnostics/applicationinsights"))
            .is_some()
    );
}

#[tokio::test]
async fn test_unset_logging_settings_keep_server_values() {
    let server = MockServer::start().await;
    let fake = FakeArm::mount(&server).await;
    let logger_id = create_logger(&server).await;
    let handler = get_resource("azurerm_api_management_diagnostic", context(&server)).unwrap();
    let created = handler
        .create(&diagnostic_config(&logger_id, "Name"))
        .await
        .unwrap();

    // Leaving the computed fields out keeps what the service already has.
    let sparse = json!({
        "identifier": "applicationinsights",
        "api_management_name": "svc",
        "resource_group_name": "rg",
        "api_management_logger_id": logger_id,
        "operation_name_format": "Url"
    });
    let updated = handler.update(&created, &sparse).await.unwrap();
    assert_logging_settings(&updated);

    let stored = fake.get(&updated.id).unwrap();
    assert_eq!(stored["properties"]["verbosity"], "verbose");
}

#[tokio::test]
async fn test_logger_id_casing_from_service_is_normalized() {
    let server = MockServer::start().await;
    let fake = FakeArm::mount(&server).await;
    let logger_id = create_logger(&server).await;
    let handler = get_resource("azurerm_api_management_diagnostic", context(&server)).unwrap();
    let config = diagnostic_config(&logger_id, "Name");
    let created = handler.create(&config).await.unwrap();

    let mut stored = fake.get(&created.id).unwrap();
    stored["properties"]["loggerId"] = json!(logger_id.replace("resourceGroups", "resourcegroups"));
    fake.seed(&created.id, stored);

    let read = handler.read(&created).await.unwrap().unwrap();
    assert_eq!(read.get_str("api_management_logger_id"), Some(logger_id.as_str()));
    assert_eq!(handler.plan(&read, &config).unwrap(), Plan::NoOp);
}
