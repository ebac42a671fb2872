use serde::{Deserialize, Serialize};

use crate::arm::Envelope;
use crate::ids::LoggerId;
use crate::resource::ArmResource;
use crate::validate::{ValidationError, Validator};

use super::default_true;

pub struct Logger;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggerConfig {
    pub name: String,
    pub api_management_name: String,
    pub resource_group_name: String,
    #[serde(default)]
    pub application_insights: Vec<ApplicationInsights>,
    #[serde(default)]
    pub eventhub: Vec<EventHub>,
    #[serde(default = "default_true")]
    pub buffered: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
}

/// Credentials are write-only: ARM echoes a named-value reference instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationInsights {
    #[serde(default)]
    pub instrumentation_key: Option<String>,
    #[serde(default)]
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventHub {
    pub name: String,
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub endpoint_uri: Option<String>,
    #[serde(default)]
    pub user_assigned_identity_client_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerProperties {
    pub logger_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<LoggerCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_buffered: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrumentation_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_client_id: Option<String>,
}

const APPLICATION_INSIGHTS: &str = "applicationInsights";
const AZURE_EVENT_HUB: &str = "azureEventHub";

impl ArmResource for Logger {
    type Id = LoggerId;
    type Config = LoggerConfig;
    type Model = Envelope<LoggerProperties>;

    const TYPE_NAME: &'static str = "azurerm_api_management_logger";
    const API_VERSION: &'static str = "2022-08-01";
    const FORCE_NEW: &'static [&'static str] = &[
        "name",
        "api_management_name",
        "resource_group_name",
        "resource_id",
    ];

    fn validate(config: &LoggerConfig) -> Result<(), ValidationError> {
        let mut v = Validator::new(Self::TYPE_NAME);
        v.child_name("name", &config.name)
            .service_name("api_management_name", &config.api_management_name)
            .resource_group_name("resource_group_name", &config.resource_group_name)
            .require(
                config.application_insights.len() <= 1,
                "application_insights",
                "at most one block may be set",
            )
            .require(config.eventhub.len() <= 1, "eventhub", "at most one block may be set")
            .exactly_one_of(&[
                ("application_insights", !config.application_insights.is_empty()),
                ("eventhub", !config.eventhub.is_empty()),
            ])
            .opt_not_empty("description", config.description.as_deref())
            .opt_not_empty("resource_id", config.resource_id.as_deref());

        if let Some(ai) = config.application_insights.first() {
            v.exactly_one_of(&[
                (
                    "application_insights.0.instrumentation_key",
                    ai.instrumentation_key.is_some(),
                ),
                (
                    "application_insights.0.connection_string",
                    ai.connection_string.is_some(),
                ),
            ]);
        }

        if let Some(hub) = config.eventhub.first() {
            v.not_empty("eventhub.0.name", &hub.name).exactly_one_of(&[
                ("eventhub.0.connection_string", hub.connection_string.is_some()),
                ("eventhub.0.endpoint_uri", hub.endpoint_uri.is_some()),
            ]);
            if hub.user_assigned_identity_client_id.is_some() && hub.endpoint_uri.is_none() {
                v.error(
                    "eventhub.0.user_assigned_identity_client_id",
                    "requires `endpoint_uri`",
                );
            }
        }

        v.finish()
    }

    fn id_from_config(subscription_id: &str, config: &LoggerConfig) -> LoggerId {
        LoggerId::new(
            subscription_id,
            &config.resource_group_name,
            &config.api_management_name,
            &config.name,
        )
    }

    fn expand(config: &LoggerConfig) -> Self::Model {
        let (logger_type, credentials) = if let Some(ai) = config.application_insights.first() {
            (
                APPLICATION_INSIGHTS,
                LoggerCredentials {
                    instrumentation_key: ai.instrumentation_key.clone(),
                    connection_string: ai.connection_string.clone(),
                    ..Default::default()
                },
            )
        } else if let Some(hub) = config.eventhub.first() {
            (
                AZURE_EVENT_HUB,
                LoggerCredentials {
                    name: Some(hub.name.clone()),
                    connection_string: hub.connection_string.clone(),
                    endpoint_address: hub.endpoint_uri.clone(),
                    identity_client_id: hub.user_assigned_identity_client_id.clone(),
                    ..Default::default()
                },
            )
        } else {
            (APPLICATION_INSIGHTS, LoggerCredentials::default())
        };

        Envelope::with_properties(LoggerProperties {
            logger_type: logger_type.to_string(),
            description: config.description.clone(),
            credentials: Some(credentials),
            is_buffered: Some(config.buffered),
            resource_id: config.resource_id.clone(),
        })
    }

    fn flatten(id: &LoggerId, model: &Self::Model, prior: Option<&LoggerConfig>) -> LoggerConfig {
        let props = model.properties.clone().unwrap_or_default();
        let credentials = props.credentials.unwrap_or_default();

        let application_insights = if props.logger_type.eq_ignore_ascii_case(APPLICATION_INSIGHTS) {
            // ARM masks the key; keep whichever form the caller supplied.
            let known = prior.and_then(|p| p.application_insights.first());
            vec![ApplicationInsights {
                instrumentation_key: known.and_then(|ai| ai.instrumentation_key.clone()),
                connection_string: known.and_then(|ai| ai.connection_string.clone()),
            }]
        } else {
            Vec::new()
        };

        let eventhub = if props.logger_type.eq_ignore_ascii_case(AZURE_EVENT_HUB) {
            let known = prior.and_then(|p| p.eventhub.first());
            vec![EventHub {
                name: credentials
                    .name
                    .clone()
                    .or_else(|| known.map(|hub| hub.name.clone()))
                    .unwrap_or_default(),
                connection_string: known.and_then(|hub| hub.connection_string.clone()),
                endpoint_uri: credentials
                    .endpoint_address
                    .clone()
                    .or_else(|| known.and_then(|hub| hub.endpoint_uri.clone())),
                user_assigned_identity_client_id: credentials
                    .identity_client_id
                    .clone()
                    .or_else(|| known.and_then(|hub| hub.user_assigned_identity_client_id.clone())),
            }]
        } else {
            Vec::new()
        };

        LoggerConfig {
            name: id.logger_id.clone(),
            api_management_name: id.service_name.clone(),
            resource_group_name: id.resource_group_name.clone(),
            application_insights,
            eventhub,
            buffered: props.is_buffered.unwrap_or(true),
            description: props.description,
            resource_id: props.resource_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ResourceId;
    use serde_json::json;

    fn config() -> LoggerConfig {
        serde_json::from_value(json!({
            "name": "appinsights",
            "api_management_name": "svc",
            "resource_group_name": "rg",
            "application_insights": [{"instrumentation_key": "secret-key"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert!(config.buffered);
        assert!(config.eventhub.is_empty());
        assert!(Logger::validate(&config).is_ok());
    }

    #[test]
    fn test_expand_application_insights() {
        let model = Logger::expand(&config());
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(
            json,
            json!({
                "properties": {
                    "loggerType": "applicationInsights",
                    "credentials": {"instrumentationKey": "secret-key"},
                    "isBuffered": true
                }
            })
        );
    }

    #[test]
    fn test_flatten_keeps_write_only_key_from_prior() {
        let id = LoggerId::new("sub", "rg", "svc", "appinsights");
        let model: Envelope<LoggerProperties> = serde_json::from_value(json!({
            "id": id.id(),
            "name": "appinsights",
            "properties": {
                "loggerType": "applicationInsights",
                "credentials": {"instrumentationKey": "{{Logger-Credentials--abc}}"},
                "isBuffered": false
            }
        }))
        .unwrap();

        let prior = config();
        let flat = Logger::flatten(&id, &model, Some(&prior));
        assert_eq!(
            flat.application_insights[0].instrumentation_key.as_deref(),
            Some("secret-key")
        );
        assert!(!flat.buffered);
        assert_eq!(flat.name, "appinsights");
        assert_eq!(flat.api_management_name, "svc");

        let imported = Logger::flatten(&id, &model, None);
        assert_eq!(imported.application_insights[0].instrumentation_key, None);
    }

    #[test]
    fn test_flatten_eventhub() {
        let id = LoggerId::new("sub", "rg", "svc", "hub");
        let model: Envelope<LoggerProperties> = serde_json::from_value(json!({
            "properties": {
                "loggerType": "azureEventHub",
                "credentials": {"name": "events", "connectionString": "{{masked}}"}
            }
        }))
        .unwrap();
        let flat = Logger::flatten(&id, &model, None);
        assert!(flat.application_insights.is_empty());
        assert_eq!(flat.eventhub[0].name, "events");
        assert!(flat.buffered);
    }

    #[test]
    fn test_validate_requires_one_destination() {
        let mut config = config();
        config.application_insights.clear();
        let err = Logger::validate(&config).unwrap_err();
        assert!(err.has_field("application_insights"));

        let mut both = self::config();
        both.eventhub.push(EventHub {
            name: "events".to_string(),
            connection_string: Some("Endpoint=sb://x".to_string()),
            endpoint_uri: None,
            user_assigned_identity_client_id: None,
        });
        assert!(Logger::validate(&both).is_err());
    }

    #[test]
    fn test_validate_rejects_both_credential_forms() {
        let mut config = config();
        config.application_insights[0].connection_string = Some("InstrumentationKey=x".to_string());
        let err = Logger::validate(&config).unwrap_err();
        assert!(err.has_field("application_insights.0.instrumentation_key"));
    }
}
