use serde::{Deserialize, Serialize};

use crate::arm::Envelope;
use crate::ids::NamedValueId;
use crate::resource::ArmResource;
use crate::validate::{ValidationError, Validator};

pub struct NamedValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedValueConfig {
    pub name: String,
    pub api_management_name: String,
    pub resource_group_name: String,
    pub display_name: String,
    /// Never returned by ARM when `secret` is set.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub value_from_key_vault: Vec<KeyVaultValue>,
    #[serde(default)]
    pub secret: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyVaultValue {
    pub secret_id: String,
    #[serde(default)]
    pub identity_client_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedValueProperties {
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_vault: Option<KeyVaultContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyVaultContract {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_client_id: Option<String>,
}

const MAX_TAGS: usize = 32;

impl ArmResource for NamedValue {
    type Id = NamedValueId;
    type Config = NamedValueConfig;
    type Model = Envelope<NamedValueProperties>;

    const TYPE_NAME: &'static str = "azurerm_api_management_named_value";
    const API_VERSION: &'static str = "2022-08-01";
    const FORCE_NEW: &'static [&'static str] =
        &["name", "api_management_name", "resource_group_name"];

    fn validate(config: &NamedValueConfig) -> Result<(), ValidationError> {
        let mut v = Validator::new(Self::TYPE_NAME);
        v.child_name("name", &config.name)
            .service_name("api_management_name", &config.api_management_name)
            .resource_group_name("resource_group_name", &config.resource_group_name)
            .length_between("display_name", &config.display_name, 1, 256)
            .require(
                config.value_from_key_vault.len() <= 1,
                "value_from_key_vault",
                "at most one block may be set",
            )
            .exactly_one_of(&[
                ("value", config.value.is_some()),
                ("value_from_key_vault", !config.value_from_key_vault.is_empty()),
            ])
            .require(
                config.tags.len() <= MAX_TAGS,
                "tags",
                "at most 32 tags may be set",
            );

        if let Some(value) = &config.value {
            v.length_between("value", value, 1, 4096);
        }
        if let Some(kv) = config.value_from_key_vault.first() {
            v.http_url("value_from_key_vault.0.secret_id", &kv.secret_id);
        }
        v.finish()
    }

    fn id_from_config(subscription_id: &str, config: &NamedValueConfig) -> NamedValueId {
        NamedValueId::new(
            subscription_id,
            &config.resource_group_name,
            &config.api_management_name,
            &config.name,
        )
    }

    fn expand(config: &NamedValueConfig) -> Self::Model {
        Envelope::with_properties(NamedValueProperties {
            display_name: config.display_name.clone(),
            value: config.value.clone(),
            key_vault: config.value_from_key_vault.first().map(|kv| KeyVaultContract {
                secret_identifier: Some(kv.secret_id.clone()),
                identity_client_id: kv.identity_client_id.clone(),
            }),
            secret: Some(config.secret),
            tags: (!config.tags.is_empty()).then(|| config.tags.clone()),
        })
    }

    fn flatten(id: &NamedValueId, model: &Self::Model, prior: Option<&NamedValueConfig>) -> NamedValueConfig {
        let props = model.properties.clone().unwrap_or_default();
        let secret = props.secret.unwrap_or(false);
        let key_vault = props
            .key_vault
            .and_then(|kv| {
                kv.secret_identifier.map(|secret_id| KeyVaultValue {
                    secret_id,
                    identity_client_id: kv.identity_client_id,
                })
            })
            .into_iter()
            .collect::<Vec<_>>();

        let value = if !key_vault.is_empty() {
            None
        } else if secret {
            prior.and_then(|p| p.value.clone())
        } else {
            props.value
        };

        NamedValueConfig {
            name: id.named_value_id.clone(),
            api_management_name: id.service_name.clone(),
            resource_group_name: id.resource_group_name.clone(),
            display_name: props.display_name,
            value,
            value_from_key_vault: key_vault,
            secret,
            tags: props.tags.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> NamedValueConfig {
        serde_json::from_value(json!({
            "name": "backend-key",
            "api_management_name": "svc",
            "resource_group_name": "rg",
            "display_name": "BackendKey",
            "value": "s3cr3t",
            "secret": true,
            "tags": ["backend"]
        }))
        .unwrap()
    }

    #[test]
    fn test_secret_value_carried_from_prior() {
        let config = config();
        let id = NamedValue::id_from_config("sub", &config);
        let model: Envelope<NamedValueProperties> = serde_json::from_value(json!({
            "properties": {"displayName": "BackendKey", "secret": true, "tags": ["backend"]}
        }))
        .unwrap();

        assert_eq!(NamedValue::flatten(&id, &model, Some(&config)), config);
        assert_eq!(NamedValue::flatten(&id, &model, None).value, None);
    }

    #[test]
    fn test_plain_value_read_back() {
        let id = NamedValueId::new("sub", "rg", "svc", "region");
        let model: Envelope<NamedValueProperties> = serde_json::from_value(json!({
            "properties": {"displayName": "Region", "value": "westeurope", "secret": false}
        }))
        .unwrap();
        let flat = NamedValue::flatten(&id, &model, None);
        assert_eq!(flat.value.as_deref(), Some("westeurope"));
        assert!(flat.tags.is_empty());
    }

    #[test]
    fn test_expand_key_vault() {
        let mut config = config();
        config.value = None;
        config.value_from_key_vault = vec![KeyVaultValue {
            secret_id: "https://kv.vault.azure.net/secrets/backend".to_string(),
            identity_client_id: None,
        }];
        assert!(NamedValue::validate(&config).is_ok());

        let json = serde_json::to_value(NamedValue::expand(&config)).unwrap();
        assert_eq!(
            json["properties"]["keyVault"],
            json!({"secretIdentifier": "https://kv.vault.azure.net/secrets/backend"})
        );
        assert!(json["properties"].get("value").is_none());
    }

    #[test]
    fn test_value_sources_exclusive() {
        let mut config = config();
        config.value_from_key_vault = vec![KeyVaultValue {
            secret_id: "https://kv.vault.azure.net/secrets/backend".to_string(),
            identity_client_id: None,
        }];
        let err = NamedValue::validate(&config).unwrap_err();
        assert!(err.has_field("value"));
    }
}
