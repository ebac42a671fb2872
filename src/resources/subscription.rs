use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::arm::Envelope;
use crate::ids::{ApiId, ApimSubscriptionId, ProductId, ResourceId, ServiceId, UserId};
use crate::resource::ArmResource;
use crate::validate::{ValidationError, Validator};

use super::default_true;

/// An API Management subscription: a key pair granting access to a scope.
pub struct Subscription;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionConfig {
    /// The APIM subscription identifier (not the Azure subscription).
    /// A random UUID is chosen on create when unset.
    #[serde(default)]
    pub subscription_id: Option<String>,
    pub api_management_name: String,
    pub resource_group_name: String,
    pub display_name: String,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub api_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default = "default_true")]
    pub allow_tracing: bool,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub secondary_key: Option<String>,
}

fn default_state() -> String {
    "submitted".to_string()
}

const STATES: &[&str] = &[
    "active",
    "cancelled",
    "expired",
    "rejected",
    "submitted",
    "suspended",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionProperties {
    #[serde(default)]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_tracing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_key: Option<String>,
}

impl ArmResource for Subscription {
    type Id = ApimSubscriptionId;
    type Config = SubscriptionConfig;
    type Model = Envelope<SubscriptionProperties>;

    const TYPE_NAME: &'static str = "azurerm_api_management_subscription";
    const API_VERSION: &'static str = "2022-08-01";
    const FORCE_NEW: &'static [&'static str] = &[
        "subscription_id",
        "api_management_name",
        "resource_group_name",
        "product_id",
        "api_id",
        "user_id",
    ];
    const COMPUTED: &'static [&'static str] = &["subscription_id", "primary_key", "secondary_key"];

    fn validate(config: &SubscriptionConfig) -> Result<(), ValidationError> {
        let mut v = Validator::new(Self::TYPE_NAME);
        if let Some(sid) = &config.subscription_id {
            // The identifier is a URL path segment.
            v.length_between("subscription_id", sid, 1, 256).require(
                sid.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~')),
                "subscription_id",
                "may only contain letters, digits, '-', '_', '.' and '~'",
            );
        }
        v.service_name("api_management_name", &config.api_management_name)
            .resource_group_name("resource_group_name", &config.resource_group_name)
            .length_between("display_name", &config.display_name, 1, 100)
            .require(
                STATES.contains(&config.state.as_str()),
                "state",
                "must be one of `active`, `cancelled`, `expired`, `rejected`, `submitted`, `suspended`",
            )
            .conflicts_with(
                "product_id",
                config.product_id.is_some(),
                "api_id",
                config.api_id.is_some(),
            );

        if let Some(product) = &config.product_id {
            if ProductId::parse_insensitively(product).is_err() {
                v.error("product_id", "must be the ID of an API Management product");
            }
        }
        if let Some(api) = &config.api_id {
            if ApiId::parse_insensitively(api).is_err() {
                v.error("api_id", "must be the ID of an API Management API");
            }
        }
        if let Some(user) = &config.user_id {
            if UserId::parse_insensitively(user).is_err() {
                v.error("user_id", "must be the ID of an API Management user");
            }
        }
        if let Some(key) = &config.primary_key {
            v.length_between("primary_key", key, 1, 256);
        }
        if let Some(key) = &config.secondary_key {
            v.length_between("secondary_key", key, 1, 256);
        }
        v.finish()
    }

    fn assign_generated(config: &mut SubscriptionConfig) {
        if config.subscription_id.is_none() {
            config.subscription_id = Some(Uuid::new_v4().to_string());
        }
    }

    fn id_from_config(subscription_id: &str, config: &SubscriptionConfig) -> ApimSubscriptionId {
        ApimSubscriptionId::new(
            subscription_id,
            &config.resource_group_name,
            &config.api_management_name,
            config.subscription_id.as_deref().unwrap_or_default(),
        )
    }

    fn expand(config: &SubscriptionConfig) -> Self::Model {
        let scope = match (&config.product_id, &config.api_id) {
            (Some(product), _) => product.clone(),
            (None, Some(api)) => api.clone(),
            // All APIs of the service.
            (None, None) => "/apis".to_string(),
        };

        Envelope::with_properties(SubscriptionProperties {
            scope,
            owner_id: config.user_id.clone(),
            display_name: Some(config.display_name.clone()),
            state: Some(config.state.clone()),
            allow_tracing: Some(config.allow_tracing),
            primary_key: config.primary_key.clone(),
            secondary_key: config.secondary_key.clone(),
        })
    }

    fn flatten(
        id: &ApimSubscriptionId,
        model: &Self::Model,
        prior: Option<&SubscriptionConfig>,
    ) -> SubscriptionConfig {
        let props = model.properties.clone().unwrap_or_default();

        let product_id = ProductId::parse_insensitively(&props.scope).ok().map(|p| p.id());
        let api_id = ApiId::parse_insensitively(&props.scope).ok().map(|a| a.id());
        let user_id = props.owner_id.as_deref().map(|owner| {
            UserId::parse_insensitively(owner)
                .map(|u| u.id())
                .unwrap_or_else(|_| owner.to_string())
        });

        // Keys are only listed through a separate secrets call.
        let primary_key = props
            .primary_key
            .or_else(|| prior.and_then(|p| p.primary_key.clone()));
        let secondary_key = props
            .secondary_key
            .or_else(|| prior.and_then(|p| p.secondary_key.clone()));

        SubscriptionConfig {
            subscription_id: Some(id.sid.clone()),
            api_management_name: id.service_name.clone(),
            resource_group_name: id.resource_group_name.clone(),
            display_name: props.display_name.unwrap_or_default(),
            product_id,
            api_id,
            user_id,
            state: props.state.unwrap_or_else(default_state),
            allow_tracing: props.allow_tracing.unwrap_or(true),
            primary_key,
            secondary_key,
        }
    }
}

impl Subscription {
    /// The service the subscription belongs to.
    pub fn service_of(id: &ApimSubscriptionId) -> ServiceId {
        ServiceId::new(&id.subscription_id, &id.resource_group_name, &id.service_name)
    }
}
