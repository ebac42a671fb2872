use serde::{Deserialize, Serialize};

use crate::arm::Envelope;
use crate::ids::GatewayId;
use crate::resource::ArmResource;
use crate::validate::{ValidationError, Validator};

/// A self-hosted gateway registration.
pub struct Gateway;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub name: String,
    pub api_management_name: String,
    pub resource_group_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub location_data: Vec<LocationData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationData {
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_data: Option<ResourceLocationData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLocationData {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_or_region: Option<String>,
}

impl ArmResource for Gateway {
    type Id = GatewayId;
    type Config = GatewayConfig;
    type Model = Envelope<GatewayProperties>;

    const TYPE_NAME: &'static str = "azurerm_api_management_gateway";
    const API_VERSION: &'static str = "2022-08-01";
    const FORCE_NEW: &'static [&'static str] =
        &["name", "api_management_name", "resource_group_name"];

    fn validate(config: &GatewayConfig) -> Result<(), ValidationError> {
        let mut v = Validator::new(Self::TYPE_NAME);
        v.child_name("name", &config.name)
            .service_name("api_management_name", &config.api_management_name)
            .resource_group_name("resource_group_name", &config.resource_group_name)
            .opt_not_empty("description", config.description.as_deref())
            .require(
                config.location_data.len() == 1,
                "location_data",
                "exactly one block must be set",
            );

        if let Some(location) = config.location_data.first() {
            v.length_between("location_data.0.name", &location.name, 1, 256)
                .opt_not_empty("location_data.0.city", location.city.as_deref())
                .opt_not_empty("location_data.0.district", location.district.as_deref())
                .opt_not_empty("location_data.0.region", location.region.as_deref());
        }
        v.finish()
    }

    fn id_from_config(subscription_id: &str, config: &GatewayConfig) -> GatewayId {
        GatewayId::new(
            subscription_id,
            &config.resource_group_name,
            &config.api_management_name,
            &config.name,
        )
    }

    fn expand(config: &GatewayConfig) -> Self::Model {
        Envelope::with_properties(GatewayProperties {
            description: config.description.clone(),
            location_data: config.location_data.first().map(|l| ResourceLocationData {
                name: l.name.clone(),
                city: l.city.clone(),
                district: l.district.clone(),
                country_or_region: l.region.clone(),
            }),
        })
    }

    fn flatten(id: &GatewayId, model: &Self::Model, _prior: Option<&GatewayConfig>) -> GatewayConfig {
        let props = model.properties.clone().unwrap_or_default();
        GatewayConfig {
            name: id.gateway_id.clone(),
            api_management_name: id.service_name.clone(),
            resource_group_name: id.resource_group_name.clone(),
            description: props.description,
            location_data: props
                .location_data
                .into_iter()
                .map(|l| LocationData {
                    name: l.name,
                    city: l.city,
                    district: l.district,
                    region: l.country_or_region,
                })
                .collect(),
        }
    }
}
