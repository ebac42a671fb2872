use serde::{Deserialize, Serialize};

use crate::arm::Envelope;
use crate::ids::{CertificateId, HostnameConfigurationId, ResourceId};
use crate::resource::ArmResource;
use crate::validate::{ValidationError, Validator};

use super::default_true;

/// Binds a host name and certificate to a self-hosted gateway.
pub struct GatewayHostnameConfiguration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostnameConfigurationConfig {
    pub name: String,
    pub api_management_name: String,
    pub resource_group_name: String,
    pub gateway_name: String,
    pub host_name: String,
    pub certificate_id: String,
    #[serde(default)]
    pub request_client_certificate_enabled: bool,
    #[serde(default = "default_true")]
    pub http2_enabled: bool,
    #[serde(default)]
    pub tls10_enabled: bool,
    #[serde(default)]
    pub tls11_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostnameConfigurationProperties {
    #[serde(default)]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negotiate_client_certificate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http2_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls10_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls11_enabled: Option<bool>,
}

impl ArmResource for GatewayHostnameConfiguration {
    type Id = HostnameConfigurationId;
    type Config = HostnameConfigurationConfig;
    type Model = Envelope<HostnameConfigurationProperties>;

    const TYPE_NAME: &'static str = "azurerm_api_management_gateway_host_name_configuration";
    const API_VERSION: &'static str = "2022-08-01";
    const FORCE_NEW: &'static [&'static str] = &[
        "name",
        "api_management_name",
        "resource_group_name",
        "gateway_name",
    ];

    fn validate(config: &HostnameConfigurationConfig) -> Result<(), ValidationError> {
        let mut v = Validator::new(Self::TYPE_NAME);
        v.child_name("name", &config.name)
            .service_name("api_management_name", &config.api_management_name)
            .resource_group_name("resource_group_name", &config.resource_group_name)
            .child_name("gateway_name", &config.gateway_name)
            .not_empty("host_name", &config.host_name);

        if CertificateId::parse_insensitively(&config.certificate_id).is_err() {
            v.error("certificate_id", "must be the ID of an API Management certificate");
        }
        v.finish()
    }

    fn id_from_config(
        subscription_id: &str,
        config: &HostnameConfigurationConfig,
    ) -> HostnameConfigurationId {
        HostnameConfigurationId::new(
            subscription_id,
            &config.resource_group_name,
            &config.api_management_name,
            &config.gateway_name,
            &config.name,
        )
    }

    fn expand(config: &HostnameConfigurationConfig) -> Self::Model {
        Envelope::with_properties(HostnameConfigurationProperties {
            hostname: config.host_name.clone(),
            certificate_id: Some(config.certificate_id.clone()),
            negotiate_client_certificate: Some(config.request_client_certificate_enabled),
            http2_enabled: Some(config.http2_enabled),
            tls10_enabled: Some(config.tls10_enabled),
            tls11_enabled: Some(config.tls11_enabled),
        })
    }

    fn flatten(
        id: &HostnameConfigurationId,
        model: &Self::Model,
        _prior: Option<&HostnameConfigurationConfig>,
    ) -> HostnameConfigurationConfig {
        let props = model.properties.clone().unwrap_or_default();
        let certificate_id = props
            .certificate_id
            .map(|raw| {
                CertificateId::parse_insensitively(&raw)
                    .map(|id| id.id())
                    .unwrap_or(raw)
            })
            .unwrap_or_default();

        HostnameConfigurationConfig {
            name: id.hostname_configuration_id.clone(),
            api_management_name: id.service_name.clone(),
            resource_group_name: id.resource_group_name.clone(),
            gateway_name: id.gateway_id.clone(),
            host_name: props.hostname,
            certificate_id,
            request_client_certificate_enabled: props.negotiate_client_certificate.unwrap_or(false),
            http2_enabled: props.http2_enabled.unwrap_or(true),
            tls10_enabled: props.tls10_enabled.unwrap_or(false),
            tls11_enabled: props.tls11_enabled.unwrap_or(false),
        }
    }
}
