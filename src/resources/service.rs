use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::ServiceId;
use crate::resource::{ArmResource, SoftDeleted, Timeouts};
use crate::validate::{LazyPattern, ValidationError, Validator};

use super::default_true;

/// The API Management service itself.
pub struct ApiManagementService;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
    pub resource_group_name: String,
    pub location: String,
    pub publisher_name: String,
    pub publisher_email: String,
    /// `{tier}_{capacity}`, e.g. `Developer_1` or `Consumption_0`.
    pub sku_name: String,
    #[serde(default)]
    pub identity: Vec<Identity>,
    #[serde(default = "default_virtual_network_type")]
    pub virtual_network_type: String,
    #[serde(default)]
    pub virtual_network_configuration: Vec<VirtualNetworkConfiguration>,
    #[serde(default)]
    pub additional_location: Vec<AdditionalLocation>,
    #[serde(default)]
    pub hostname_configuration: Vec<HostnameConfiguration>,
    #[serde(default)]
    pub certificate: Vec<Certificate>,
    #[serde(default)]
    pub security: Vec<Security>,
    #[serde(default)]
    pub protocols: Vec<Protocols>,
    #[serde(default)]
    pub public_ip_address_id: Option<String>,
    #[serde(default = "default_true")]
    pub public_network_access_enabled: bool,
    #[serde(default)]
    pub client_certificate_enabled: bool,
    #[serde(default)]
    pub gateway_disabled: bool,
    #[serde(default)]
    pub min_api_version: Option<String>,
    #[serde(default)]
    pub notification_sender_email: Option<String>,
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    #[serde(default)]
    pub identity_principal_id: Option<String>,
    #[serde(default)]
    pub identity_tenant_id: Option<String>,
    #[serde(default)]
    pub gateway_url: Option<String>,
    #[serde(default)]
    pub gateway_regional_url: Option<String>,
    #[serde(default)]
    pub management_api_url: Option<String>,
    #[serde(default)]
    pub portal_url: Option<String>,
    #[serde(default)]
    pub developer_portal_url: Option<String>,
    #[serde(default)]
    pub scm_url: Option<String>,
    #[serde(default)]
    pub public_ip_addresses: Vec<String>,
    #[serde(default)]
    pub private_ip_addresses: Vec<String>,
}

fn default_virtual_network_type() -> String {
    "None".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Identity {
    #[serde(rename = "type")]
    pub identity_type: String,
    #[serde(default)]
    pub identity_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VirtualNetworkConfiguration {
    pub subnet_id: String,
}

/// A secondary region the gateway is deployed to (Premium only).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdditionalLocation {
    pub location: String,
    /// Units in this region; the service's own capacity when unset.
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub gateway_disabled: bool,
    #[serde(default)]
    pub virtual_network_configuration: Vec<VirtualNetworkConfiguration>,
    #[serde(default)]
    pub public_ip_address_id: Option<String>,

    #[serde(default)]
    pub gateway_regional_url: Option<String>,
    #[serde(default)]
    pub public_ip_addresses: Vec<String>,
    #[serde(default)]
    pub private_ip_addresses: Vec<String>,
}

/// Custom domains, grouped by the endpoint they front.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostnameConfiguration {
    #[serde(default)]
    pub management: Vec<Hostname>,
    #[serde(default)]
    pub portal: Vec<Hostname>,
    #[serde(default)]
    pub developer_portal: Vec<Hostname>,
    #[serde(default)]
    pub proxy: Vec<Hostname>,
    #[serde(default)]
    pub scm: Vec<Hostname>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Hostname {
    pub host_name: String,
    #[serde(default)]
    pub key_vault_certificate_id: Option<String>,
    /// Base64 PFX. Never returned by the API.
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub certificate_password: Option<String>,
    #[serde(default)]
    pub negotiate_client_certificate: bool,
    #[serde(default)]
    pub ssl_keyvault_identity_client_id: Option<String>,
    /// Proxy hostnames only.
    #[serde(default)]
    pub default_ssl_binding: Option<bool>,

    #[serde(default)]
    pub certificate_source: Option<String>,
    #[serde(default)]
    pub certificate_status: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub thumbprint: Option<String>,
}

/// A CA or root certificate installed on the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Certificate {
    pub encoded_certificate: String,
    #[serde(default)]
    pub certificate_password: Option<String>,
    pub store_name: String,

    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub thumbprint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Protocols {
    #[serde(default)]
    pub http2_enabled: bool,
}

const CUSTOM_PROPERTY_PREFIX: &str = "Microsoft.WindowsAzure.ApiManagement.Gateway.";
const HTTP2: &str = "Protocols.Server.Http2";

/// Declares the `security` block. Each flag maps to one gateway custom
/// property; flags marked `false` cannot be changed on the Consumption tier.
macro_rules! security_flags {
    ($($field:ident => $key:literal, $consumption:literal;)*) => {
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(deny_unknown_fields)]
        pub struct Security {
            $(
                #[serde(default)]
                pub $field: bool,
            )*
        }

        impl Security {
            /// `(field, custom property suffix, value, allowed on Consumption)`
            fn flags(&self) -> Vec<(&'static str, &'static str, bool, bool)> {
                vec![$((stringify!($field), $key, self.$field, $consumption),)*]
            }

            fn from_custom_properties(properties: &BTreeMap<String, String>) -> Self {
                Self {
                    $($field: custom_flag(properties, $key),)*
                }
            }
        }
    };
}

security_flags! {
    backend_ssl30_enabled => "Security.Backend.Protocols.Ssl30", true;
    backend_tls10_enabled => "Security.Backend.Protocols.Tls10", true;
    backend_tls11_enabled => "Security.Backend.Protocols.Tls11", true;
    frontend_ssl30_enabled => "Security.Protocols.Ssl30", false;
    frontend_tls10_enabled => "Security.Protocols.Tls10", true;
    frontend_tls11_enabled => "Security.Protocols.Tls11", true;
    triple_des_ciphers_enabled => "Security.Ciphers.TripleDes168", false;
    tls_ecdhe_ecdsa_with_aes256_cbc_sha_ciphers_enabled => "Security.Ciphers.TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA", false;
    tls_ecdhe_ecdsa_with_aes128_cbc_sha_ciphers_enabled => "Security.Ciphers.TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA", false;
    tls_ecdhe_rsa_with_aes256_cbc_sha_ciphers_enabled => "Security.Ciphers.TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA", false;
    tls_ecdhe_rsa_with_aes128_cbc_sha_ciphers_enabled => "Security.Ciphers.TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA", false;
    tls_rsa_with_aes128_gcm_sha256_ciphers_enabled => "Security.Ciphers.TLS_RSA_WITH_AES_128_GCM_SHA256", false;
    tls_rsa_with_aes256_gcm_sha384_ciphers_enabled => "Security.Ciphers.TLS_RSA_WITH_AES_256_GCM_SHA384", false;
    tls_rsa_with_aes256_cbc_sha256_ciphers_enabled => "Security.Ciphers.TLS_RSA_WITH_AES_256_CBC_SHA256", false;
    tls_rsa_with_aes128_cbc_sha256_ciphers_enabled => "Security.Ciphers.TLS_RSA_WITH_AES_128_CBC_SHA256", false;
    tls_rsa_with_aes256_cbc_sha_ciphers_enabled => "Security.Ciphers.TLS_RSA_WITH_AES_256_CBC_SHA", false;
    tls_rsa_with_aes128_cbc_sha_ciphers_enabled => "Security.Ciphers.TLS_RSA_WITH_AES_128_CBC_SHA", false;
}

/// A missing or unparsable custom property reads as `false`.
fn custom_flag(properties: &BTreeMap<String, String>, suffix: &str) -> bool {
    properties
        .get(&format!("{CUSTOM_PROPERTY_PREFIX}{suffix}"))
        .and_then(|value| value.to_ascii_lowercase().parse().ok())
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub sku: Sku,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ServiceProperties>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sku {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub capacity: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityContract {
    #[serde(rename = "type", default)]
    pub identity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_assigned_identities: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProperties {
    #[serde(default)]
    pub publisher_name: String,
    #[serde(default)]
    pub publisher_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_sender_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_network_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_network_configuration: Option<VirtualNetworkContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_locations: Option<Vec<AdditionalLocationContract>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname_configurations: Option<Vec<HostnameContract>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificates: Option<Vec<CertificateConfiguration>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_properties: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip_address_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_network_access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_client_certificate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_gateway: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version_constraint: Option<ApiVersionConstraint>,
    /// Undeletes a soft-deleted service of the same name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    #[serde(default, rename = "gatewayUrl", skip_serializing_if = "Option::is_none")]
    pub gateway_url: Option<String>,
    #[serde(default, rename = "gatewayRegionalUrl", skip_serializing_if = "Option::is_none")]
    pub gateway_regional_url: Option<String>,
    #[serde(default, rename = "managementApiUrl", skip_serializing_if = "Option::is_none")]
    pub management_api_url: Option<String>,
    #[serde(default, rename = "portalUrl", skip_serializing_if = "Option::is_none")]
    pub portal_url: Option<String>,
    #[serde(default, rename = "developerPortalUrl", skip_serializing_if = "Option::is_none")]
    pub developer_portal_url: Option<String>,
    #[serde(default, rename = "scmUrl", skip_serializing_if = "Option::is_none")]
    pub scm_url: Option<String>,
    #[serde(default, rename = "publicIPAddresses", skip_serializing_if = "Option::is_none")]
    pub public_ip_addresses: Option<Vec<String>>,
    #[serde(default, rename = "privateIPAddresses", skip_serializing_if = "Option::is_none")]
    pub private_ip_addresses: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkContract {
    #[serde(default)]
    pub subnet_resource_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiVersionConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_api_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalLocationContract {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub sku: Sku,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_gateway: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_network_configuration: Option<VirtualNetworkContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip_address_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_regional_url: Option<String>,
    #[serde(default, rename = "publicIPAddresses", skip_serializing_if = "Option::is_none")]
    pub public_ip_addresses: Option<Vec<String>>,
    #[serde(default, rename = "privateIPAddresses", skip_serializing_if = "Option::is_none")]
    pub private_ip_addresses: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostnameContract {
    #[serde(rename = "type", default)]
    pub hostname_type: String,
    #[serde(default)]
    pub host_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_vault_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negotiate_client_certificate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ssl_binding: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateInformation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_password: Option<String>,
    #[serde(default)]
    pub store_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateInformation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInformation {
    #[serde(default)]
    pub expiry: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub thumbprint: String,
}

const IDENTITY_TYPES: &[&str] = &[
    "SystemAssigned",
    "UserAssigned",
    "SystemAssigned, UserAssigned",
];
const VIRTUAL_NETWORK_TYPES: &[&str] = &["None", "External", "Internal"];
const STORE_NAMES: &[&str] = &["CertificateAuthority", "Root"];
const MAX_CERTIFICATES: usize = 10;

/// Block keys in `hostname_configuration` and the wire `type` of each.
const HOSTNAME_TYPES: [(&str, &str); 5] = [
    ("management", "Management"),
    ("portal", "Portal"),
    ("developer_portal", "DeveloperPortal"),
    ("proxy", "Proxy"),
    ("scm", "Scm"),
];

/// Fields the API reports and the caller never sets.
const READ_ONLY: &[&str] = &[
    "identity_principal_id",
    "identity_tenant_id",
    "gateway_url",
    "gateway_regional_url",
    "management_api_url",
    "portal_url",
    "developer_portal_url",
    "scm_url",
    "public_ip_addresses",
    "private_ip_addresses",
];

static SKU: LazyPattern = LazyPattern::new(
    r"^(?:Consumption_0|(?:Developer|Basic|Standard|Premium|BasicV2|StandardV2|PremiumV2)_[1-9][0-9]*)$",
);

/// `West Europe` and `westeurope` name the same region.
pub fn normalize_location(location: &str) -> String {
    location.replace(' ', "").to_ascii_lowercase()
}

fn split_sku(sku_name: &str) -> Sku {
    match sku_name.split_once('_') {
        Some((name, capacity)) => Sku {
            name: name.to_string(),
            capacity: capacity.parse().unwrap_or_default(),
        },
        None => Sku {
            name: sku_name.to_string(),
            capacity: 0,
        },
    }
}

fn deleted_service_path(subscription_id: &str, location: &str, name: &str) -> String {
    format!(
        "/subscriptions/{}/providers/Microsoft.ApiManagement/locations/{}/deletedservices/{}",
        subscription_id,
        normalize_location(location),
        name
    )
}

impl HostnameConfiguration {
    /// `(block key, wire type, hostnames)` in wire order.
    fn groups(&self) -> [(&'static str, &'static str, &Vec<Hostname>); 5] {
        let [management, portal, developer_portal, proxy, scm] = HOSTNAME_TYPES;
        [
            (management.0, management.1, &self.management),
            (portal.0, portal.1, &self.portal),
            (developer_portal.0, developer_portal.1, &self.developer_portal),
            (proxy.0, proxy.1, &self.proxy),
            (scm.0, scm.1, &self.scm),
        ]
    }

    fn group(&self, key: &str) -> &[Hostname] {
        match key {
            "management" => &self.management,
            "portal" => &self.portal,
            "developer_portal" => &self.developer_portal,
            "proxy" => &self.proxy,
            _ => &self.scm,
        }
    }

    fn group_mut(&mut self, wire_type: &str) -> Option<(&'static str, &mut Vec<Hostname>)> {
        let (key, _) = HOSTNAME_TYPES
            .iter()
            .find(|(_, wire)| wire.eq_ignore_ascii_case(wire_type))?;
        let group = match *key {
            "management" => &mut self.management,
            "portal" => &mut self.portal,
            "developer_portal" => &mut self.developer_portal,
            "proxy" => &mut self.proxy,
            _ => &mut self.scm,
        };
        Some((key, group))
    }

    fn is_empty(&self) -> bool {
        self.groups().iter().all(|(_, _, hosts)| hosts.is_empty())
    }
}

fn validate_hostnames(v: &mut Validator, config: &HostnameConfiguration) {
    if config.is_empty() {
        v.error(
            "hostname_configuration.0",
            "at least one of `management`, `portal`, `developer_portal`, `proxy`, `scm` must be set",
        );
    }
    for (key, _, hosts) in config.groups() {
        for (i, host) in hosts.iter().enumerate() {
            let field = |name: &str| format!("hostname_configuration.0.{key}.{i}.{name}");
            v.not_empty(&field("host_name"), &host.host_name)
                .conflicts_with(
                    &field("certificate"),
                    host.certificate.is_some(),
                    &field("key_vault_certificate_id"),
                    host.key_vault_certificate_id.is_some(),
                )
                .require(
                    host.certificate_password.is_none() || host.certificate.is_some(),
                    &field("certificate_password"),
                    "requires `certificate`",
                )
                .require(
                    key == "proxy" || host.default_ssl_binding.is_none(),
                    &field("default_ssl_binding"),
                    "can only be set on `proxy` hostnames",
                );
            let computed = [
                ("certificate_source", host.certificate_source.is_some()),
                ("certificate_status", host.certificate_status.is_some()),
                ("expiry", host.expiry.is_some()),
                ("subject", host.subject.is_some()),
                ("thumbprint", host.thumbprint.is_some()),
            ];
            for (name, set) in computed {
                v.require(!set, &field(name), "is read-only");
            }
        }
    }
}

fn validate_additional_locations(v: &mut Validator, config: &ServiceConfig, tier: &str) {
    let parent_vnet = !config.virtual_network_configuration.is_empty();
    for (i, location) in config.additional_location.iter().enumerate() {
        let field = |name: &str| format!("additional_location.{i}.{name}");
        let child_vnet = !location.virtual_network_configuration.is_empty();
        v.not_empty(&field("location"), &location.location)
            .require(
                child_vnet == parent_vnet,
                &field("virtual_network_configuration"),
                "must be set in every additional location exactly when the top-level `virtual_network_configuration` is set",
            )
            .require(
                location.virtual_network_configuration.len() <= 1,
                &field("virtual_network_configuration"),
                "at most one block may be set",
            )
            .require(
                location.public_ip_address_id.is_none() || tier == "Premium" || child_vnet,
                &field("public_ip_address_id"),
                "is only supported on the Premium tier or in a virtual network",
            )
            .require(
                location.gateway_regional_url.is_none(),
                &field("gateway_regional_url"),
                "is read-only",
            )
            .require(
                location.public_ip_addresses.is_empty(),
                &field("public_ip_addresses"),
                "is read-only",
            )
            .require(
                location.private_ip_addresses.is_empty(),
                &field("private_ip_addresses"),
                "is read-only",
            );
        if let Some(capacity) = location.capacity {
            v.range(&field("capacity"), capacity, 0, 50);
        }
    }
}

fn validate_certificates(v: &mut Validator, certificates: &[Certificate]) {
    v.require(
        certificates.len() <= MAX_CERTIFICATES,
        "certificate",
        "at most 10 certificates may be installed",
    );
    for (i, cert) in certificates.iter().enumerate() {
        let field = |name: &str| format!("certificate.{i}.{name}");
        v.not_empty(&field("encoded_certificate"), &cert.encoded_certificate)
            .require(
                STORE_NAMES.contains(&cert.store_name.as_str()),
                &field("store_name"),
                "must be one of `CertificateAuthority`, `Root`",
            )
            .require(cert.expiry.is_none(), &field("expiry"), "is read-only")
            .require(cert.subject.is_none(), &field("subject"), "is read-only")
            .require(cert.thumbprint.is_none(), &field("thumbprint"), "is read-only");
    }
}

fn expand_custom_properties(config: &ServiceConfig, consumption: bool) -> BTreeMap<String, String> {
    let security = config.security.first().cloned().unwrap_or_default();
    let mut properties: BTreeMap<String, String> = security
        .flags()
        .into_iter()
        .filter(|(_, _, _, allowed)| *allowed || !consumption)
        .map(|(_, key, value, _)| (format!("{CUSTOM_PROPERTY_PREFIX}{key}"), value.to_string()))
        .collect();
    // HTTP/2 is left at the service default unless a protocols block is set.
    if let Some(protocols) = config.protocols.first() {
        properties.insert(
            format!("{CUSTOM_PROPERTY_PREFIX}{HTTP2}"),
            protocols.http2_enabled.to_string(),
        );
    }
    properties
}

fn expand_hostnames(config: &HostnameConfiguration) -> Vec<HostnameContract> {
    config
        .groups()
        .into_iter()
        .flat_map(|(key, wire_type, hosts)| {
            hosts.iter().map(move |host| HostnameContract {
                hostname_type: wire_type.to_string(),
                host_name: host.host_name.clone(),
                key_vault_id: host.key_vault_certificate_id.clone(),
                identity_client_id: host.ssl_keyvault_identity_client_id.clone(),
                encoded_certificate: host.certificate.clone(),
                certificate_password: host.certificate_password.clone(),
                negotiate_client_certificate: Some(host.negotiate_client_certificate),
                default_ssl_binding: if key == "proxy" { host.default_ssl_binding } else { None },
                ..Default::default()
            })
        })
        .collect()
}

/// The gateway always reports its built-in `{service}.azure-api.net` proxy
/// hostname; it is only kept when the caller listed it.
fn flatten_hostnames(
    service_name: &str,
    contracts: Vec<HostnameContract>,
    prior: Option<&HostnameConfiguration>,
) -> Vec<HostnameConfiguration> {
    let built_in = format!("{service_name}.azure-api.net");
    let mut config = HostnameConfiguration::default();
    for contract in contracts {
        let Some((key, group)) = config.group_mut(&contract.hostname_type) else {
            tracing::debug!(hostname_type = %contract.hostname_type, "skipping unknown hostname type");
            continue;
        };

        // Certificates and passwords are write-only; carry them over by host name.
        let previous = prior
            .map(|p| p.group(key))
            .and_then(|hosts| hosts.iter().find(|h| h.host_name.eq_ignore_ascii_case(&contract.host_name)));
        if key == "proxy" && previous.is_none() && contract.host_name.eq_ignore_ascii_case(&built_in) {
            continue;
        }

        let info = contract.certificate.unwrap_or_default();
        group.push(Hostname {
            host_name: contract.host_name,
            key_vault_certificate_id: contract.key_vault_id,
            certificate: previous.and_then(|h| h.certificate.clone()),
            certificate_password: previous.and_then(|h| h.certificate_password.clone()),
            negotiate_client_certificate: contract.negotiate_client_certificate.unwrap_or(false),
            ssl_keyvault_identity_client_id: contract.identity_client_id,
            default_ssl_binding: (key == "proxy").then(|| contract.default_ssl_binding.unwrap_or(false)),
            certificate_source: contract.certificate_source,
            certificate_status: contract.certificate_status,
            expiry: (!info.expiry.is_empty()).then_some(info.expiry),
            subject: (!info.subject.is_empty()).then_some(info.subject),
            thumbprint: (!info.thumbprint.is_empty()).then_some(info.thumbprint),
        });
    }

    if config.is_empty() { Vec::new() } else { vec![config] }
}

fn expand_additional_locations(config: &ServiceConfig, sku: &Sku) -> Vec<AdditionalLocationContract> {
    config
        .additional_location
        .iter()
        .map(|location| AdditionalLocationContract {
            location: normalize_location(&location.location),
            sku: Sku {
                name: sku.name.clone(),
                capacity: location.capacity.filter(|c| *c > 0).unwrap_or(sku.capacity),
            },
            zones: (!location.zones.is_empty()).then(|| location.zones.clone()),
            disable_gateway: Some(location.gateway_disabled),
            virtual_network_configuration: location.virtual_network_configuration.first().map(|vnet| {
                VirtualNetworkContract {
                    subnet_resource_id: vnet.subnet_id.clone(),
                }
            }),
            public_ip_address_id: location.public_ip_address_id.clone(),
            ..Default::default()
        })
        .collect()
}

fn flatten_additional_locations(
    contracts: Vec<AdditionalLocationContract>,
    prior: &[AdditionalLocation],
) -> Vec<AdditionalLocation> {
    contracts
        .into_iter()
        .enumerate()
        .map(|(i, contract)| {
            let location = normalize_location(&contract.location);
            let location = prior
                .get(i)
                .filter(|p| normalize_location(&p.location) == location)
                .map(|p| p.location.clone())
                .unwrap_or(location);
            AdditionalLocation {
                location,
                capacity: Some(contract.sku.capacity),
                zones: contract.zones.unwrap_or_default(),
                gateway_disabled: contract.disable_gateway.unwrap_or(false),
                virtual_network_configuration: contract
                    .virtual_network_configuration
                    .map(|vnet| VirtualNetworkConfiguration {
                        subnet_id: vnet.subnet_resource_id,
                    })
                    .into_iter()
                    .collect(),
                public_ip_address_id: contract.public_ip_address_id.filter(|id| !id.is_empty()),
                gateway_regional_url: contract.gateway_regional_url,
                public_ip_addresses: contract.public_ip_addresses.unwrap_or_default(),
                private_ip_addresses: contract.private_ip_addresses.unwrap_or_default(),
            }
        })
        .collect()
}

/// Encoded certificates and passwords are write-only; they pair with prior state by position.
fn flatten_certificates(contracts: Vec<CertificateConfiguration>, prior: &[Certificate]) -> Vec<Certificate> {
    contracts
        .into_iter()
        .enumerate()
        .map(|(i, contract)| {
            let previous = prior.get(i);
            let info = contract.certificate.unwrap_or_default();
            Certificate {
                encoded_certificate: previous.map(|p| p.encoded_certificate.clone()).unwrap_or_default(),
                certificate_password: previous.and_then(|p| p.certificate_password.clone()),
                store_name: contract.store_name,
                expiry: (!info.expiry.is_empty()).then_some(info.expiry),
                subject: (!info.subject.is_empty()).then_some(info.subject),
                thumbprint: (!info.thumbprint.is_empty()).then_some(info.thumbprint),
            }
        })
        .collect()
}

impl ArmResource for ApiManagementService {
    type Id = ServiceId;
    type Config = ServiceConfig;
    type Model = ServiceModel;

    const TYPE_NAME: &'static str = "azurerm_api_management";
    const API_VERSION: &'static str = "2022-08-01";
    const FORCE_NEW: &'static [&'static str] = &["name", "resource_group_name", "location"];
    const COMPUTED: &'static [&'static str] = &[
        "notification_sender_email",
        "security",
        "protocols",
        "identity_principal_id",
        "identity_tenant_id",
        "gateway_url",
        "gateway_regional_url",
        "management_api_url",
        "portal_url",
        "developer_portal_url",
        "scm_url",
        "public_ip_addresses",
        "private_ip_addresses",
        "additional_location[].capacity",
        "additional_location[].gateway_regional_url",
        "additional_location[].public_ip_addresses",
        "additional_location[].private_ip_addresses",
        "certificate[].expiry",
        "certificate[].subject",
        "certificate[].thumbprint",
        "hostname_configuration[].proxy[].default_ssl_binding",
        "hostname_configuration[].management[].certificate_source",
        "hostname_configuration[].management[].certificate_status",
        "hostname_configuration[].management[].expiry",
        "hostname_configuration[].management[].subject",
        "hostname_configuration[].management[].thumbprint",
        "hostname_configuration[].portal[].certificate_source",
        "hostname_configuration[].portal[].certificate_status",
        "hostname_configuration[].portal[].expiry",
        "hostname_configuration[].portal[].subject",
        "hostname_configuration[].portal[].thumbprint",
        "hostname_configuration[].developer_portal[].certificate_source",
        "hostname_configuration[].developer_portal[].certificate_status",
        "hostname_configuration[].developer_portal[].expiry",
        "hostname_configuration[].developer_portal[].subject",
        "hostname_configuration[].developer_portal[].thumbprint",
        "hostname_configuration[].proxy[].certificate_source",
        "hostname_configuration[].proxy[].certificate_status",
        "hostname_configuration[].proxy[].expiry",
        "hostname_configuration[].proxy[].subject",
        "hostname_configuration[].proxy[].thumbprint",
        "hostname_configuration[].scm[].certificate_source",
        "hostname_configuration[].scm[].certificate_status",
        "hostname_configuration[].scm[].expiry",
        "hostname_configuration[].scm[].subject",
        "hostname_configuration[].scm[].thumbprint",
    ];
    const IF_MATCH: bool = false;

    fn timeouts() -> Timeouts {
        Timeouts::SERVICE
    }

    fn validate(config: &ServiceConfig) -> Result<(), ValidationError> {
        let mut v = Validator::new(Self::TYPE_NAME);
        v.service_name("name", &config.name)
            .resource_group_name("resource_group_name", &config.resource_group_name)
            .not_empty("location", &config.location)
            .length_between("publisher_name", &config.publisher_name, 1, 100)
            .email("publisher_email", &config.publisher_email)
            .require(
                SKU.is_match(&config.sku_name),
                "sku_name",
                "must be `Consumption_0` or `{tier}_{capacity}` with tier one of Developer, Basic, Standard, Premium, BasicV2, StandardV2, PremiumV2",
            )
            .require(config.identity.len() <= 1, "identity", "at most one block may be set")
            .require(
                config.hostname_configuration.len() <= 1,
                "hostname_configuration",
                "at most one block may be set",
            )
            .require(config.security.len() <= 1, "security", "at most one block may be set")
            .require(config.protocols.len() <= 1, "protocols", "at most one block may be set")
            .require(
                VIRTUAL_NETWORK_TYPES.contains(&config.virtual_network_type.as_str()),
                "virtual_network_type",
                "must be one of `None`, `External`, `Internal`",
            );

        if let Some(email) = &config.notification_sender_email {
            v.email("notification_sender_email", email);
        }
        if let Some(version) = &config.min_api_version {
            v.not_empty("min_api_version", version);
        }

        if let Some(identity) = config.identity.first() {
            v.require(
                IDENTITY_TYPES.contains(&identity.identity_type.as_str()),
                "identity.0.type",
                "must be one of `SystemAssigned`, `UserAssigned`, `SystemAssigned, UserAssigned`",
            );
            let user_assigned = identity.identity_type.contains("UserAssigned");
            v.require(
                user_assigned || identity.identity_ids.is_empty(),
                "identity.0.identity_ids",
                "can only be set with a `UserAssigned` identity",
            )
            .require(
                !user_assigned || !identity.identity_ids.is_empty(),
                "identity.0.identity_ids",
                "is required with a `UserAssigned` identity",
            );
        }

        let in_vnet = config.virtual_network_type != "None";
        v.require(
            in_vnet == (config.virtual_network_configuration.len() == 1),
            "virtual_network_configuration",
            "exactly one block is required when `virtual_network_type` is `External` or `Internal`, and none otherwise",
        );

        let tier = split_sku(&config.sku_name).name;
        let consumption = tier == "Consumption";
        if !config.zones.is_empty() && tier != "Premium" {
            v.error("zones", "availability zones are only supported on the Premium tier");
        }
        if !config.additional_location.is_empty() && tier != "Premium" {
            v.error("additional_location", "is only supported on the Premium tier");
        }
        if config.gateway_disabled && config.additional_location.is_empty() {
            v.error("gateway_disabled", "is only supported when `additional_location` is set");
        }
        if config.client_certificate_enabled && !consumption {
            v.error("client_certificate_enabled", "is only supported on the Consumption tier");
        }
        if config.public_ip_address_id.is_some() && tier != "Premium" && tier != "Developer" && !in_vnet {
            v.error(
                "public_ip_address_id",
                "is only supported on the Developer or Premium tier, or in a virtual network",
            );
        }

        if let Some(security) = config.security.first().filter(|_| consumption) {
            for (field, _, enabled, allowed) in security.flags() {
                v.require(
                    allowed || !enabled,
                    &format!("security.0.{field}"),
                    "is not supported on the Consumption tier",
                );
            }
        }

        if let Some(hostnames) = config.hostname_configuration.first() {
            validate_hostnames(&mut v, hostnames);
        }
        validate_additional_locations(&mut v, config, &tier);
        validate_certificates(&mut v, &config.certificate);

        let read_only = [
            config.identity_principal_id.is_some(),
            config.identity_tenant_id.is_some(),
            config.gateway_url.is_some(),
            config.gateway_regional_url.is_some(),
            config.management_api_url.is_some(),
            config.portal_url.is_some(),
            config.developer_portal_url.is_some(),
            config.scm_url.is_some(),
            !config.public_ip_addresses.is_empty(),
            !config.private_ip_addresses.is_empty(),
        ];
        for (field, set) in READ_ONLY.iter().zip(read_only) {
            v.require(!set, field, "is read-only");
        }

        v.finish()
    }

    fn id_from_config(subscription_id: &str, config: &ServiceConfig) -> ServiceId {
        ServiceId::new(subscription_id, &config.resource_group_name, &config.name)
    }

    fn expand(config: &ServiceConfig) -> ServiceModel {
        let identity = config.identity.first().map(|identity| IdentityContract {
            identity_type: identity.identity_type.clone(),
            user_assigned_identities: (!identity.identity_ids.is_empty()).then(|| {
                identity
                    .identity_ids
                    .iter()
                    .map(|id| (id.clone(), serde_json::json!({})))
                    .collect()
            }),
            principal_id: None,
            tenant_id: None,
        });

        let public_network_access = if config.public_network_access_enabled {
            "Enabled"
        } else {
            "Disabled"
        };

        let sku = split_sku(&config.sku_name);
        let consumption = sku.name == "Consumption";

        ServiceModel {
            id: None,
            name: None,
            location: normalize_location(&config.location),
            identity,
            zones: (!config.zones.is_empty()).then(|| config.zones.clone()),
            tags: (!config.tags.is_empty()).then(|| config.tags.clone()),
            properties: Some(ServiceProperties {
                publisher_name: config.publisher_name.clone(),
                publisher_email: config.publisher_email.clone(),
                notification_sender_email: config.notification_sender_email.clone(),
                virtual_network_type: Some(config.virtual_network_type.clone()),
                virtual_network_configuration: config.virtual_network_configuration.first().map(
                    |vnet| VirtualNetworkContract {
                        subnet_resource_id: vnet.subnet_id.clone(),
                    },
                ),
                additional_locations: (!config.additional_location.is_empty())
                    .then(|| expand_additional_locations(config, &sku)),
                hostname_configurations: config.hostname_configuration.first().map(expand_hostnames),
                certificates: Some(
                    config
                        .certificate
                        .iter()
                        .map(|cert| CertificateConfiguration {
                            encoded_certificate: Some(cert.encoded_certificate.clone()),
                            certificate_password: cert.certificate_password.clone(),
                            store_name: cert.store_name.clone(),
                            certificate: None,
                        })
                        .collect(),
                ),
                custom_properties: Some(expand_custom_properties(config, consumption)),
                public_ip_address_id: config.public_ip_address_id.clone(),
                public_network_access: Some(public_network_access.to_string()),
                enable_client_certificate: Some(config.client_certificate_enabled),
                disable_gateway: Some(config.gateway_disabled),
                api_version_constraint: config.min_api_version.as_ref().map(|v| ApiVersionConstraint {
                    min_api_version: Some(v.clone()),
                }),
                ..Default::default()
            }),
            sku,
        }
    }

    fn flatten(id: &ServiceId, model: &ServiceModel, prior: Option<&ServiceConfig>) -> ServiceConfig {
        let props = model.properties.clone().unwrap_or_default();

        // Keep the caller's spelling of the region when it names the same one.
        let location = normalize_location(&model.location);
        let location = prior
            .filter(|p| normalize_location(&p.location) == location)
            .map(|p| p.location.clone())
            .unwrap_or(location);

        let active_identity = model
            .identity
            .as_ref()
            .filter(|i| !i.identity_type.is_empty() && i.identity_type != "None");
        let identity = active_identity
            .map(|i| {
                let mut identity_ids: Vec<String> = i
                    .user_assigned_identities
                    .as_ref()
                    .map(|ids| ids.keys().cloned().collect())
                    .unwrap_or_default();
                // The API keys identities by ID; keep the caller's order.
                if let Some(previous) = prior.and_then(|p| p.identity.first()) {
                    let mut wanted = previous.identity_ids.clone();
                    wanted.sort();
                    if wanted == identity_ids {
                        identity_ids = previous.identity_ids.clone();
                    }
                }
                Identity {
                    identity_type: i.identity_type.clone(),
                    identity_ids,
                }
            })
            .into_iter()
            .collect();

        let custom_properties = props.custom_properties.clone().unwrap_or_default();
        let prior_hostnames = prior.and_then(|p| p.hostname_configuration.first());
        let prior_locations = prior.map(|p| p.additional_location.as_slice()).unwrap_or_default();
        let prior_certificates = prior.map(|p| p.certificate.as_slice()).unwrap_or_default();

        ServiceConfig {
            name: id.service_name.clone(),
            resource_group_name: id.resource_group_name.clone(),
            location,
            publisher_name: props.publisher_name,
            publisher_email: props.publisher_email,
            sku_name: format!("{}_{}", model.sku.name, model.sku.capacity),
            identity,
            virtual_network_type: props
                .virtual_network_type
                .unwrap_or_else(default_virtual_network_type),
            virtual_network_configuration: props
                .virtual_network_configuration
                .map(|vnet| VirtualNetworkConfiguration {
                    subnet_id: vnet.subnet_resource_id,
                })
                .into_iter()
                .collect(),
            additional_location: flatten_additional_locations(
                props.additional_locations.unwrap_or_default(),
                prior_locations,
            ),
            hostname_configuration: flatten_hostnames(
                &id.service_name,
                props.hostname_configurations.unwrap_or_default(),
                prior_hostnames,
            ),
            certificate: flatten_certificates(props.certificates.unwrap_or_default(), prior_certificates),
            security: vec![Security::from_custom_properties(&custom_properties)],
            protocols: vec![Protocols {
                http2_enabled: custom_flag(&custom_properties, HTTP2),
            }],
            public_ip_address_id: props.public_ip_address_id.filter(|id| !id.is_empty()),
            public_network_access_enabled: props
                .public_network_access
                .is_none_or(|access| access.eq_ignore_ascii_case("Enabled")),
            client_certificate_enabled: props.enable_client_certificate.unwrap_or(false),
            gateway_disabled: props.disable_gateway.unwrap_or(false),
            min_api_version: props.api_version_constraint.and_then(|c| c.min_api_version),
            notification_sender_email: props.notification_sender_email,
            zones: model.zones.clone().unwrap_or_default(),
            tags: model.tags.clone().unwrap_or_default(),
            identity_principal_id: active_identity.and_then(|i| i.principal_id.clone()),
            identity_tenant_id: active_identity.and_then(|i| i.tenant_id.clone()),
            gateway_url: props.gateway_url,
            gateway_regional_url: props.gateway_regional_url,
            management_api_url: props.management_api_url,
            portal_url: props.portal_url,
            developer_portal_url: props.developer_portal_url,
            scm_url: props.scm_url,
            public_ip_addresses: props.public_ip_addresses.unwrap_or_default(),
            private_ip_addresses: props.private_ip_addresses.unwrap_or_default(),
        }
    }

    fn soft_deleted(subscription_id: &str, config: &ServiceConfig) -> Option<SoftDeleted<ServiceModel>> {
        // A restore ignores everything but location and SKU.
        let restore = ServiceModel {
            location: normalize_location(&config.location),
            sku: split_sku(&config.sku_name),
            properties: Some(ServiceProperties {
                restore: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        Some(SoftDeleted {
            path: deleted_service_path(subscription_id, &config.location, &config.name),
            restore,
        })
    }

    fn purge_path(id: &ServiceId, model: &ServiceModel) -> Option<String> {
        Some(deleted_service_path(&id.subscription_id, &model.location, &id.service_name))
    }
}
