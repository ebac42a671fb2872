//! Policy documents at service, API and API operation scope.

use serde::{Deserialize, Serialize};

use crate::arm::Envelope;
use crate::ids::{ApiPolicyId, OperationPolicyId, ServicePolicyId};
use crate::resource::ArmResource;
use crate::validate::{LazyPattern, ValidationError, Validator};

pub struct ServicePolicy;
pub struct ApiPolicy;
pub struct ApiOperationPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    pub api_management_name: String,
    pub resource_group_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub xml_content: Option<String>,
    #[serde(default)]
    pub xml_link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub value: String,
}

const RAW_XML: &str = "rawxml";
const RAW_XML_LINK: &str = "rawxml-link";

const FORCE_NEW: &[&str] = &[
    "api_management_name",
    "resource_group_name",
    "api_name",
    "operation_id",
];

/// ARM returns the document, never the link it was loaded from.
const COMPUTED: &[&str] = &["xml_content"];

#[derive(Clone, Copy)]
enum Scope {
    Service,
    Api,
    Operation,
}

fn validate_policy(
    resource_type: &'static str,
    scope: Scope,
    config: &PolicyConfig,
) -> Result<(), ValidationError> {
    let mut v = Validator::new(resource_type);
    v.service_name("api_management_name", &config.api_management_name)
        .resource_group_name("resource_group_name", &config.resource_group_name)
        .exactly_one_of(&[
            ("xml_content", config.xml_content.is_some()),
            ("xml_link", config.xml_link.is_some()),
        ])
        .opt_not_empty("xml_content", config.xml_content.as_deref());

    if let Some(link) = &config.xml_link {
        v.http_url("xml_link", link);
    }

    let (wants_api, wants_operation) = match scope {
        Scope::Service => (false, false),
        Scope::Api => (true, false),
        Scope::Operation => (true, true),
    };

    for (field, wanted, value) in [
        ("api_name", wants_api, &config.api_name),
        ("operation_id", wants_operation, &config.operation_id),
    ] {
        match (wanted, value) {
            (true, Some(value)) => {
                v.not_empty(field, value);
            }
            (true, None) => {
                v.error(field, "is required");
            }
            (false, Some(_)) => {
                v.error(field, format!("is not supported on {}", resource_type));
            }
            (false, None) => {}
        }
    }

    v.finish()
}

fn expand_policy(config: &PolicyConfig) -> Envelope<PolicyProperties> {
    let (format, value) = match (&config.xml_link, &config.xml_content) {
        (Some(link), _) => (RAW_XML_LINK, link.clone()),
        (None, content) => (RAW_XML, content.clone().unwrap_or_default()),
    };
    Envelope::with_properties(PolicyProperties {
        format: Some(format.to_string()),
        value,
    })
}

static BETWEEN_ELEMENTS: LazyPattern = LazyPattern::new(r">\s+<");
static BEFORE_SELF_CLOSE: LazyPattern = LazyPattern::new(r"\s+/>");

/// ARM re-indents policy documents; whitespace between elements carries no meaning.
pub fn normalize_xml(xml: &str) -> String {
    let mut out = xml.replace("\r\n", "\n").trim().to_string();
    if let Some(re) = BETWEEN_ELEMENTS.get() {
        out = re.replace_all(&out, "><").into_owned();
    }
    if let Some(re) = BEFORE_SELF_CLOSE.get() {
        out = re.replace_all(&out, "/>").into_owned();
    }
    out
}

fn flatten_policy(
    service_name: &str,
    resource_group_name: &str,
    api_name: Option<String>,
    operation_id: Option<String>,
    model: &Envelope<PolicyProperties>,
    prior: Option<&PolicyConfig>,
) -> PolicyConfig {
    let props = model.properties.clone().unwrap_or_default();
    // Keep the caller's formatting when the document is unchanged.
    let xml_content = match prior.and_then(|p| p.xml_content.as_ref()) {
        Some(previous) if normalize_xml(previous) == normalize_xml(&props.value) => previous.clone(),
        _ => props.value,
    };
    PolicyConfig {
        api_management_name: service_name.to_string(),
        resource_group_name: resource_group_name.to_string(),
        api_name,
        operation_id,
        xml_content: Some(xml_content),
        xml_link: prior.and_then(|p| p.xml_link.clone()),
    }
}

impl ArmResource for ServicePolicy {
    type Id = ServicePolicyId;
    type Config = PolicyConfig;
    type Model = Envelope<PolicyProperties>;

    const TYPE_NAME: &'static str = "azurerm_api_management_policy";
    const API_VERSION: &'static str = "2022-08-01";
    const FORCE_NEW: &'static [&'static str] = FORCE_NEW;
    const COMPUTED: &'static [&'static str] = COMPUTED;

    fn validate(config: &PolicyConfig) -> Result<(), ValidationError> {
        validate_policy(Self::TYPE_NAME, Scope::Service, config)
    }

    fn id_from_config(subscription_id: &str, config: &PolicyConfig) -> ServicePolicyId {
        ServicePolicyId::new(
            subscription_id,
            &config.resource_group_name,
            &config.api_management_name,
        )
    }

    fn expand(config: &PolicyConfig) -> Self::Model {
        expand_policy(config)
    }

    fn flatten(id: &ServicePolicyId, model: &Self::Model, prior: Option<&PolicyConfig>) -> PolicyConfig {
        flatten_policy(&id.service_name, &id.resource_group_name, None, None, model, prior)
    }
}

impl ArmResource for ApiPolicy {
    type Id = ApiPolicyId;
    type Config = PolicyConfig;
    type Model = Envelope<PolicyProperties>;

    const TYPE_NAME: &'static str = "azurerm_api_management_api_policy";
    const API_VERSION: &'static str = "2022-08-01";
    const FORCE_NEW: &'static [&'static str] = FORCE_NEW;
    const COMPUTED: &'static [&'static str] = COMPUTED;

    fn validate(config: &PolicyConfig) -> Result<(), ValidationError> {
        validate_policy(Self::TYPE_NAME, Scope::Api, config)
    }

    fn id_from_config(subscription_id: &str, config: &PolicyConfig) -> ApiPolicyId {
        ApiPolicyId::new(
            subscription_id,
            &config.resource_group_name,
            &config.api_management_name,
            config.api_name.as_deref().unwrap_or_default(),
        )
    }

    fn expand(config: &PolicyConfig) -> Self::Model {
        expand_policy(config)
    }

    fn flatten(id: &ApiPolicyId, model: &Self::Model, prior: Option<&PolicyConfig>) -> PolicyConfig {
        flatten_policy(
            &id.service_name,
            &id.resource_group_name,
            Some(id.api_id.clone()),
            None,
            model,
            prior,
        )
    }
}

impl ArmResource for ApiOperationPolicy {
    type Id = OperationPolicyId;
    type Config = PolicyConfig;
    type Model = Envelope<PolicyProperties>;

    const TYPE_NAME: &'static str = "azurerm_api_management_api_operation_policy";
    const API_VERSION: &'static str = "2022-08-01";
    const FORCE_NEW: &'static [&'static str] = FORCE_NEW;
    const COMPUTED: &'static [&'static str] = COMPUTED;

    fn validate(config: &PolicyConfig) -> Result<(), ValidationError> {
        validate_policy(Self::TYPE_NAME, Scope::Operation, config)
    }

    fn id_from_config(subscription_id: &str, config: &PolicyConfig) -> OperationPolicyId {
        OperationPolicyId::new(
            subscription_id,
            &config.resource_group_name,
            &config.api_management_name,
            config.api_name.as_deref().unwrap_or_default(),
            config.operation_id.as_deref().unwrap_or_default(),
        )
    }

    fn expand(config: &PolicyConfig) -> Self::Model {
        expand_policy(config)
    }

    fn flatten(
        id: &OperationPolicyId,
        model: &Self::Model,
        prior: Option<&PolicyConfig>,
    ) -> PolicyConfig {
        flatten_policy(
            &id.service_name,
            &id.resource_group_name,
            Some(id.api_id.clone()),
            Some(id.operation_id.clone()),
            model,
            prior,
        )
    }
}
