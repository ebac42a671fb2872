use serde::{Deserialize, Serialize};

use crate::arm::Envelope;
use crate::ids::{ApiId, api_name};
use crate::resource::ArmResource;
use crate::validate::{ValidationError, Validator};

use super::default_true;

/// One revision of an API. The ARM name is `{name};rev={revision}`.
pub struct Api;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    pub name: String,
    pub api_management_name: String,
    pub resource_group_name: String,
    pub revision: String,
    #[serde(default)]
    pub revision_description: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub api_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default = "default_true")]
    pub subscription_required: bool,
    #[serde(default)]
    pub subscription_key_parameter_names: Vec<SubscriptionKeyParameterNames>,
    #[serde(default)]
    pub contact: Vec<Contact>,
    #[serde(default)]
    pub license: Vec<License>,
    #[serde(default)]
    pub terms_of_service_url: Option<String>,
    #[serde(default)]
    pub source_api_id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub version_set_id: Option<String>,
    #[serde(default)]
    pub version_description: Option<String>,
    #[serde(default)]
    pub oauth2_authorization: Vec<OAuth2Authorization>,
    #[serde(default)]
    pub openid_authentication: Vec<OpenIdAuthentication>,
    /// Definition to load the API from. Write-only.
    #[serde(default)]
    pub import: Vec<Import>,
    #[serde(default)]
    pub is_current: Option<bool>,
    #[serde(default)]
    pub is_online: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Import {
    pub content_format: String,
    /// The document itself, or a URL for the `*-link` formats.
    pub content_value: String,
    #[serde(default)]
    pub wsdl_selector: Vec<WsdlSelector>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WsdlSelector {
    pub service_name: String,
    pub endpoint_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionKeyParameterNames {
    pub header: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contact {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct License {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuth2Authorization {
    pub authorization_server_name: String,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenIdAuthentication {
    pub openid_provider_name: String,
    #[serde(default)]
    pub bearer_token_sending_methods: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocols: Option<Vec<String>>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub api_type: Option<String>,
    /// Write-only twin of `type` that import requests need.
    #[serde(default, rename = "apiType", skip_serializing_if = "Option::is_none")]
    pub soap_api_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wsdl_selector: Option<WsdlSelectorContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "serviceUrl", skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_key_parameter_names: Option<KeyParameterNamesContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_revision_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version_set_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<LicenseContract>,
    #[serde(default, rename = "termsOfServiceUrl", skip_serializing_if = "Option::is_none")]
    pub terms_of_service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_api_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_settings: Option<AuthenticationSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_current: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsdlSelectorContract {
    #[serde(default)]
    pub wsdl_service_name: String,
    #[serde(default)]
    pub wsdl_endpoint_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyParameterNamesContract {
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactContract {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LicenseContract {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationSettings {
    #[serde(default, rename = "oAuth2", skip_serializing_if = "Option::is_none")]
    pub oauth2: Option<OAuth2Contract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openid: Option<OpenIdContract>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2Contract {
    #[serde(default)]
    pub authorization_server_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenIdContract {
    #[serde(default)]
    pub openid_provider_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token_sending_methods: Option<Vec<String>>,
}

const PROTOCOLS: &[&str] = &["http", "https", "ws", "wss"];
const API_TYPES: &[&str] = &["graphql", "http", "soap", "websocket"];
const TOKEN_SENDING_METHODS: &[&str] = &["authorizationHeader", "query"];
const CONTENT_FORMATS: &[&str] = &[
    "openapi",
    "openapi+json",
    "openapi+json-link",
    "openapi-link",
    "swagger-json",
    "swagger-link-json",
    "wadl-link-json",
    "wadl-xml",
    "wsdl",
    "wsdl-link",
];

impl Api {
    pub fn api_id(config: &ApiConfig) -> String {
        format!("{};rev={}", config.name, config.revision)
    }

    fn api_type(config: &ApiConfig) -> String {
        config.api_type.clone().unwrap_or_else(|| "http".to_string())
    }
}

/// The `apiType` spelling of an API type; ARM only accepts the ones it knows.
fn soap_api_type(api_type: &str) -> Option<String> {
    API_TYPES
        .contains(&api_type)
        .then(|| api_type.to_string())
}

impl ArmResource for Api {
    type Id = ApiId;
    type Config = ApiConfig;
    type Model = Envelope<ApiProperties>;

    const TYPE_NAME: &'static str = "azurerm_api_management_api";
    const API_VERSION: &'static str = "2022-08-01";
    const FORCE_NEW: &'static [&'static str] = &[
        "name",
        "api_management_name",
        "resource_group_name",
        "revision",
    ];
    const COMPUTED: &'static [&'static str] = &[
        "display_name",
        "path",
        "protocols",
        "api_type",
        "service_url",
        "subscription_key_parameter_names",
        "is_current",
        "is_online",
    ];

    fn validate(config: &ApiConfig) -> Result<(), ValidationError> {
        let mut v = Validator::new(Self::TYPE_NAME);
        v.length_between("name", &config.name, 1, 256)
            .require(
                !config.name.contains([';', '/', '?', '#', '&']),
                "name",
                "must not contain ';', '/', '?', '#' or '&'",
            )
            .service_name("api_management_name", &config.api_management_name)
            .resource_group_name("resource_group_name", &config.resource_group_name)
            .not_empty("revision", &config.revision)
            .opt_not_empty("revision_description", config.revision_description.as_deref())
            .opt_not_empty("display_name", config.display_name.as_deref())
            .opt_not_empty("description", config.description.as_deref())
            .opt_not_empty("version_description", config.version_description.as_deref())
            .require(config.is_current.is_none(), "is_current", "is read-only")
            .require(config.is_online.is_none(), "is_online", "is read-only")
            .conflicts_with(
                "oauth2_authorization",
                !config.oauth2_authorization.is_empty(),
                "openid_authentication",
                !config.openid_authentication.is_empty(),
            );

        if let Some(path) = &config.path {
            v.api_path("path", path);
        }
        for protocol in &config.protocols {
            v.require(
                PROTOCOLS.contains(&protocol.as_str()),
                "protocols",
                "entries must be one of `http`, `https`, `ws`, `wss`",
            );
        }
        if let Some(api_type) = &config.api_type {
            v.require(
                API_TYPES.contains(&api_type.as_str()),
                "api_type",
                "must be one of `graphql`, `http`, `soap`, `websocket`",
            );
        }
        if let Some(url) = &config.service_url {
            v.http_url("service_url", url);
        }
        if let Some(url) = &config.terms_of_service_url {
            v.http_url("terms_of_service_url", url);
        }

        if config.version.is_some() && config.version_set_id.is_none() {
            v.error("version", "setting `version` requires `version_set_id`");
        }
        if config.source_api_id.is_none()
            && (config.display_name.is_none() || config.protocols.is_empty())
        {
            v.error(
                "display_name",
                "`display_name`, `protocols` are required when `source_api_id` is not set",
            );
        }

        for (field, count) in [
            ("subscription_key_parameter_names", config.subscription_key_parameter_names.len()),
            ("contact", config.contact.len()),
            ("license", config.license.len()),
            ("oauth2_authorization", config.oauth2_authorization.len()),
            ("openid_authentication", config.openid_authentication.len()),
        ] {
            v.require(count <= 1, field, "at most one block may be set");
        }

        if let Some(email) = config.contact.first().and_then(|c| c.email.as_deref()) {
            v.email("contact.0.email", email);
        }
        if let Some(names) = config.subscription_key_parameter_names.first() {
            v.not_empty("subscription_key_parameter_names.0.header", &names.header)
                .not_empty("subscription_key_parameter_names.0.query", &names.query);
        }
        v.require(config.import.len() <= 1, "import", "at most one block may be set");
        if let Some(import) = config.import.first() {
            v.require(
                CONTENT_FORMATS.contains(&import.content_format.as_str()),
                "import.0.content_format",
                "must be one of `openapi`, `openapi+json`, `openapi+json-link`, `openapi-link`, `swagger-json`, `swagger-link-json`, `wadl-link-json`, `wadl-xml`, `wsdl`, `wsdl-link`",
            )
            .not_empty("import.0.content_value", &import.content_value)
            .require(
                import.wsdl_selector.len() <= 1,
                "import.0.wsdl_selector",
                "at most one block may be set",
            );
            if let Some(selector) = import.wsdl_selector.first() {
                v.not_empty("import.0.wsdl_selector.0.service_name", &selector.service_name)
                    .not_empty("import.0.wsdl_selector.0.endpoint_name", &selector.endpoint_name);
            }
        }
        if let Some(openid) = config.openid_authentication.first() {
            for method in &openid.bearer_token_sending_methods {
                v.require(
                    TOKEN_SENDING_METHODS.contains(&method.as_str()),
                    "openid_authentication.0.bearer_token_sending_methods",
                    "entries must be one of `authorizationHeader`, `query`",
                );
            }
        }

        v.finish()
    }

    fn id_from_config(subscription_id: &str, config: &ApiConfig) -> ApiId {
        ApiId::new(
            subscription_id,
            &config.resource_group_name,
            &config.api_management_name,
            Self::api_id(config),
        )
    }

    /// Imports run as their own write before the remaining properties are set,
    /// and only when the import block is new or changed.
    fn staged_model(config: &ApiConfig, prior: Option<&ApiConfig>) -> Option<Self::Model> {
        let import = config.import.first()?;
        if prior.is_some_and(|p| p.import == config.import) {
            return None;
        }

        let api_type = Self::api_type(config);
        Some(Envelope::with_properties(ApiProperties {
            soap_api_type: soap_api_type(&api_type),
            api_type: Some(api_type),
            format: Some(import.content_format.clone()),
            value: Some(import.content_value.clone()),
            wsdl_selector: import.wsdl_selector.first().map(|s| WsdlSelectorContract {
                wsdl_service_name: s.service_name.clone(),
                wsdl_endpoint_name: s.endpoint_name.clone(),
            }),
            path: config.path.clone(),
            service_url: config.service_url.clone().filter(|u| !u.is_empty()),
            api_version: config.version.clone().filter(|v| !v.is_empty()),
            api_version_set_id: config.version_set_id.clone().filter(|v| !v.is_empty()),
            ..Default::default()
        }))
    }

    fn expand(config: &ApiConfig) -> Self::Model {
        let api_type = Self::api_type(config);

        let authentication_settings = match (
            config.oauth2_authorization.first(),
            config.openid_authentication.first(),
        ) {
            (Some(oauth2), _) => Some(AuthenticationSettings {
                oauth2: Some(OAuth2Contract {
                    authorization_server_id: oauth2.authorization_server_name.clone(),
                    scope: oauth2.scope.clone(),
                }),
                openid: None,
            }),
            (None, Some(openid)) => Some(AuthenticationSettings {
                oauth2: None,
                openid: Some(OpenIdContract {
                    openid_provider_id: openid.openid_provider_name.clone(),
                    bearer_token_sending_methods: Some(openid.bearer_token_sending_methods.clone()),
                }),
            }),
            (None, None) => None,
        };

        Envelope::with_properties(ApiProperties {
            display_name: config.display_name.clone(),
            path: config.path.clone(),
            protocols: (!config.protocols.is_empty()).then(|| config.protocols.clone()),
            soap_api_type: soap_api_type(&api_type),
            api_type: Some(api_type),
            format: None,
            value: None,
            wsdl_selector: None,
            description: config.description.clone(),
            service_url: config.service_url.clone(),
            subscription_required: Some(config.subscription_required),
            subscription_key_parameter_names: config
                .subscription_key_parameter_names
                .first()
                .map(|n| KeyParameterNamesContract {
                    header: n.header.clone(),
                    query: n.query.clone(),
                }),
            api_revision: None,
            api_revision_description: config.revision_description.clone(),
            api_version: config.version.clone(),
            api_version_set_id: config.version_set_id.clone(),
            api_version_description: config.version_description.clone(),
            contact: config.contact.first().map(|c| ContactContract {
                email: c.email.clone(),
                name: c.name.clone(),
                url: c.url.clone(),
            }),
            license: config.license.first().map(|l| LicenseContract {
                name: l.name.clone(),
                url: l.url.clone(),
            }),
            terms_of_service_url: config.terms_of_service_url.clone(),
            source_api_id: config.source_api_id.clone(),
            authentication_settings,
            is_current: None,
            is_online: None,
        })
    }

    fn flatten(id: &ApiId, model: &Self::Model, prior: Option<&ApiConfig>) -> ApiConfig {
        let props = model.properties.clone().unwrap_or_default();
        let auth = props.authentication_settings.unwrap_or_default();

        ApiConfig {
            name: api_name(&id.api_id).to_string(),
            api_management_name: id.service_name.clone(),
            resource_group_name: id.resource_group_name.clone(),
            revision: props
                .api_revision
                .or_else(|| id.revision().map(str::to_string))
                .unwrap_or_else(|| "1".to_string()),
            revision_description: props.api_revision_description.filter(|d| !d.is_empty()),
            display_name: props.display_name,
            path: props.path,
            protocols: props.protocols.unwrap_or_default(),
            api_type: props.api_type,
            description: props.description.filter(|d| !d.is_empty()),
            service_url: props.service_url,
            subscription_required: props.subscription_required.unwrap_or(true),
            subscription_key_parameter_names: props
                .subscription_key_parameter_names
                .map(|n| SubscriptionKeyParameterNames {
                    header: n.header,
                    query: n.query,
                })
                .into_iter()
                .collect(),
            contact: props
                .contact
                .map(|c| Contact {
                    email: c.email,
                    name: c.name,
                    url: c.url,
                })
                .into_iter()
                .collect(),
            license: props
                .license
                .map(|l| License {
                    name: l.name,
                    url: l.url,
                })
                .into_iter()
                .collect(),
            terms_of_service_url: props.terms_of_service_url,
            // Only meaningful at creation; ARM does not echo it.
            source_api_id: props
                .source_api_id
                .or_else(|| prior.and_then(|p| p.source_api_id.clone())),
            version: props.api_version.filter(|v| !v.is_empty()),
            version_set_id: props.api_version_set_id.filter(|v| !v.is_empty()),
            version_description: props.api_version_description.filter(|d| !d.is_empty()),
            oauth2_authorization: auth
                .oauth2
                .map(|o| OAuth2Authorization {
                    authorization_server_name: o.authorization_server_id,
                    scope: o.scope,
                })
                .into_iter()
                .collect(),
            openid_authentication: auth
                .openid
                .map(|o| OpenIdAuthentication {
                    openid_provider_name: o.openid_provider_id,
                    bearer_token_sending_methods: o.bearer_token_sending_methods.unwrap_or_default(),
                })
                .into_iter()
                .collect(),
            import: prior.map(|p| p.import.clone()).unwrap_or_default(),
            is_current: props.is_current,
            is_online: props.is_online,
        }
    }
}
