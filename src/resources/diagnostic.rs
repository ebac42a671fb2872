//! Service-wide and per-API diagnostics. Both scopes share one payload and
//! one configuration shape; the API scope adds `api_name`.

use serde::{Deserialize, Serialize};

use crate::arm::Envelope;
use crate::ids::{ApiDiagnosticId, DiagnosticId, LoggerId, ResourceId};
use crate::resource::ArmResource;
use crate::validate::{ValidationError, Validator};

pub struct ServiceDiagnostic;
pub struct ApiDiagnostic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiagnosticConfig {
    pub identifier: String,
    pub api_management_name: String,
    pub resource_group_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
    pub api_management_logger_id: String,
    #[serde(default)]
    pub sampling_percentage: Option<f64>,
    #[serde(default)]
    pub always_log_errors: Option<bool>,
    #[serde(default)]
    pub verbosity: Option<String>,
    #[serde(default)]
    pub log_client_ip: Option<bool>,
    #[serde(default)]
    pub http_correlation_protocol: Option<String>,
    #[serde(default = "default_operation_name_format")]
    pub operation_name_format: String,
    #[serde(default)]
    pub frontend_request: Vec<DataMaskingBlock>,
    #[serde(default)]
    pub frontend_response: Vec<DataMaskingBlock>,
    #[serde(default)]
    pub backend_request: Vec<DataMaskingBlock>,
    #[serde(default)]
    pub backend_response: Vec<DataMaskingBlock>,
}

fn default_operation_name_format() -> String {
    "Name".to_string()
}

/// What to capture of a request or response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataMaskingBlock {
    #[serde(default)]
    pub body_bytes: Option<i64>,
    #[serde(default)]
    pub headers_to_log: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticProperties {
    #[serde(default)]
    pub logger_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub always_log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Sampling>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend: Option<PipelineDiagnosticSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<PipelineDiagnosticSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_client_ip: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_correlation_protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name_format: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sampling {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDiagnosticSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<HttpMessageDiagnostic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<HttpMessageDiagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMessageDiagnostic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyDiagnosticSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyDiagnosticSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<i64>,
}

const ALL_ERRORS: &str = "allErrors";
const MAX_BODY_BYTES: i64 = 8192;

const FORCE_NEW: &[&str] = &[
    "identifier",
    "api_management_name",
    "resource_group_name",
    "api_name",
];

const COMPUTED: &[&str] = &[
    "sampling_percentage",
    "always_log_errors",
    "verbosity",
    "log_client_ip",
    "http_correlation_protocol",
];

fn validate_common(v: &mut Validator, config: &DiagnosticConfig) {
    v.require(
        ["applicationinsights", "azuremonitor"].contains(&config.identifier.as_str()),
        "identifier",
        "must be one of `applicationinsights`, `azuremonitor`",
    )
    .service_name("api_management_name", &config.api_management_name)
    .resource_group_name("resource_group_name", &config.resource_group_name);

    if LoggerId::parse_insensitively(&config.api_management_logger_id).is_err() {
        v.error(
            "api_management_logger_id",
            "must be the ID of an API Management logger",
        );
    }

    if let Some(percentage) = config.sampling_percentage {
        v.range("sampling_percentage", percentage, 0.0, 100.0);
    }
    if let Some(verbosity) = &config.verbosity {
        v.require(
            ["verbose", "information", "error"].contains(&verbosity.as_str()),
            "verbosity",
            "must be one of `verbose`, `information`, `error`",
        );
    }
    if let Some(protocol) = &config.http_correlation_protocol {
        v.require(
            ["None", "Legacy", "W3C"].contains(&protocol.as_str()),
            "http_correlation_protocol",
            "must be one of `None`, `Legacy`, `W3C`",
        );
    }
    v.require(
        ["Name", "Url"].contains(&config.operation_name_format.as_str()),
        "operation_name_format",
        "must be one of `Name`, `Url`",
    );

    for (field, blocks) in [
        ("frontend_request", &config.frontend_request),
        ("frontend_response", &config.frontend_response),
        ("backend_request", &config.backend_request),
        ("backend_response", &config.backend_response),
    ] {
        v.require(blocks.len() <= 1, field, "at most one block may be set");
        if let Some(bytes) = blocks.first().and_then(|b| b.body_bytes) {
            v.range(&format!("{}.0.body_bytes", field), bytes, 0, MAX_BODY_BYTES);
        }
    }
}

fn expand_message(blocks: &[DataMaskingBlock]) -> Option<HttpMessageDiagnostic> {
    blocks.first().map(|block| HttpMessageDiagnostic {
        headers: Some(block.headers_to_log.clone()),
        body: block.body_bytes.map(|bytes| BodyDiagnosticSettings { bytes: Some(bytes) }),
    })
}

fn expand_pipeline(
    request: &[DataMaskingBlock],
    response: &[DataMaskingBlock],
) -> Option<PipelineDiagnosticSettings> {
    let request = expand_message(request);
    let response = expand_message(response);
    if request.is_none() && response.is_none() {
        return None;
    }
    Some(PipelineDiagnosticSettings { request, response })
}

fn flatten_message(message: Option<&HttpMessageDiagnostic>) -> Vec<DataMaskingBlock> {
    let Some(message) = message else {
        return Vec::new();
    };
    let body_bytes = message.body.as_ref().and_then(|b| b.bytes).filter(|b| *b > 0);
    let headers_to_log = message.headers.clone().unwrap_or_default();
    if body_bytes.is_none() && headers_to_log.is_empty() {
        return Vec::new();
    }
    vec![DataMaskingBlock {
        body_bytes,
        headers_to_log,
    }]
}

fn expand_properties(config: &DiagnosticConfig) -> Envelope<DiagnosticProperties> {
    Envelope::with_properties(DiagnosticProperties {
        logger_id: config.api_management_logger_id.clone(),
        always_log: config
            .always_log_errors
            .filter(|enabled| *enabled)
            .map(|_| ALL_ERRORS.to_string()),
        sampling: config.sampling_percentage.map(|percentage| Sampling {
            sampling_type: Some("fixed".to_string()),
            percentage: Some(percentage),
        }),
        frontend: expand_pipeline(&config.frontend_request, &config.frontend_response),
        backend: expand_pipeline(&config.backend_request, &config.backend_response),
        log_client_ip: config.log_client_ip,
        http_correlation_protocol: config.http_correlation_protocol.clone(),
        verbosity: config.verbosity.clone(),
        operation_name_format: Some(config.operation_name_format.clone()),
    })
}

fn flatten_properties(
    identifier: &str,
    service_name: &str,
    resource_group_name: &str,
    api_name: Option<String>,
    model: &Envelope<DiagnosticProperties>,
) -> DiagnosticConfig {
    let props = model.properties.clone().unwrap_or_default();

    // ARM hands back the logger ID with inconsistent casing.
    let logger_id = LoggerId::parse_insensitively(&props.logger_id)
        .map(|id| id.id())
        .unwrap_or(props.logger_id);

    let frontend = props.frontend.unwrap_or_default();
    let backend = props.backend.unwrap_or_default();

    DiagnosticConfig {
        identifier: identifier.to_string(),
        api_management_name: service_name.to_string(),
        resource_group_name: resource_group_name.to_string(),
        api_name,
        api_management_logger_id: logger_id,
        sampling_percentage: props.sampling.and_then(|s| s.percentage),
        always_log_errors: Some(
            props
                .always_log
                .is_some_and(|value| value.eq_ignore_ascii_case(ALL_ERRORS)),
        ),
        verbosity: props.verbosity,
        log_client_ip: props.log_client_ip,
        http_correlation_protocol: props.http_correlation_protocol,
        operation_name_format: props
            .operation_name_format
            .unwrap_or_else(default_operation_name_format),
        frontend_request: flatten_message(frontend.request.as_ref()),
        frontend_response: flatten_message(frontend.response.as_ref()),
        backend_request: flatten_message(backend.request.as_ref()),
        backend_response: flatten_message(backend.response.as_ref()),
    }
}

impl ArmResource for ServiceDiagnostic {
    type Id = DiagnosticId;
    type Config = DiagnosticConfig;
    type Model = Envelope<DiagnosticProperties>;

    const TYPE_NAME: &'static str = "azurerm_api_management_diagnostic";
    const API_VERSION: &'static str = "2022-08-01";
    const FORCE_NEW: &'static [&'static str] = FORCE_NEW;
    const COMPUTED: &'static [&'static str] = COMPUTED;

    fn validate(config: &DiagnosticConfig) -> Result<(), ValidationError> {
        let mut v = Validator::new(Self::TYPE_NAME);
        validate_common(&mut v, config);
        v.require(
            config.api_name.is_none(),
            "api_name",
            "is not supported on a service diagnostic; use azurerm_api_management_api_diagnostic",
        );
        v.finish()
    }

    fn id_from_config(subscription_id: &str, config: &DiagnosticConfig) -> DiagnosticId {
        DiagnosticId::new(
            subscription_id,
            &config.resource_group_name,
            &config.api_management_name,
            &config.identifier,
        )
    }

    fn expand(config: &DiagnosticConfig) -> Self::Model {
        expand_properties(config)
    }

    fn flatten(id: &DiagnosticId, model: &Self::Model, _prior: Option<&DiagnosticConfig>) -> DiagnosticConfig {
        flatten_properties(
            &id.diagnostic_id,
            &id.service_name,
            &id.resource_group_name,
            None,
            model,
        )
    }
}

impl ArmResource for ApiDiagnostic {
    type Id = ApiDiagnosticId;
    type Config = DiagnosticConfig;
    type Model = Envelope<DiagnosticProperties>;

    const TYPE_NAME: &'static str = "azurerm_api_management_api_diagnostic";
    const API_VERSION: &'static str = "2022-08-01";
    const FORCE_NEW: &'static [&'static str] = FORCE_NEW;
    const COMPUTED: &'static [&'static str] = COMPUTED;

    fn validate(config: &DiagnosticConfig) -> Result<(), ValidationError> {
        let mut v = Validator::new(Self::TYPE_NAME);
        validate_common(&mut v, config);
        match &config.api_name {
            Some(api_name) => {
                v.not_empty("api_name", api_name);
            }
            None => {
                v.error("api_name", "is required");
            }
        }
        v.finish()
    }

    fn id_from_config(subscription_id: &str, config: &DiagnosticConfig) -> ApiDiagnosticId {
        ApiDiagnosticId::new(
            subscription_id,
            &config.resource_group_name,
            &config.api_management_name,
            config.api_name.as_deref().unwrap_or_default(),
            &config.identifier,
        )
    }

    fn expand(config: &DiagnosticConfig) -> Self::Model {
        expand_properties(config)
    }

    fn flatten(
        id: &ApiDiagnosticId,
        model: &Self::Model,
        _prior: Option<&DiagnosticConfig>,
    ) -> DiagnosticConfig {
        flatten_properties(
            &id.diagnostic_id,
            &id.service_name,
            &id.resource_group_name,
            Some(id.api_id.clone()),
            model,
        )
    }
}
