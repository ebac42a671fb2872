use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::arm::Envelope;
use crate::ids::OperationId;
use crate::resource::ArmResource;
use crate::validate::{LazyPattern, ValidationError, Validator};

pub struct ApiOperation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiOperationConfig {
    pub operation_id: String,
    pub api_name: String,
    pub api_management_name: String,
    pub resource_group_name: String,
    pub display_name: String,
    pub method: String,
    pub url_template: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub request: Vec<Request>,
    #[serde(default)]
    pub response: Vec<Response>,
    #[serde(default)]
    pub template_parameter: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub header: Vec<Parameter>,
    #[serde(default)]
    pub query_parameter: Vec<Parameter>,
    #[serde(default)]
    pub representation: Vec<Representation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Response {
    pub status_code: u16,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub header: Vec<Parameter>,
    #[serde(default)]
    pub representation: Vec<Representation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Representation {
    pub content_type: String,
    #[serde(default)]
    pub schema_id: Option<String>,
    #[serde(default)]
    pub type_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationProperties {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responses: Option<Vec<ResponseContract>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_parameters: Option<Vec<ParameterContract>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContract {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<ParameterContract>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_parameters: Option<Vec<ParameterContract>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub representations: Option<Vec<RepresentationContract>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseContract {
    #[serde(default)]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<ParameterContract>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub representations: Option<Vec<RepresentationContract>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterContract {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub param_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepresentationContract {
    #[serde(default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

static TEMPLATE_PARAMETER: LazyPattern = LazyPattern::new(r"\{([^{}*]+)\*?\}");

static METHOD: LazyPattern = LazyPattern::new(r"^[A-Za-z]+$");

/// Names of the `{placeholders}` in a URL template.
pub fn template_parameters(url_template: &str) -> BTreeSet<String> {
    let Some(re) = TEMPLATE_PARAMETER.get() else {
        return BTreeSet::new();
    };
    re.captures_iter(url_template)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

fn validate_parameters(v: &mut Validator, field: &str, parameters: &[Parameter]) {
    for (i, parameter) in parameters.iter().enumerate() {
        let prefix = format!("{}.{}", field, i);
        v.not_empty(&format!("{}.name", prefix), &parameter.name)
            .not_empty(&format!("{}.type", prefix), &parameter.param_type);
        if let Some(default) = &parameter.default_value {
            if !parameter.values.is_empty() && !parameter.values.contains(default) {
                v.error(
                    &format!("{}.default_value", prefix),
                    "must be one of `values`",
                );
            }
        }
    }
}

fn validate_representations(v: &mut Validator, field: &str, representations: &[Representation]) {
    for (i, representation) in representations.iter().enumerate() {
        v.not_empty(
            &format!("{}.{}.content_type", field, i),
            &representation.content_type,
        );
        if representation.type_name.is_some() && representation.schema_id.is_none() {
            v.error(
                &format!("{}.{}.type_name", field, i),
                "requires `schema_id`",
            );
        }
    }
}

fn expand_parameters(parameters: &[Parameter]) -> Option<Vec<ParameterContract>> {
    if parameters.is_empty() {
        return None;
    }
    Some(
        parameters
            .iter()
            .map(|p| ParameterContract {
                name: p.name.clone(),
                param_type: p.param_type.clone(),
                required: Some(p.required),
                description: p.description.clone(),
                default_value: p.default_value.clone(),
                values: (!p.values.is_empty()).then(|| p.values.clone()),
            })
            .collect(),
    )
}

fn flatten_parameters(parameters: Option<Vec<ParameterContract>>) -> Vec<Parameter> {
    parameters
        .unwrap_or_default()
        .into_iter()
        .map(|p| Parameter {
            name: p.name,
            param_type: p.param_type,
            required: p.required.unwrap_or(false),
            description: p.description,
            default_value: p.default_value,
            values: p.values.unwrap_or_default(),
        })
        .collect()
}

fn expand_representations(representations: &[Representation]) -> Option<Vec<RepresentationContract>> {
    if representations.is_empty() {
        return None;
    }
    Some(
        representations
            .iter()
            .map(|r| RepresentationContract {
                content_type: r.content_type.clone(),
                schema_id: r.schema_id.clone(),
                type_name: r.type_name.clone(),
            })
            .collect(),
    )
}

fn flatten_representations(representations: Option<Vec<RepresentationContract>>) -> Vec<Representation> {
    representations
        .unwrap_or_default()
        .into_iter()
        .map(|r| Representation {
            content_type: r.content_type,
            schema_id: r.schema_id,
            type_name: r.type_name,
        })
        .collect()
}

impl ArmResource for ApiOperation {
    type Id = OperationId;
    type Config = ApiOperationConfig;
    type Model = Envelope<OperationProperties>;

    const TYPE_NAME: &'static str = "azurerm_api_management_api_operation";
    const API_VERSION: &'static str = "2022-08-01";
    const FORCE_NEW: &'static [&'static str] = &[
        "operation_id",
        "api_name",
        "api_management_name",
        "resource_group_name",
    ];

    fn validate(config: &ApiOperationConfig) -> Result<(), ValidationError> {
        let mut v = Validator::new(Self::TYPE_NAME);
        v.length_between("operation_id", &config.operation_id, 1, 80)
            .not_empty("api_name", &config.api_name)
            .service_name("api_management_name", &config.api_management_name)
            .resource_group_name("resource_group_name", &config.resource_group_name)
            .length_between("display_name", &config.display_name, 1, 300)
            .require(
                METHOD.is_match(&config.method),
                "method",
                "must be an HTTP method token, e.g. GET",
            )
            .length_between("url_template", &config.url_template, 1, 1000)
            .require(config.request.len() <= 1, "request", "at most one block may be set");

        validate_parameters(&mut v, "template_parameter", &config.template_parameter);

        let declared: BTreeSet<&str> = config
            .template_parameter
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        for name in template_parameters(&config.url_template) {
            if !declared.contains(name.as_str()) {
                v.error(
                    "template_parameter",
                    format!("missing a block for URL template parameter `{}`", name),
                );
            }
        }

        if let Some(request) = config.request.first() {
            validate_parameters(&mut v, "request.0.header", &request.header);
            validate_parameters(&mut v, "request.0.query_parameter", &request.query_parameter);
            validate_representations(&mut v, "request.0.representation", &request.representation);
        }

        for (i, response) in config.response.iter().enumerate() {
            v.range(
                &format!("response.{}.status_code", i),
                response.status_code,
                100,
                599,
            );
            validate_parameters(&mut v, &format!("response.{}.header", i), &response.header);
            validate_representations(
                &mut v,
                &format!("response.{}.representation", i),
                &response.representation,
            );
        }

        v.finish()
    }

    fn id_from_config(subscription_id: &str, config: &ApiOperationConfig) -> OperationId {
        OperationId::new(
            subscription_id,
            &config.resource_group_name,
            &config.api_management_name,
            &config.api_name,
            &config.operation_id,
        )
    }

    fn expand(config: &ApiOperationConfig) -> Self::Model {
        Envelope::with_properties(OperationProperties {
            display_name: config.display_name.clone(),
            method: config.method.to_ascii_uppercase(),
            url_template: config.url_template.clone(),
            description: config.description.clone(),
            request: config.request.first().map(|r| RequestContract {
                description: r.description.clone(),
                headers: expand_parameters(&r.header),
                query_parameters: expand_parameters(&r.query_parameter),
                representations: expand_representations(&r.representation),
            }),
            responses: (!config.response.is_empty()).then(|| {
                config
                    .response
                    .iter()
                    .map(|r| ResponseContract {
                        status_code: r.status_code,
                        description: r.description.clone(),
                        headers: expand_parameters(&r.header),
                        representations: expand_representations(&r.representation),
                    })
                    .collect()
            }),
            template_parameters: expand_parameters(&config.template_parameter),
        })
    }

    fn flatten(
        id: &OperationId,
        model: &Self::Model,
        _prior: Option<&ApiOperationConfig>,
    ) -> ApiOperationConfig {
        let props = model.properties.clone().unwrap_or_default();

        // ARM always returns an (often empty) request object.
        let request = props
            .request
            .filter(|r| {
                r.description.is_some()
                    || r.headers.as_ref().is_some_and(|h| !h.is_empty())
                    || r.query_parameters.as_ref().is_some_and(|q| !q.is_empty())
                    || r.representations.as_ref().is_some_and(|rep| !rep.is_empty())
            })
            .map(|r| Request {
                description: r.description,
                header: flatten_parameters(r.headers),
                query_parameter: flatten_parameters(r.query_parameters),
                representation: flatten_representations(r.representations),
            })
            .into_iter()
            .collect();

        ApiOperationConfig {
            operation_id: id.operation_id.clone(),
            api_name: id.api_id.clone(),
            api_management_name: id.service_name.clone(),
            resource_group_name: id.resource_group_name.clone(),
            display_name: props.display_name,
            method: props.method,
            url_template: props.url_template,
            description: props.description.filter(|d| !d.is_empty()),
            request,
            response: props
                .responses
                .unwrap_or_default()
                .into_iter()
                .map(|r| Response {
                    status_code: r.status_code,
                    description: r.description,
                    header: flatten_parameters(r.headers),
                    representation: flatten_representations(r.representations),
                })
                .collect(),
            template_parameter: flatten_parameters(props.template_parameters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ApiOperationConfig {
        serde_json::from_value(json!({
            "operation_id": "get-user",
            "api_name": "users",
            "api_management_name": "svc",
            "resource_group_name": "rg",
            "display_name": "Get user",
            "method": "GET",
            "url_template": "/users/{id}/orders/{orderId}",
            "template_parameter": [
                {"name": "id", "type": "string", "required": true},
                {"name": "orderId", "type": "number", "required": true}
            ],
            "response": [{
                "status_code": 200,
                "representation": [{"content_type": "application/json"}]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_template_parameters_extracted() {
        let names = template_parameters("/users/{id}/files/{path*}?v={version}");
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["id", "path", "version"]);
    }

    #[test]
    fn test_validate_ok() {
        assert!(ApiOperation::validate(&config()).is_ok());
    }

    #[test]
    fn test_missing_template_parameter_rejected() {
        let mut config = config();
        config.template_parameter.pop();
        let err = ApiOperation::validate(&config).unwrap_err();
        assert!(err.has_field("template_parameter"));
        assert!(err.to_string().contains("orderId"));
    }

    #[test]
    fn test_flatten_reverses_expand() {
        let config = config();
        let id = ApiOperation::id_from_config("sub", &config);
        let mut model = ApiOperation::expand(&config);
        if let Some(props) = model.properties.as_mut() {
            props.request = Some(RequestContract::default());
        }
        assert_eq!(ApiOperation::flatten(&id, &model, None), config);
    }

    #[test]
    fn test_response_status_range() {
        let mut config = config();
        config.response[0].status_code = 42;
        let err = ApiOperation::validate(&config).unwrap_err();
        assert!(err.has_field("response.0.status_code"));
    }
}
