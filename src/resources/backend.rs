use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::arm::Envelope;
use crate::ids::BackendId;
use crate::resource::ArmResource;
use crate::validate::{ValidationError, Validator};

pub struct Backend;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub name: String,
    pub api_management_name: String,
    pub resource_group_name: String,
    /// Required unless `pool` is set.
    #[serde(default)]
    pub protocol: Option<String>,
    /// Required unless `pool` is set.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub credentials: Vec<Credentials>,
    #[serde(default)]
    pub proxy: Vec<Proxy>,
    #[serde(default)]
    pub tls: Vec<Tls>,
    #[serde(default)]
    pub circuit_breaker_rule: Vec<CircuitBreakerRule>,
    #[serde(default)]
    pub service_fabric_cluster: Vec<ServiceFabricCluster>,
    /// Load-balances across other backends instead of calling a URL.
    #[serde(default)]
    pub pool: Vec<Pool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceFabricCluster {
    #[serde(default)]
    pub client_certificate_id: Option<String>,
    #[serde(default)]
    pub client_certificate_thumbprint: Option<String>,
    pub management_endpoints: Vec<String>,
    pub max_partition_resolution_retries: i64,
    #[serde(default)]
    pub server_certificate_thumbprints: Vec<String>,
    #[serde(default)]
    pub server_x509_name: Vec<ServerX509Name>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerX509Name {
    pub name: String,
    pub issuer_certificate_thumbprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pool {
    pub service: Vec<PoolService>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolService {
    /// Resource ID of a single-type backend in the same service.
    pub id: String,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub weight: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    #[serde(default)]
    pub authorization: Vec<Authorization>,
    #[serde(default)]
    pub certificate: Vec<String>,
    /// Header name to comma-separated values.
    #[serde(default)]
    pub header: BTreeMap<String, String>,
    /// Query parameter name to comma-separated values.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Authorization {
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default)]
    pub scheme: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Proxy {
    pub url: String,
    pub username: String,
    /// Write-only.
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tls {
    #[serde(default)]
    pub validate_certificate_chain: Option<bool>,
    #[serde(default)]
    pub validate_certificate_name: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerRule {
    pub name: String,
    pub trip_duration: String,
    #[serde(default)]
    pub accept_retry_after: bool,
    pub failure_condition: Vec<FailureCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailureCondition {
    pub interval_duration: String,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub percentage: Option<i64>,
    #[serde(default)]
    pub error_reasons: Vec<String>,
    #[serde(default)]
    pub status_code_range: Vec<StatusCodeRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusCodeRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendProperties {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub backend_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialsContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BackendExtras>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendExtras {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_fabric_cluster: Option<ServiceFabricClusterContract>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceFabricClusterContract {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_id: Option<String>,
    #[serde(default, rename = "clientCertificatethumbprint", skip_serializing_if = "Option::is_none")]
    pub client_certificate_thumbprint: Option<String>,
    #[serde(default)]
    pub management_endpoints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_partition_resolution_retries: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_certificate_thumbprints: Option<Vec<String>>,
    #[serde(default, rename = "serverX509Names", skip_serializing_if = "Option::is_none")]
    pub server_x509_names: Option<Vec<X509NameContract>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct X509NameContract {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub issuer_certificate_thumbprint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolContract {
    #[serde(default)]
    pub services: Vec<PoolItemContract>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolItemContract {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsContract {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<AuthorizationContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationContract {
    #[serde(default)]
    pub parameter: String,
    #[serde(default)]
    pub scheme: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyContract {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsContract {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate_certificate_chain: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate_certificate_name: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerContract {
    #[serde(default)]
    pub rules: Vec<CircuitBreakerRuleContract>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerRuleContract {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub trip_duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_retry_after: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_condition: Option<FailureConditionContract>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureConditionContract {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<i64>,
    #[serde(default)]
    pub interval: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reasons: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code_ranges: Option<Vec<StatusCodeRange>>,
}

const SINGLE: &str = "Single";
const POOL: &str = "Pool";
const MAX_POOL_SERVICES: usize = 30;

impl ArmResource for Backend {
    type Id = BackendId;
    type Config = BackendConfig;
    type Model = Envelope<BackendProperties>;

    const TYPE_NAME: &'static str = "azurerm_api_management_backend";
    const API_VERSION: &'static str = "2024-05-01";
    const FORCE_NEW: &'static [&'static str] =
        &["name", "api_management_name", "resource_group_name"];

    fn validate(config: &BackendConfig) -> Result<(), ValidationError> {
        let mut v = Validator::new(Self::TYPE_NAME);
        v.length_between("name", &config.name, 1, 80)
            .service_name("api_management_name", &config.api_management_name)
            .resource_group_name("resource_group_name", &config.resource_group_name)
            .opt_not_empty("resource_id", config.resource_id.as_deref());

        for (field, count) in [
            ("credentials", config.credentials.len()),
            ("proxy", config.proxy.len()),
            ("tls", config.tls.len()),
            ("circuit_breaker_rule", config.circuit_breaker_rule.len()),
            ("service_fabric_cluster", config.service_fabric_cluster.len()),
            ("pool", config.pool.len()),
        ] {
            v.require(count <= 1, field, "at most one block may be set");
        }

        if let Some(pool) = config.pool.first() {
            validate_pool(&mut v, config, pool);
        } else {
            match &config.protocol {
                Some(protocol) => {
                    v.require(
                        ["http", "soap"].contains(&protocol.as_str()),
                        "protocol",
                        "must be one of `http`, `soap`",
                    );
                }
                None => {
                    v.error("protocol", "is required unless `pool` is set");
                }
            }
            match &config.url {
                Some(url) => {
                    v.length_between("url", url, 1, 2000);
                }
                None => {
                    v.error("url", "is required unless `pool` is set");
                }
            }
        }
        if let Some(cluster) = config.service_fabric_cluster.first() {
            validate_service_fabric_cluster(&mut v, cluster);
        }

        if let Some(description) = &config.description {
            v.length_between("description", description, 1, 2000);
        }
        if let Some(title) = &config.title {
            v.length_between("title", title, 1, 300);
        }
        if let Some(proxy) = config.proxy.first() {
            v.http_url("proxy.0.url", &proxy.url)
                .not_empty("proxy.0.username", &proxy.username);
        }
        if let Some(credentials) = config.credentials.first() {
            v.require(
                credentials.authorization.len() <= 1,
                "credentials.0.authorization",
                "at most one block may be set",
            );
        }

        if let Some(rule) = config.circuit_breaker_rule.first() {
            v.not_empty("circuit_breaker_rule.0.name", &rule.name)
                .iso8601_duration("circuit_breaker_rule.0.trip_duration", &rule.trip_duration)
                .require(
                    rule.failure_condition.len() == 1,
                    "circuit_breaker_rule.0.failure_condition",
                    "exactly one block must be set",
                );
            if let Some(condition) = rule.failure_condition.first() {
                let prefix = "circuit_breaker_rule.0.failure_condition.0";
                let count_field = format!("{}.count", prefix);
                let percentage_field = format!("{}.percentage", prefix);
                v.iso8601_duration(&format!("{}.interval_duration", prefix), &condition.interval_duration)
                    .exactly_one_of(&[
                        (count_field.as_str(), condition.count.is_some()),
                        (percentage_field.as_str(), condition.percentage.is_some()),
                    ]);
                if let Some(count) = condition.count {
                    v.range(&count_field, count, 1, 10_000);
                }
                if let Some(percentage) = condition.percentage {
                    v.range(&percentage_field, percentage, 1, 100);
                }
                for (i, range) in condition.status_code_range.iter().enumerate() {
                    let field = format!("{}.status_code_range.{}", prefix, i);
                    v.range(&format!("{}.min", field), range.min, 200, 599)
                        .range(&format!("{}.max", field), range.max, 200, 599)
                        .require(range.min <= range.max, &field, "`min` must not exceed `max`");
                }
            }
        }

        v.finish()
    }

    fn id_from_config(subscription_id: &str, config: &BackendConfig) -> BackendId {
        BackendId::new(
            subscription_id,
            &config.resource_group_name,
            &config.api_management_name,
            &config.name,
        )
    }

    fn expand(config: &BackendConfig) -> Self::Model {
        // Pool backends only carry their members and descriptive fields.
        if let Some(pool) = config.pool.first() {
            return Envelope::with_properties(BackendProperties {
                backend_type: Some(POOL.to_string()),
                description: config.description.clone(),
                title: config.title.clone(),
                pool: Some(PoolContract {
                    services: pool
                        .service
                        .iter()
                        .map(|s| PoolItemContract {
                            id: s.id.clone(),
                            priority: s.priority,
                            weight: s.weight,
                        })
                        .collect(),
                }),
                ..Default::default()
            });
        }

        Envelope::with_properties(BackendProperties {
            backend_type: Some(SINGLE.to_string()),
            protocol: config.protocol.clone(),
            url: config.url.clone(),
            description: config.description.clone(),
            title: config.title.clone(),
            resource_id: config.resource_id.clone(),
            credentials: config.credentials.first().map(expand_credentials),
            proxy: config.proxy.first().map(|p| ProxyContract {
                url: p.url.clone(),
                username: Some(p.username.clone()),
                password: p.password.clone(),
            }),
            tls: config.tls.first().map(|t| TlsContract {
                validate_certificate_chain: t.validate_certificate_chain,
                validate_certificate_name: t.validate_certificate_name,
            }),
            circuit_breaker: config
                .circuit_breaker_rule
                .first()
                .map(|rule| CircuitBreakerContract {
                    rules: vec![expand_circuit_breaker_rule(rule)],
                }),
            pool: None,
            properties: config
                .service_fabric_cluster
                .first()
                .map(|cluster| BackendExtras {
                    service_fabric_cluster: Some(expand_service_fabric_cluster(cluster)),
                }),
        })
    }

    fn flatten(id: &BackendId, model: &Self::Model, prior: Option<&BackendConfig>) -> BackendConfig {
        let props = model.properties.clone().unwrap_or_default();
        let prior_password = prior
            .and_then(|p| p.proxy.first())
            .and_then(|p| p.password.clone());

        BackendConfig {
            name: id.backend_id.clone(),
            api_management_name: id.service_name.clone(),
            resource_group_name: id.resource_group_name.clone(),
            protocol: props.protocol.filter(|p| !p.is_empty()),
            url: props.url.filter(|u| !u.is_empty()),
            description: props.description,
            title: props.title,
            resource_id: props.resource_id,
            credentials: props.credentials.map(flatten_credentials).into_iter().collect(),
            proxy: props
                .proxy
                .map(|p| Proxy {
                    url: p.url,
                    username: p.username.unwrap_or_default(),
                    password: p.password.or(prior_password),
                })
                .into_iter()
                .collect(),
            tls: props
                .tls
                .map(|t| Tls {
                    validate_certificate_chain: t.validate_certificate_chain,
                    validate_certificate_name: t.validate_certificate_name,
                })
                .into_iter()
                .collect(),
            circuit_breaker_rule: props
                .circuit_breaker
                .map(|cb| cb.rules)
                .unwrap_or_default()
                .into_iter()
                .take(1)
                .map(flatten_circuit_breaker_rule)
                .collect(),
            service_fabric_cluster: props
                .properties
                .and_then(|extras| extras.service_fabric_cluster)
                .map(flatten_service_fabric_cluster)
                .into_iter()
                .collect(),
            pool: props
                .pool
                .map(|pool| Pool {
                    service: pool
                        .services
                        .into_iter()
                        .map(|s| PoolService {
                            id: s.id,
                            priority: s.priority,
                            weight: s.weight,
                        })
                        .collect(),
                })
                .into_iter()
                .collect(),
        }
    }
}

fn validate_pool(v: &mut Validator, config: &BackendConfig, pool: &Pool) {
    for (field, set) in [
        ("protocol", config.protocol.is_some()),
        ("url", config.url.is_some()),
        ("resource_id", config.resource_id.is_some()),
        ("credentials", !config.credentials.is_empty()),
        ("proxy", !config.proxy.is_empty()),
        ("tls", !config.tls.is_empty()),
        ("circuit_breaker_rule", !config.circuit_breaker_rule.is_empty()),
        ("service_fabric_cluster", !config.service_fabric_cluster.is_empty()),
    ] {
        v.conflicts_with(field, set, "pool", true);
    }

    v.require(
        (1..=MAX_POOL_SERVICES).contains(&pool.service.len()),
        "pool.0.service",
        "between 1 and 30 services must be set",
    );
    for (i, service) in pool.service.iter().enumerate() {
        let field = |name: &str| format!("pool.0.service.{i}.{name}");
        v.require(
            service.id.contains("/providers/Microsoft.ApiManagement/service/")
                && service.id.contains("/backends/"),
            &field("id"),
            "must be the resource ID of an API Management backend",
        );
        if let Some(priority) = service.priority {
            v.range(&field("priority"), priority, 1, i64::MAX);
        }
        if let Some(weight) = service.weight {
            v.range(&field("weight"), weight, 1, i64::MAX);
        }
    }
}

fn validate_service_fabric_cluster(v: &mut Validator, cluster: &ServiceFabricCluster) {
    let prefix = "service_fabric_cluster.0";
    v.require(
        cluster.client_certificate_id.is_some() || cluster.client_certificate_thumbprint.is_some(),
        &format!("{prefix}.client_certificate_thumbprint"),
        "at least one of `client_certificate_thumbprint`, `client_certificate_id` must be set",
    )
    .require(
        !cluster.management_endpoints.is_empty(),
        &format!("{prefix}.management_endpoints"),
        "at least one endpoint is required",
    )
    .exactly_one_of(&[
        (
            "service_fabric_cluster.0.server_certificate_thumbprints",
            !cluster.server_certificate_thumbprints.is_empty(),
        ),
        (
            "service_fabric_cluster.0.server_x509_name",
            !cluster.server_x509_name.is_empty(),
        ),
    ]);
    if let Some(id) = &cluster.client_certificate_id {
        v.require(
            id.contains("/certificates/"),
            &format!("{prefix}.client_certificate_id"),
            "must be the resource ID of an API Management certificate",
        );
    }
    for (i, endpoint) in cluster.management_endpoints.iter().enumerate() {
        v.not_empty(&format!("{prefix}.management_endpoints.{i}"), endpoint);
    }
    for (i, name) in cluster.server_x509_name.iter().enumerate() {
        v.not_empty(&format!("{prefix}.server_x509_name.{i}.name"), &name.name)
            .not_empty(
                &format!("{prefix}.server_x509_name.{i}.issuer_certificate_thumbprint"),
                &name.issuer_certificate_thumbprint,
            );
    }
}

fn expand_service_fabric_cluster(cluster: &ServiceFabricCluster) -> ServiceFabricClusterContract {
    ServiceFabricClusterContract {
        client_certificate_id: cluster.client_certificate_id.clone(),
        client_certificate_thumbprint: cluster.client_certificate_thumbprint.clone(),
        management_endpoints: cluster.management_endpoints.clone(),
        max_partition_resolution_retries: Some(cluster.max_partition_resolution_retries),
        server_certificate_thumbprints: (!cluster.server_certificate_thumbprints.is_empty())
            .then(|| cluster.server_certificate_thumbprints.clone()),
        server_x509_names: (!cluster.server_x509_name.is_empty()).then(|| {
            cluster
                .server_x509_name
                .iter()
                .map(|n| X509NameContract {
                    name: n.name.clone(),
                    issuer_certificate_thumbprint: n.issuer_certificate_thumbprint.clone(),
                })
                .collect()
        }),
    }
}

fn flatten_service_fabric_cluster(contract: ServiceFabricClusterContract) -> ServiceFabricCluster {
    ServiceFabricCluster {
        client_certificate_id: contract.client_certificate_id.filter(|id| !id.is_empty()),
        client_certificate_thumbprint: contract
            .client_certificate_thumbprint
            .filter(|t| !t.is_empty()),
        management_endpoints: contract.management_endpoints,
        max_partition_resolution_retries: contract.max_partition_resolution_retries.unwrap_or(0),
        server_certificate_thumbprints: contract.server_certificate_thumbprints.unwrap_or_default(),
        server_x509_name: contract
            .server_x509_names
            .unwrap_or_default()
            .into_iter()
            .map(|n| ServerX509Name {
                name: n.name,
                issuer_certificate_thumbprint: n.issuer_certificate_thumbprint,
            })
            .collect(),
    }
}

fn split_values(input: &BTreeMap<String, String>) -> Option<BTreeMap<String, Vec<String>>> {
    if input.is_empty() {
        return None;
    }
    Some(
        input
            .iter()
            .map(|(k, v)| (k.clone(), v.split(',').map(str::to_string).collect()))
            .collect(),
    )
}

fn join_values(input: Option<BTreeMap<String, Vec<String>>>) -> BTreeMap<String, String> {
    input
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, v.join(",")))
        .collect()
}

fn expand_credentials(credentials: &Credentials) -> CredentialsContract {
    CredentialsContract {
        authorization: credentials
            .authorization
            .first()
            .map(|a| AuthorizationContract {
                parameter: a.parameter.clone().unwrap_or_default(),
                scheme: a.scheme.clone().unwrap_or_default(),
            }),
        certificate: (!credentials.certificate.is_empty()).then(|| credentials.certificate.clone()),
        header: split_values(&credentials.header),
        query: split_values(&credentials.query),
    }
}

fn flatten_credentials(contract: CredentialsContract) -> Credentials {
    Credentials {
        authorization: contract
            .authorization
            .map(|a| Authorization {
                parameter: Some(a.parameter).filter(|p| !p.is_empty()),
                scheme: Some(a.scheme).filter(|s| !s.is_empty()),
            })
            .into_iter()
            .collect(),
        certificate: contract.certificate.unwrap_or_default(),
        header: join_values(contract.header),
        query: join_values(contract.query),
    }
}

fn expand_circuit_breaker_rule(rule: &CircuitBreakerRule) -> CircuitBreakerRuleContract {
    CircuitBreakerRuleContract {
        name: rule.name.clone(),
        trip_duration: rule.trip_duration.clone(),
        accept_retry_after: Some(rule.accept_retry_after),
        failure_condition: rule.failure_condition.first().map(|c| FailureConditionContract {
            count: c.count,
            percentage: c.percentage,
            interval: c.interval_duration.clone(),
            error_reasons: (!c.error_reasons.is_empty()).then(|| c.error_reasons.clone()),
            status_code_ranges: (!c.status_code_range.is_empty())
                .then(|| c.status_code_range.clone()),
        }),
    }
}

fn flatten_circuit_breaker_rule(rule: CircuitBreakerRuleContract) -> CircuitBreakerRule {
    CircuitBreakerRule {
        name: rule.name,
        trip_duration: rule.trip_duration,
        accept_retry_after: rule.accept_retry_after.unwrap_or(false),
        failure_condition: rule
            .failure_condition
            .map(|c| FailureCondition {
                interval_duration: c.interval,
                count: c.count,
                percentage: c.percentage,
                error_reasons: c.error_reasons.unwrap_or_default(),
                status_code_range: c.status_code_ranges.unwrap_or_default(),
            })
            .into_iter()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> BackendConfig {
        serde_json::from_value(json!({
            "name": "orders",
            "api_management_name": "svc",
            "resource_group_name": "rg",
            "protocol": "http",
            "url": "https://orders.internal.example.com",
            "credentials": [{
                "authorization": [{"scheme": "Bearer", "parameter": "abc"}],
                "header": {"x-env": "prod,blue"}
            }],
            "proxy": [{"url": "http://proxy:8080", "username": "svc", "password": "hunter2"}],
            "circuit_breaker_rule": [{
                "name": "trip-on-5xx",
                "trip_duration": "PT1M",
                "accept_retry_after": true,
                "failure_condition": [{
                    "interval_duration": "PT30S",
                    "count": 5,
                    "status_code_range": [{"min": 500, "max": 599}]
                }]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_validate_ok() {
        assert!(Backend::validate(&config()).is_ok());
    }

    #[test]
    fn test_expand_splits_header_values() {
        let json = serde_json::to_value(Backend::expand(&config())).unwrap();
        assert_eq!(json["properties"]["type"], "Single");
        assert_eq!(
            json["properties"]["credentials"]["header"],
            json!({"x-env": ["prod", "blue"]})
        );
        assert_eq!(
            json["properties"]["circuitBreaker"]["rules"][0]["failureCondition"],
            json!({"count": 5, "interval": "PT30S", "statusCodeRanges": [{"min": 500, "max": 599}]})
        );
    }

    #[test]
    fn test_flatten_reverses_expand_and_keeps_password() {
        let config = config();
        let id = Backend::id_from_config("sub", &config);
        let mut model = Backend::expand(&config);
        if let Some(proxy) = model.properties.as_mut().and_then(|p| p.proxy.as_mut()) {
            proxy.password = None;
        }
        assert_eq!(Backend::flatten(&id, &model, Some(&config)), config);
    }

    #[test]
    fn test_validate_failure_condition() {
        let mut config = config();
        let condition = &mut config.circuit_breaker_rule[0].failure_condition[0];
        condition.percentage = Some(50);
        condition.status_code_range[0].min = 600;

        let err = Backend::validate(&config).unwrap_err();
        assert!(err.has_field("circuit_breaker_rule.0.failure_condition.0.count"));
        assert!(err.has_field("circuit_breaker_rule.0.failure_condition.0.status_code_range.0.min"));
    }

    #[test]
    fn test_validate_protocol() {
        let mut config = config();
        config.protocol = Some("grpc".to_string());
        assert!(Backend::validate(&config).unwrap_err().has_field("protocol"));
    }

    fn member(name: &str) -> String {
        format!(
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.ApiManagement/service/svc/backends/{}",
            name
        )
    }

    fn pool_config() -> BackendConfig {
        serde_json::from_value(json!({
            "name": "orders-pool",
            "api_management_name": "svc",
            "resource_group_name": "rg",
            "description": "orders in two regions",
            "pool": [{"service": [
                {"id": member("orders-east"), "priority": 1, "weight": 3},
                {"id": member("orders-west"), "priority": 2}
            ]}]
        }))
        .unwrap()
    }

    #[test]
    fn test_pool_backend_sends_only_members() {
        let config = pool_config();
        assert!(Backend::validate(&config).is_ok());

        let json = serde_json::to_value(Backend::expand(&config)).unwrap();
        assert_eq!(json["properties"]["type"], "Pool");
        assert!(json["properties"].get("url").is_none());
        assert!(json["properties"].get("protocol").is_none());
        assert_eq!(
            json["properties"]["pool"]["services"][1],
            json!({"id": member("orders-west"), "priority": 2})
        );

        let id = Backend::id_from_config("sub", &config);
        let model: Envelope<BackendProperties> = serde_json::from_value(json).unwrap();
        assert_eq!(Backend::flatten(&id, &model, None), config);
    }

    #[test]
    fn test_pool_conflicts_with_single_fields() {
        let mut config = pool_config();
        config.url = Some("https://orders.example.com".to_string());
        config.tls = vec![Tls {
            validate_certificate_chain: Some(true),
            validate_certificate_name: None,
        }];
        config.pool[0].service[0].id = "orders-east".to_string();
        config.pool[0].service[1].weight = Some(0);
        let err = Backend::validate(&config).unwrap_err();
        assert!(err.has_field("url"));
        assert!(err.has_field("tls"));
        assert!(err.has_field("pool.0.service.0.id"));
        assert!(err.has_field("pool.0.service.1.weight"));

        config.pool[0].service.clear();
        assert!(Backend::validate(&config).unwrap_err().has_field("pool.0.service"));
    }

    #[test]
    fn test_single_backend_requires_url_and_protocol() {
        let mut config = config();
        config.url = None;
        config.protocol = None;
        let err = Backend::validate(&config).unwrap_err();
        assert!(err.has_field("url"));
        assert!(err.has_field("protocol"));
    }

    #[test]
    fn test_service_fabric_cluster() {
        let mut config = config();
        config.service_fabric_cluster = vec![ServiceFabricCluster {
            client_certificate_id: None,
            client_certificate_thumbprint: Some("AB12".to_string()),
            management_endpoints: vec!["https://cluster.westeurope.cloudapp.azure.com:19080".to_string()],
            max_partition_resolution_retries: 5,
            server_certificate_thumbprints: Vec::new(),
            server_x509_name: vec![ServerX509Name {
                name: "cluster.contoso.com".to_string(),
                issuer_certificate_thumbprint: "CD34".to_string(),
            }],
        }];
        assert!(Backend::validate(&config).is_ok());

        let json = serde_json::to_value(Backend::expand(&config)).unwrap();
        let cluster = &json["properties"]["properties"]["serviceFabricCluster"];
        assert_eq!(cluster["clientCertificatethumbprint"], "AB12");
        assert_eq!(cluster["maxPartitionResolutionRetries"], 5);
        assert_eq!(
            cluster["serverX509Names"],
            json!([{"name": "cluster.contoso.com", "issuerCertificateThumbprint": "CD34"}])
        );

        let id = Backend::id_from_config("sub", &config);
        let model = Backend::expand(&config);
        assert_eq!(Backend::flatten(&id, &model, Some(&config)), config);

        let cluster = &mut config.service_fabric_cluster[0];
        cluster.client_certificate_thumbprint = None;
        cluster.server_certificate_thumbprints = vec!["EF56".to_string()];
        let err = Backend::validate(&config).unwrap_err();
        assert!(err.has_field("service_fabric_cluster.0.client_certificate_thumbprint"));
        assert!(err.has_field("service_fabric_cluster.0.server_certificate_thumbprints"));
    }
}
