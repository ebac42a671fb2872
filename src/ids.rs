//! Hierarchical ARM resource identifiers for API Management entities.
//!
//! Every ID type is a flat struct of its user-supplied segments. The static
//! segments live in the type's template, so `parse(x.id()) == x` holds for
//! every value and `parse(s).id() == s` for every canonical string.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const PROVIDER_NAMESPACE: &str = "Microsoft.ApiManagement";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("parsing {kind} ID {input:?}: ID must start with '/'")]
    MissingLeadingSlash { kind: &'static str, input: String },

    #[error("parsing {kind} ID {input:?}: expected {expected} segments, got {actual} (format: {format})")]
    SegmentCount {
        kind: &'static str,
        input: String,
        expected: usize,
        actual: usize,
        format: String,
    },

    #[error("parsing {kind} ID {input:?}: expected segment {expected:?} at position {position}, got {actual:?}")]
    UnexpectedSegment {
        kind: &'static str,
        input: String,
        position: usize,
        expected: String,
        actual: String,
    },

    #[error("parsing {kind} ID {input:?}: segment {name} is empty")]
    EmptySegment {
        kind: &'static str,
        input: String,
        name: &'static str,
    },
}

/// One position in an ID template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Static(&'static str),
    User(&'static str),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Static(s) => write!(f, "{}", s),
            Segment::User(name) => write!(f, "{{{}}}", name),
        }
    }
}

pub fn format_template(template: &[Segment]) -> String {
    template.iter().fold(String::new(), |mut acc, segment| {
        acc.push('/');
        acc.push_str(&segment.to_string());
        acc
    })
}

/// Splits `input` against `template`, returning the user segment values in order.
pub fn parse_segments(
    kind: &'static str,
    template: &[Segment],
    input: &str,
    insensitive: bool,
) -> Result<Vec<String>, IdError> {
    let trimmed = input
        .strip_prefix('/')
        .ok_or_else(|| IdError::MissingLeadingSlash {
            kind,
            input: input.to_string(),
        })?;

    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.len() != template.len() {
        return Err(IdError::SegmentCount {
            kind,
            input: input.to_string(),
            expected: template.len(),
            actual: parts.len(),
            format: format_template(template),
        });
    }

    let mut values = Vec::new();
    for (position, (segment, part)) in template.iter().zip(parts).enumerate() {
        match segment {
            Segment::Static(expected) => {
                let matches = if insensitive {
                    expected.eq_ignore_ascii_case(part)
                } else {
                    *expected == part
                };
                if !matches {
                    return Err(IdError::UnexpectedSegment {
                        kind,
                        input: input.to_string(),
                        position,
                        expected: expected.to_string(),
                        actual: part.to_string(),
                    });
                }
            }
            Segment::User(name) => {
                if part.is_empty() {
                    return Err(IdError::EmptySegment {
                        kind,
                        input: input.to_string(),
                        name,
                    });
                }
                values.push(part.to_string());
            }
        }
    }

    Ok(values)
}

/// Builds a template from `(static path, user segment)` pairs plus trailing statics.
/// Static paths may contain several `/`-separated segments.
pub fn build_template(
    pairs: &[(&'static str, &'static str)],
    tail: &[&'static str],
) -> Vec<Segment> {
    let mut template = Vec::new();
    for (statics, user) in pairs {
        template.extend(statics.split('/').map(Segment::Static));
        template.push(Segment::User(user));
    }
    template.extend(tail.iter().copied().map(Segment::Static));
    template
}

pub trait ResourceId:
    Sized + Clone + fmt::Debug + fmt::Display + PartialEq + Send + Sync + 'static
{
    /// Human-readable kind used in error messages and logs.
    const KIND: &'static str;

    fn template() -> Vec<Segment>;

    fn from_values(values: Vec<String>) -> Self;

    fn values(&self) -> Vec<&str>;

    /// Exact-case parse.
    fn parse(input: &str) -> Result<Self, IdError> {
        parse_segments(Self::KIND, &Self::template(), input, false).map(Self::from_values)
    }

    /// Parse ignoring the casing of static segments; the result serializes canonically.
    fn parse_insensitively(input: &str) -> Result<Self, IdError> {
        parse_segments(Self::KIND, &Self::template(), input, true).map(Self::from_values)
    }

    fn id(&self) -> String {
        let values = self.values();
        let mut values = values.iter();
        let mut out = String::new();
        for segment in Self::template() {
            out.push('/');
            match segment {
                Segment::Static(s) => out.push_str(s),
                Segment::User(_) => out.push_str(values.next().copied().unwrap_or_default()),
            }
        }
        out
    }

    /// Named user segments, in hierarchy order.
    fn segments(&self) -> Vec<(&'static str, String)> {
        Self::template()
            .into_iter()
            .filter_map(|segment| match segment {
                Segment::User(name) => Some(name),
                Segment::Static(_) => None,
            })
            .zip(self.values().into_iter().map(str::to_string))
            .collect()
    }
}

macro_rules! resource_id {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal,
        [$($statics:literal => $field:ident),+ $(,)?]
        $(, tail = [$($tail:literal),* $(,)?])?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            $(pub $field: String,)+
        }

        impl $name {
            pub fn new($($field: impl Into<String>),+) -> Self {
                Self {
                    $($field: $field.into(),)+
                }
            }
        }

        impl ResourceId for $name {
            const KIND: &'static str = $kind;

            fn template() -> Vec<Segment> {
                build_template(
                    &[$(($statics, stringify!($field))),+],
                    &[$($($tail),*)?],
                )
            }

            fn from_values(values: Vec<String>) -> Self {
                let mut values = values.into_iter();
                Self {
                    $($field: values.next().unwrap_or_default(),)+
                }
            }

            fn values(&self) -> Vec<&str> {
                vec![$(self.$field.as_str()),+]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} ({})", $kind, self.id())
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

resource_id!(
    /// `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.ApiManagement/service/{service}`
    ServiceId, "API Management Service",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
    ]
);

resource_id!(
    /// The API segment may carry a revision suffix, e.g. `echo;rev=2`.
    ApiId, "API",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "apis" => api_id,
    ]
);

resource_id!(
    OperationId, "API Operation",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "apis" => api_id,
        "operations" => operation_id,
    ]
);

resource_id!(
    ServicePolicyId, "Service Policy",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
    ],
    tail = ["policies", "policy"]
);

resource_id!(
    ApiPolicyId, "API Policy",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "apis" => api_id,
    ],
    tail = ["policies", "policy"]
);

resource_id!(
    OperationPolicyId, "API Operation Policy",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "apis" => api_id,
        "operations" => operation_id,
    ],
    tail = ["policies", "policy"]
);

resource_id!(
    LoggerId, "Logger",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "loggers" => logger_id,
    ]
);

resource_id!(
    DiagnosticId, "Diagnostic",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "diagnostics" => diagnostic_id,
    ]
);

resource_id!(
    ApiDiagnosticId, "API Diagnostic",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "apis" => api_id,
        "diagnostics" => diagnostic_id,
    ]
);

resource_id!(
    GatewayId, "Gateway",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "gateways" => gateway_id,
    ]
);

resource_id!(
    HostnameConfigurationId, "Gateway Hostname Configuration",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "gateways" => gateway_id,
        "hostnameConfigurations" => hostname_configuration_id,
    ]
);

resource_id!(
    WorkspaceId, "Workspace",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "workspaces" => workspace_id,
    ]
);

resource_id!(
    /// An APIM subscription (API key holder), not an Azure subscription.
    ApimSubscriptionId, "Subscription",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "subscriptions" => sid,
    ]
);

resource_id!(
    BackendId, "Backend",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "backends" => backend_id,
    ]
);

resource_id!(
    NamedValueId, "Named Value",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "namedValues" => named_value_id,
    ]
);

resource_id!(
    ProductId, "Product",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "products" => product_id,
    ]
);

resource_id!(
    UserId, "User",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "users" => user_id,
    ]
);

resource_id!(
    CertificateId, "Certificate",
    [
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group_name,
        "providers/Microsoft.ApiManagement/service" => service_name,
        "certificates" => certificate_id,
    ]
);

impl ServiceId {
    pub fn provider_namespace(&self) -> &'static str {
        PROVIDER_NAMESPACE
    }
}

impl ApiId {
    pub fn service_id(&self) -> ServiceId {
        ServiceId::new(
            &self.subscription_id,
            &self.resource_group_name,
            &self.service_name,
        )
    }

    /// The API name without any `;rev=` suffix.
    pub fn api_name(&self) -> &str {
        api_name(&self.api_id)
    }

    pub fn revision(&self) -> Option<&str> {
        self.api_id
            .split_once(";rev=")
            .map(|(_, revision)| revision)
    }
}

impl OperationId {
    pub fn api(&self) -> ApiId {
        ApiId::new(
            &self.subscription_id,
            &self.resource_group_name,
            &self.service_name,
            &self.api_id,
        )
    }
}

impl ApiPolicyId {
    pub fn api(&self) -> ApiId {
        ApiId::new(
            &self.subscription_id,
            &self.resource_group_name,
            &self.service_name,
            &self.api_id,
        )
    }
}

impl OperationPolicyId {
    pub fn operation(&self) -> OperationId {
        OperationId::new(
            &self.subscription_id,
            &self.resource_group_name,
            &self.service_name,
            &self.api_id,
            &self.operation_id,
        )
    }
}

impl HostnameConfigurationId {
    pub fn gateway(&self) -> GatewayId {
        GatewayId::new(
            &self.subscription_id,
            &self.resource_group_name,
            &self.service_name,
            &self.gateway_id,
        )
    }
}

/// Strips a `;rev=N` suffix from an API identifier.
pub fn api_name(api_id: &str) -> &str {
    api_id.split(';').next().unwrap_or(api_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE: &str =
        "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg1/providers/Microsoft.ApiManagement/service/svc1";

    #[test]
    fn test_service_id_roundtrip() {
        let id = ServiceId::parse(SERVICE).unwrap();
        assert_eq!(id.subscription_id, "00000000-0000-0000-0000-000000000000");
        assert_eq!(id.resource_group_name, "rg1");
        assert_eq!(id.service_name, "svc1");
        assert_eq!(id.id(), SERVICE);
    }

    #[test]
    fn test_constructed_id_parses_back() {
        let ids: Vec<String> = vec![
            ApiId::new("sub", "rg", "svc", "echo;rev=2").id(),
            OperationId::new("sub", "rg", "svc", "echo", "get-status").id(),
            ServicePolicyId::new("sub", "rg", "svc").id(),
            ApiPolicyId::new("sub", "rg", "svc", "echo").id(),
            OperationPolicyId::new("sub", "rg", "svc", "echo", "op").id(),
            LoggerId::new("sub", "rg", "svc", "appinsights").id(),
            DiagnosticId::new("sub", "rg", "svc", "applicationinsights").id(),
            ApiDiagnosticId::new("sub", "rg", "svc", "echo", "azuremonitor").id(),
            GatewayId::new("sub", "rg", "svc", "gw").id(),
            HostnameConfigurationId::new("sub", "rg", "svc", "gw", "hc").id(),
            WorkspaceId::new("sub", "rg", "svc", "ws").id(),
            ApimSubscriptionId::new("sub", "rg", "svc", "key1").id(),
            BackendId::new("sub", "rg", "svc", "be").id(),
            NamedValueId::new("sub", "rg", "svc", "nv").id(),
        ];

        assert_eq!(ApiId::parse(&ids[0]).unwrap().id(), ids[0]);
        assert_eq!(OperationId::parse(&ids[1]).unwrap().id(), ids[1]);
        assert_eq!(ServicePolicyId::parse(&ids[2]).unwrap().id(), ids[2]);
        assert_eq!(ApiPolicyId::parse(&ids[3]).unwrap().id(), ids[3]);
        assert_eq!(OperationPolicyId::parse(&ids[4]).unwrap().id(), ids[4]);
        assert_eq!(LoggerId::parse(&ids[5]).unwrap().id(), ids[5]);
        assert_eq!(DiagnosticId::parse(&ids[6]).unwrap().id(), ids[6]);
        assert_eq!(ApiDiagnosticId::parse(&ids[7]).unwrap().id(), ids[7]);
        assert_eq!(GatewayId::parse(&ids[8]).unwrap().id(), ids[8]);
        assert_eq!(HostnameConfigurationId::parse(&ids[9]).unwrap().id(), ids[9]);
        assert_eq!(WorkspaceId::parse(&ids[10]).unwrap().id(), ids[10]);
        assert_eq!(ApimSubscriptionId::parse(&ids[11]).unwrap().id(), ids[11]);
        assert_eq!(BackendId::parse(&ids[12]).unwrap().id(), ids[12]);
        assert_eq!(NamedValueId::parse(&ids[13]).unwrap().id(), ids[13]);
    }

    #[test]
    fn test_policy_id_has_fixed_tail() {
        let id = ApiPolicyId::new("sub", "rg", "svc", "echo");
        assert_eq!(
            id.id(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.ApiManagement/service/svc/apis/echo/policies/policy"
        );
    }

    #[test]
    fn test_strict_parse_rejects_wrong_casing() {
        let input = SERVICE.replace("resourceGroups", "resourcegroups");
        let err = ServiceId::parse(&input).unwrap_err();
        assert!(matches!(
            err,
            IdError::UnexpectedSegment { position: 2, .. }
        ));
    }

    #[test]
    fn test_insensitive_parse_normalizes_casing() {
        let input = SERVICE
            .replace("resourceGroups", "resourcegroups")
            .replace("Microsoft.ApiManagement", "microsoft.apimanagement");
        let id = ServiceId::parse_insensitively(&input).unwrap();
        assert_eq!(id.id(), SERVICE);
    }

    #[test]
    fn test_parse_rejects_wrong_segment_count() {
        let err = ApiId::parse(SERVICE).unwrap_err();
        match err {
            IdError::SegmentCount {
                expected, actual, ..
            } => {
                assert_eq!(expected, 10);
                assert_eq!(actual, 8);
            }
            other => panic!("expected SegmentCount, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_missing_leading_slash() {
        let err = ServiceId::parse(&SERVICE[1..]).unwrap_err();
        assert!(matches!(err, IdError::MissingLeadingSlash { .. }));
    }

    #[test]
    fn test_parse_rejects_empty_user_segment() {
        let input = "/subscriptions//resourceGroups/rg/providers/Microsoft.ApiManagement/service/svc";
        let err = ServiceId::parse(input).unwrap_err();
        assert!(matches!(
            err,
            IdError::EmptySegment {
                name: "subscription_id",
                ..
            }
        ));
    }

    #[test]
    fn test_parse_rejects_trailing_slash() {
        let input = format!("{}/", SERVICE);
        assert!(ServiceId::parse(&input).is_err());
    }

    #[test]
    fn test_apim_subscription_distinct_from_azure_subscription() {
        let id = ApimSubscriptionId::new("sub", "rg", "svc", "key1");
        assert_eq!(
            id.id(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.ApiManagement/service/svc/subscriptions/key1"
        );
        let parsed = ApimSubscriptionId::parse(&id.id()).unwrap();
        assert_eq!(parsed.subscription_id, "sub");
        assert_eq!(parsed.sid, "key1");
    }

    #[test]
    fn test_api_revision_helpers() {
        let id = ApiId::new("sub", "rg", "svc", "echo;rev=3");
        assert_eq!(id.api_name(), "echo");
        assert_eq!(id.revision(), Some("3"));

        let plain = ApiId::new("sub", "rg", "svc", "echo");
        assert_eq!(plain.api_name(), "echo");
        assert_eq!(plain.revision(), None);
    }

    #[test]
    fn test_segments_lists_user_values_in_order() {
        let id = OperationId::new("sub", "rg", "svc", "echo", "op");
        let names: Vec<&str> = id.segments().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![
                "subscription_id",
                "resource_group_name",
                "service_name",
                "api_id",
                "operation_id"
            ]
        );
    }

    #[test]
    fn test_display_includes_kind() {
        let id = GatewayId::new("sub", "rg", "svc", "gw");
        assert!(id.to_string().starts_with("Gateway (/subscriptions/sub"));
    }

    #[test]
    fn test_from_str_is_strict_parse() {
        let id: ServiceId = SERVICE.parse().unwrap();
        assert_eq!(id.service_name, "svc1");
        assert_eq!(id.provider_namespace(), "Microsoft.ApiManagement");
    }

    #[test]
    fn test_parent_navigation() {
        let op = OperationId::new("sub", "rg", "svc", "echo;rev=1", "op");
        assert_eq!(op.api().api_name(), "echo");
        assert_eq!(op.api().service_id().service_name, "svc");

        let policy = OperationPolicyId::new("sub", "rg", "svc", "echo", "op");
        assert_eq!(policy.operation().operation_id, "op");

        let hc = HostnameConfigurationId::new("sub", "rg", "svc", "gw", "hc");
        assert_eq!(hc.gateway().gateway_id, "gw");
    }
}
