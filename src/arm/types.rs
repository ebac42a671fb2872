use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";

/// Default ARM endpoint for the public cloud.
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Deserialize, Default)]
pub struct ArmErrorResponse {
    #[serde(default)]
    pub error: Option<ArmErrorBody>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct ArmErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Body returned by an `Azure-AsyncOperation` status URL.
#[derive(Debug, Deserialize)]
pub struct AsyncOperationStatus {
    pub status: String,
    #[serde(default)]
    pub error: Option<ArmErrorBody>,
}

/// The standard envelope for entities nested under an API Management service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<P>,
}

impl<P> Envelope<P> {
    pub fn with_properties(properties: P) -> Self {
        Self {
            id: None,
            name: None,
            resource_type: None,
            properties: Some(properties),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

impl OperationStatus {
    /// Maps both `status` (async operations) and `provisioningState` values.
    /// Anything not terminal counts as in progress (`Creating`, `Activating`, `Updating`, ...).
    pub fn from_wire(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "succeeded" => OperationStatus::Succeeded,
            "failed" => OperationStatus::Failed,
            "canceled" | "cancelled" => OperationStatus::Canceled,
            _ => OperationStatus::InProgress,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, OperationStatus::InProgress)
    }
}

/// A decoded ARM response with the headers the poller needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmResponse {
    pub status: u16,
    pub body: serde_json::Value,
    pub async_operation: Option<String>,
    pub location: Option<String>,
    pub retry_after: Option<Duration>,
}

impl ArmResponse {
    pub fn provisioning_state(&self) -> Option<&str> {
        self.body
            .get("properties")
            .and_then(|p| p.get("provisioningState"))
            .and_then(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_deserialization() {
        let json = r#"{"error": {"code": "ResourceNotFound", "message": "Logger not found."}}"#;
        let response: ArmErrorResponse = serde_json::from_str(json).unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, "ResourceNotFound");
        assert_eq!(error.message, "Logger not found.");
    }

    #[test]
    fn test_error_response_tolerates_missing_fields() {
        let response: ArmErrorResponse = serde_json::from_str("{}").unwrap();
        assert!(response.error.is_none());
    }

    #[test]
    fn test_operation_status_from_wire() {
        assert_eq!(OperationStatus::from_wire("Succeeded"), OperationStatus::Succeeded);
        assert_eq!(OperationStatus::from_wire("failed"), OperationStatus::Failed);
        assert_eq!(OperationStatus::from_wire("Canceled"), OperationStatus::Canceled);
        assert_eq!(OperationStatus::from_wire("Activating"), OperationStatus::InProgress);
        assert!(!OperationStatus::from_wire("InProgress").is_terminal());
        assert!(OperationStatus::from_wire("Succeeded").is_terminal());
    }

    #[test]
    fn test_envelope_skips_empty_fields() {
        let envelope = Envelope::with_properties(serde_json::json!({"a": 1}));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json, serde_json::json!({"properties": {"a": 1}}));
    }

    #[test]
    fn test_envelope_reads_type_field() {
        let json = r#"{"id": "/x", "name": "x", "type": "Microsoft.ApiManagement/service/loggers", "properties": {"a": 1}}"#;
        let envelope: Envelope<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert_eq!(
            envelope.resource_type.as_deref(),
            Some("Microsoft.ApiManagement/service/loggers")
        );
    }

    #[test]
    fn test_provisioning_state_lookup() {
        let response = ArmResponse {
            status: 201,
            body: serde_json::json!({"properties": {"provisioningState": "Activating"}}),
            async_operation: None,
            location: None,
            retry_after: None,
        };
        assert_eq!(response.provisioning_state(), Some("Activating"));
    }
}
