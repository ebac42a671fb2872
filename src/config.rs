use std::time::Duration;

use crate::arm::{ArmClient, DEFAULT_ENDPOINT, DEFAULT_POLL_INTERVAL};
use crate::error::ApimError;

/// Connection settings shared by every resource operation.
#[derive(Clone)]
pub struct ProviderConfig {
    pub subscription_id: String,
    pub token: String,
    pub endpoint: String,
    pub poll_interval: Duration,
    /// Restore a soft-deleted service instead of failing when creating over it.
    pub recover_soft_deleted: bool,
    /// Purge the soft-deleted copy a service delete leaves behind.
    pub purge_soft_delete_on_destroy: bool,
}

impl ProviderConfig {
    pub fn new(subscription_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            token: token.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            recover_soft_deleted: true,
            purge_soft_delete_on_destroy: false,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_soft_delete(mut self, recover: bool, purge_on_destroy: bool) -> Self {
        self.recover_soft_deleted = recover;
        self.purge_soft_delete_on_destroy = purge_on_destroy;
        self
    }

    pub fn validate(&self) -> Result<(), ApimError> {
        if self.subscription_id.trim().is_empty() {
            return Err(ApimError::Config(
                "No subscription ID provided. Set ARM_SUBSCRIPTION_ID or use --subscription-id"
                    .to_string(),
            ));
        }
        if self.token.trim().is_empty() {
            return Err(ApimError::Config(
                "No access token provided. Set ARM_ACCESS_TOKEN or use --token".to_string(),
            ));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ApimError::Config(format!(
                "endpoint {:?} must be an http or https URL",
                self.endpoint
            )));
        }
        Ok(())
    }

    pub fn client(&self) -> Result<ArmClient, ApimError> {
        self.validate()?;
        ArmClient::with_base_url(self.token.clone(), self.endpoint.clone())
            .map_err(|e| ApimError::Config(e.to_string()))
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("subscription_id", &self.subscription_id)
            .field("token", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("poll_interval", &self.poll_interval)
            .field("recover_soft_deleted", &self.recover_soft_deleted)
            .field("purge_soft_delete_on_destroy", &self.purge_soft_delete_on_destroy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::new("sub", "token");
        assert_eq!(config.endpoint, "https://management.azure.com");
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert!(config.recover_soft_deleted);
        assert!(!config.purge_soft_delete_on_destroy);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_soft_delete_switches() {
        let config = ProviderConfig::new("sub", "token").with_soft_delete(false, true);
        assert!(!config.recover_soft_deleted);
        assert!(config.purge_soft_delete_on_destroy);
    }

    #[test]
    fn test_missing_subscription_rejected() {
        let err = ProviderConfig::new("", "token").validate().unwrap_err();
        assert!(err.to_string().contains("ARM_SUBSCRIPTION_ID"));
    }

    #[test]
    fn test_missing_token_rejected() {
        let err = ProviderConfig::new("sub", " ").validate().unwrap_err();
        assert!(err.to_string().contains("ARM_ACCESS_TOKEN"));
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        let err = ProviderConfig::new("sub", "token")
            .with_endpoint("management.azure.com")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ApimError::Config(_)));
    }

    #[test]
    fn test_client_uses_endpoint() {
        let client = ProviderConfig::new("sub", "token")
            .with_endpoint("http://127.0.0.1:9999")
            .client()
            .unwrap();
        assert_eq!(client.api_base(), "http://127.0.0.1:9999");
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ProviderConfig::new("sub", "very_secret_token");
        let debug_output = format!("{:?}", config);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("very_secret_token"));
    }
}
