//! Polling for ARM long-running operations.
//!
//! The poller never gives up on its own: it runs until the operation reaches
//! a terminal state. Callers bound it with `tokio::time::timeout`.

use std::time::Duration;

use super::types::{ArmResponse, AsyncOperationStatus, OperationStatus};
use super::{ArmClient, ArmError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub enum PollStrategy {
    /// `Azure-AsyncOperation` status URL
    AsyncOperation(String),
    /// `Location` URL answering 202 until done
    Location(String),
    /// Re-read the entity until `properties.provisioningState` is terminal
    ProvisioningState,
    Done,
}

impl PollStrategy {
    pub fn from_response(response: &ArmResponse) -> Self {
        if let Some(url) = &response.async_operation {
            return PollStrategy::AsyncOperation(url.clone());
        }
        if response.status == 202 {
            if let Some(url) = &response.location {
                return PollStrategy::Location(url.clone());
            }
        }
        match response.provisioning_state() {
            Some(state) if !OperationStatus::from_wire(state).is_terminal() => {
                PollStrategy::ProvisioningState
            }
            _ => PollStrategy::Done,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Poller<'a> {
    client: &'a ArmClient,
    interval: Duration,
}

impl<'a> Poller<'a> {
    pub fn new(client: &'a ArmClient, interval: Duration) -> Self {
        Self { client, interval }
    }

    /// Waits until the operation that produced `response` completes.
    /// `path`/`api_version` address the entity for provisioning-state polling.
    pub async fn wait(
        &self,
        response: &ArmResponse,
        path: &str,
        api_version: &str,
    ) -> Result<(), ArmError> {
        let strategy = PollStrategy::from_response(response);
        if strategy == PollStrategy::Done {
            return Ok(());
        }

        tracing::debug!(?strategy, path, "waiting for long-running operation");
        let mut delay = response.retry_after.unwrap_or(self.interval);

        loop {
            tokio::time::sleep(delay).await;

            let polled = match &strategy {
                PollStrategy::AsyncOperation(url) | PollStrategy::Location(url) => {
                    self.client.get_url(url).await?
                }
                PollStrategy::ProvisioningState => self.client.get(path, api_version).await?,
                PollStrategy::Done => return Ok(()),
            };

            let status = match &strategy {
                PollStrategy::AsyncOperation(_) => {
                    let body: AsyncOperationStatus = serde_json::from_value(polled.body.clone())
                        .map_err(|e| ArmError::Decode(format!("operation status: {}", e)))?;
                    let status = OperationStatus::from_wire(&body.status);
                    if matches!(status, OperationStatus::Failed | OperationStatus::Canceled) {
                        let error = body.error.unwrap_or_default();
                        return Err(ArmError::OperationFailed {
                            status: body.status,
                            code: error.code,
                            message: error.message,
                        });
                    }
                    status
                }
                PollStrategy::Location(_) => {
                    if polled.status == 202 {
                        OperationStatus::InProgress
                    } else {
                        OperationStatus::Succeeded
                    }
                }
                PollStrategy::ProvisioningState => {
                    let state = polled.provisioning_state().unwrap_or("Succeeded").to_string();
                    let status = OperationStatus::from_wire(&state);
                    if matches!(status, OperationStatus::Failed | OperationStatus::Canceled) {
                        let message = format!("provisioning of {} ended in state {}", path, state);
                        return Err(ArmError::OperationFailed {
                            status: state,
                            code: "ProvisioningFailed".to_string(),
                            message,
                        });
                    }
                    status
                }
                PollStrategy::Done => OperationStatus::Succeeded,
            };

            tracing::debug!(?status, path, "polled long-running operation");
            if status.is_terminal() {
                return Ok(());
            }

            delay = polled.retry_after.unwrap_or(self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: serde_json::Value) -> ArmResponse {
        ArmResponse {
            status,
            body,
            async_operation: None,
            location: None,
            retry_after: None,
        }
    }

    #[test]
    fn test_async_operation_header_wins() {
        let mut r = response(202, serde_json::Value::Null);
        r.async_operation = Some("https://example/ops/1".to_string());
        r.location = Some("https://example/loc/1".to_string());
        assert_eq!(
            PollStrategy::from_response(&r),
            PollStrategy::AsyncOperation("https://example/ops/1".to_string())
        );
    }

    #[test]
    fn test_location_only_for_accepted() {
        let mut r = response(202, serde_json::Value::Null);
        r.location = Some("https://example/loc/1".to_string());
        assert_eq!(
            PollStrategy::from_response(&r),
            PollStrategy::Location("https://example/loc/1".to_string())
        );

        r.status = 201;
        assert_eq!(PollStrategy::from_response(&r), PollStrategy::Done);
    }

    #[test]
    fn test_non_terminal_provisioning_state() {
        let r = response(
            201,
            serde_json::json!({"properties": {"provisioningState": "Activating"}}),
        );
        assert_eq!(PollStrategy::from_response(&r), PollStrategy::ProvisioningState);

        let done = response(
            200,
            serde_json::json!({"properties": {"provisioningState": "Succeeded"}}),
        );
        assert_eq!(PollStrategy::from_response(&done), PollStrategy::Done);
    }

    #[test]
    fn test_plain_response_is_done() {
        let r = response(200, serde_json::json!({"properties": {}}));
        assert_eq!(PollStrategy::from_response(&r), PollStrategy::Done);
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_done() {
        let client = ArmClient::new("t".to_string()).unwrap();
        let poller = Poller::new(&client, Duration::from_secs(3600));
        let r = response(200, serde_json::Value::Null);
        poller.wait(&r, "/x", "2022-08-01").await.unwrap();
    }
}
