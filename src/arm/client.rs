use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, IF_MATCH, LOCATION, RETRY_AFTER};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::ArmError;
use super::types::{AZURE_ASYNC_OPERATION, ArmErrorResponse, ArmResponse, DEFAULT_ENDPOINT};

const USER_AGENT: &str = concat!("apim/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct ArmClient {
    client: reqwest::Client,
    base_url: String,
}

impl ArmClient {
    pub fn new(token: String) -> Result<Self, ArmError> {
        Self::with_base_url(token, DEFAULT_ENDPOINT.to_string())
    }

    /// NOTE: Primarily used for sovereign clouds and testing with mock servers.
    pub fn with_base_url(token: String, base_url: String) -> Result<Self, ArmError> {
        Self::create_client(token, base_url)
    }

    fn create_client(token: String, base_url: String) -> Result<Self, ArmError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", token);
        let mut header_value = HeaderValue::from_str(&auth_value).map_err(|_| ArmError::Auth {
            status: 0,
            message: "Invalid token format".to_string(),
        })?;
        header_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, header_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ArmError::Network)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str, api_version: &str) -> String {
        format!("{}{}?api-version={}", self.base_url, path, api_version)
    }

    pub async fn get(&self, path: &str, api_version: &str) -> Result<ArmResponse, ArmError> {
        let url = self.url(path, api_version);
        tracing::debug!(%url, "GET");
        self.execute(self.client.get(&url)).await
    }

    /// GET and decode the body into `T`.
    pub async fn get_model<T: DeserializeOwned>(
        &self,
        path: &str,
        api_version: &str,
    ) -> Result<T, ArmError> {
        let response = self.get(path, api_version).await?;
        decode(response.body)
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        api_version: &str,
        body: &B,
        if_match: Option<&str>,
    ) -> Result<ArmResponse, ArmError> {
        let url = self.url(path, api_version);
        tracing::debug!(%url, "PUT");
        let mut request = self.client.put(&url).json(body);
        if let Some(etag) = if_match {
            request = request.header(IF_MATCH, etag);
        }
        self.execute(request).await
    }

    pub async fn delete(
        &self,
        path: &str,
        api_version: &str,
        if_match: Option<&str>,
    ) -> Result<ArmResponse, ArmError> {
        let url = self.url(path, api_version);
        tracing::debug!(%url, "DELETE");
        let mut request = self.client.delete(&url);
        if let Some(etag) = if_match {
            request = request.header(IF_MATCH, etag);
        }
        self.execute(request).await
    }

    /// GET an absolute URL handed out by ARM (operation status or location).
    pub async fn get_url(&self, url: &str) -> Result<ArmResponse, ArmError> {
        tracing::debug!(%url, "GET (poll)");
        self.execute(self.client.get(url)).await
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<ArmResponse, ArmError> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let text = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(error_from_response(status, &text));
        }

        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| ArmError::Decode(format!("Failed to parse response: {}", e)))?
        };

        Ok(ArmResponse {
            status,
            body,
            async_operation: header_string(&headers, AZURE_ASYNC_OPERATION),
            location: header_string(&headers, LOCATION.as_str()),
            retry_after: header_string(&headers, RETRY_AFTER.as_str())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        })
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

pub(crate) fn decode<T: DeserializeOwned>(body: serde_json::Value) -> Result<T, ArmError> {
    serde_json::from_value(body).map_err(|e| ArmError::Decode(e.to_string()))
}

fn error_from_response(status: u16, text: &str) -> ArmError {
    let body = serde_json::from_str::<ArmErrorResponse>(text)
        .ok()
        .and_then(|r| r.error)
        .unwrap_or_default();
    let message = if body.message.is_empty() {
        format!("HTTP {}", status)
    } else {
        body.message
    };

    match status {
        401 | 403 => ArmError::Auth { status, message },
        404 => ArmError::NotFound {
            code: body.code,
            message,
        },
        _ => ArmError::Api {
            status,
            code: body.code,
            message,
        },
    }
}

impl std::fmt::Debug for ArmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ArmClient::new("test_token".to_string());
        assert!(client.is_ok());
    }

    #[test]
    fn test_debug_does_not_expose_token() {
        let client = ArmClient::new("super_secret_token_12345".to_string()).unwrap();
        let debug_output = format!("{:?}", client);

        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_token_12345"),
            "Debug output must NOT contain the actual token"
        );
    }

    #[test]
    fn test_invalid_token_rejected() {
        let result = ArmClient::new("bad\ntoken".to_string());
        assert!(matches!(result, Err(ArmError::Auth { .. })));
    }

    #[test]
    fn test_api_base_url() {
        let client = ArmClient::new("test_token".to_string()).unwrap();
        assert_eq!(client.api_base(), "https://management.azure.com");
    }

    #[test]
    fn test_trailing_slash_trimmed_from_base() {
        let client =
            ArmClient::with_base_url("t".to_string(), "http://localhost:1234/".to_string())
                .unwrap();
        assert_eq!(
            client.url("/subscriptions/s", "2022-08-01"),
            "http://localhost:1234/subscriptions/s?api-version=2022-08-01"
        );
    }

    #[test]
    fn test_error_from_response_mapping() {
        let body = r#"{"error": {"code": "ResourceNotFound", "message": "gone"}}"#;
        assert!(error_from_response(404, body).is_not_found());
        assert!(matches!(
            error_from_response(403, body),
            ArmError::Auth { status: 403, .. }
        ));
        match error_from_response(409, body) {
            ArmError::Api { status, code, message } => {
                assert_eq!(status, 409);
                assert_eq!(code, "ResourceNotFound");
                assert_eq!(message, "gone");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_from_response_without_body() {
        match error_from_response(500, "") {
            ArmError::Api { message, .. } => assert_eq!(message, "HTTP 500"),
            other => panic!("expected Api error, got {:?}", other),
        }
    }
}
