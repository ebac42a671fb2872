use thiserror::Error;

/// Errors raised while talking to Azure Resource Manager.
///
/// SECURITY: Error messages must NEVER contain the bearer token.
#[derive(Debug, Error)]
pub enum ArmError {
    /// The token was rejected (401) or lacks permission (403)
    #[error("authorization failed ({status}): {message}")]
    Auth { status: u16, message: String },

    /// The entity does not exist (404)
    #[error("not found: {message}")]
    NotFound { code: String, message: String },

    /// Any other non-success response
    #[error("API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Network-level error (connection failed, timeout, etc.)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body could not be decoded into the expected payload
    #[error("decoding response: {0}")]
    Decode(String),

    /// A long-running operation reached a failed or canceled terminal state
    #[error("long-running operation {status}: {code}: {message}")]
    OperationFailed {
        status: String,
        code: String,
        message: String,
    },
}

impl ArmError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArmError::NotFound { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ArmError::Auth { status, .. } | ArmError::Api { status, .. } => Some(*status),
            ArmError::NotFound { .. } => Some(404),
            ArmError::Network(e) => e.status().map(|s| s.as_u16()),
            ArmError::Decode(_) | ArmError::OperationFailed { .. } => None,
        }
    }
}
