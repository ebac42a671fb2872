use std::time::Duration;

use thiserror::Error;

use crate::arm::ArmError;
use crate::ids::IdError;
use crate::validate::ValidationError;

#[derive(Debug, Error)]
pub enum ApimError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    InvalidId(#[from] IdError),

    #[error(
        "a resource with the ID {id:?} already exists - to be managed via this tool it needs to be imported into the state. Please see `apim import --help` for more information on {resource_type}"
    )]
    RequiresImport { resource_type: String, id: String },

    #[error(
        "a soft-deleted {resource_type} exists at {path:?} and recovering soft-deleted resources is disabled - recover it out-of-band and import it, or pick a different name or location"
    )]
    SoftDeleted { resource_type: String, path: String },

    #[error("{resource_type} {id:?} was not found")]
    NotFound { resource_type: String, id: String },

    #[error("changing {} on {resource_type} {id:?} forces a new resource to be created", .fields.join(", "))]
    ForceNew {
        resource_type: String,
        id: String,
        fields: Vec<String>,
    },

    #[error("{context}: {source}")]
    Remote {
        context: String,
        #[source]
        source: ArmError,
    },

    #[error("timed out after {after:?} {operation} {id}")]
    Timeout {
        operation: &'static str,
        id: String,
        after: Duration,
    },

    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApimError {
    pub fn remote(context: impl Into<String>, source: ArmError) -> Self {
        ApimError::Remote {
            context: context.into(),
            source,
        }
    }
}
