//! apim - declarative management of Azure API Management resources.
//!
//! Each resource kind maps a flat, validated configuration onto its Azure
//! Resource Manager entity and drives create, read, update, delete and import
//! through the same lifecycle.

pub mod arm;
pub mod cli;
pub mod config;
pub mod error;
pub mod ids;
pub mod output;
pub mod resource;
pub mod resources;
pub mod state;
pub mod validate;

pub use arm::{ArmClient, ArmError};
pub use config::ProviderConfig;
pub use error::ApimError;
pub use ids::{IdError, ResourceId};
pub use resource::{ArmResource, Plan, ResourceState, SoftDeleted, Timeouts};
pub use resources::{Operator, ProviderContext, ResourceHandler, get_resource, resource_types};
pub use state::StateFile;
pub use validate::ValidationError;
