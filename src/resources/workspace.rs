use serde::{Deserialize, Serialize};

use crate::arm::Envelope;
use crate::ids::WorkspaceId;
use crate::resource::ArmResource;
use crate::validate::{ValidationError, Validator};

pub struct Workspace;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    pub name: String,
    pub api_management_name: String,
    pub resource_group_name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceProperties {
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ArmResource for Workspace {
    type Id = WorkspaceId;
    type Config = WorkspaceConfig;
    type Model = Envelope<WorkspaceProperties>;

    const TYPE_NAME: &'static str = "azurerm_api_management_workspace";
    const API_VERSION: &'static str = "2024-05-01";
    const FORCE_NEW: &'static [&'static str] =
        &["name", "api_management_name", "resource_group_name"];

    fn validate(config: &WorkspaceConfig) -> Result<(), ValidationError> {
        Validator::new(Self::TYPE_NAME)
            .child_name("name", &config.name)
            .service_name("api_management_name", &config.api_management_name)
            .resource_group_name("resource_group_name", &config.resource_group_name)
            .not_empty("display_name", &config.display_name)
            .opt_not_empty("description", config.description.as_deref())
            .finish()
    }

    fn id_from_config(subscription_id: &str, config: &WorkspaceConfig) -> WorkspaceId {
        WorkspaceId::new(
            subscription_id,
            &config.resource_group_name,
            &config.api_management_name,
            &config.name,
        )
    }

    fn expand(config: &WorkspaceConfig) -> Self::Model {
        Envelope::with_properties(WorkspaceProperties {
            display_name: config.display_name.clone(),
            description: config.description.clone(),
        })
    }

    fn flatten(id: &WorkspaceId, model: &Self::Model, _prior: Option<&WorkspaceConfig>) -> WorkspaceConfig {
        let props = model.properties.clone().unwrap_or_default();
        WorkspaceConfig {
            name: id.workspace_id.clone(),
            api_management_name: id.service_name.clone(),
            resource_group_name: id.resource_group_name.clone(),
            display_name: props.display_name,
            description: props.description,
        }
    }
}
