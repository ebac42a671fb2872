//! Local state file: the last known attributes of every managed entity,
//! keyed by address (`{resource_type}.{name}`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ApimError;
use crate::resource::ResourceState;

const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            resources: BTreeMap::new(),
        }
    }
}

/// `$XDG_DATA_HOME/apim/state.json` or the platform equivalent.
pub fn default_path() -> Result<PathBuf, ApimError> {
    dirs::data_dir()
        .map(|dir| dir.join("apim").join("state.json"))
        .ok_or_else(|| {
            ApimError::Config("could not determine a data directory; pass --state".to_string())
        })
}

/// Builds the address of an entity from its type and a local name.
pub fn address(resource_type: &str, name: &str) -> String {
    format!("{}.{}", resource_type, name)
}

impl StateFile {
    /// A missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self, ApimError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no state file, starting empty");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let state: StateFile = serde_json::from_str(&raw)?;
        if state.version != STATE_VERSION {
            return Err(ApimError::Config(format!(
                "state file {} has version {}, expected {}",
                path.display(),
                state.version,
                STATE_VERSION
            )));
        }
        Ok(state)
    }

    /// Writes to a sibling temp file first so a crash never leaves half a state.
    pub fn save(&self, path: &Path) -> Result<(), ApimError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), count = self.resources.len(), "state saved");
        Ok(())
    }

    pub fn get(&self, address: &str) -> Option<&ResourceState> {
        self.resources.get(address)
    }

    pub fn insert(&mut self, address: impl Into<String>, state: ResourceState) {
        self.resources.insert(address.into(), state);
    }

    pub fn remove(&mut self, address: &str) -> Option<ResourceState> {
        self.resources.remove(address)
    }

    /// The address already tracking `id`, if any.
    pub fn address_of(&self, id: &str) -> Option<&str> {
        self.resources
            .iter()
            .find(|(_, state)| state.id.eq_ignore_ascii_case(id))
            .map(|(address, _)| address.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};
    use tempfile::TempDir;

    fn logger_state() -> ResourceState {
        let attributes = match json!({"name": "appinsights", "buffered": true}) {
            serde_json::Value::Object(map) => map,
            _ => Map::new(),
        };
        ResourceState {
            resource_type: "azurerm_api_management_logger".to_string(),
            id: "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.ApiManagement/service/svc/loggers/appinsights".to_string(),
            attributes,
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let state = StateFile::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(state, StateFile::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut state = StateFile::default();
        state.insert(address("azurerm_api_management_logger", "main"), logger_state());
        state.save(&path).unwrap();

        let loaded = StateFile::load(&path).unwrap();
        assert_eq!(loaded, state);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_address_of_ignores_case() {
        let mut state = StateFile::default();
        state.insert("azurerm_api_management_logger.main", logger_state());
        let id = logger_state().id.to_lowercase();
        assert_eq!(state.address_of(&id), Some("azurerm_api_management_logger.main"));
        assert_eq!(state.address_of("/nope"), None);
    }

    #[test]
    fn test_load_rejects_other_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"version": 7, "resources": {}}"#).unwrap();
        let err = StateFile::load(&path).unwrap_err();
        assert!(matches!(err, ApimError::Config(_)));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(StateFile::load(&path), Err(ApimError::Json(_))));
    }

    #[test]
    fn test_remove() {
        let mut state = StateFile::default();
        state.insert("a.b", logger_state());
        assert!(state.remove("a.b").is_some());
        assert!(state.get("a.b").is_none());
    }
}
