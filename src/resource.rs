use std::fmt::Debug;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::ResourceId;
use crate::validate::ValidationError;

/// Flat state of one managed entity: field name to value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResourceState {
    pub resource_type: String,
    pub id: String,
    pub attributes: Map<String, Value>,
}

impl ResourceState {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.attributes.get(field).and_then(Value::as_str)
    }
}

/// Per-operation deadlines. Polling aborts when the deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub const fn minutes(create: u64, read: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * 60),
            read: Duration::from_secs(read * 60),
            update: Duration::from_secs(update * 60),
            delete: Duration::from_secs(delete * 60),
        }
    }

    /// Entities nested under a service.
    pub const CHILD: Timeouts = Timeouts::minutes(30, 5, 30, 30);

    /// Service provisioning and deprovisioning.
    pub const SERVICE: Timeouts = Timeouts::minutes(180, 5, 180, 180);

    /// Same deadline for every operation; used by tests and the CLI override.
    pub const fn uniform(after: Duration) -> Self {
        Self {
            create: after,
            read: after,
            update: after,
            delete: after,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    NoOp,
    Update { changed: Vec<String> },
    Replace { fields: Vec<String> },
}

/// A soft-deleted entity that blocks creating one with the same name.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftDeleted<M> {
    /// ARM path of the deleted entity.
    pub path: String,
    /// Payload that restores it in place.
    pub restore: M,
}

/// A resource kind: its typed configuration, wire payload and mappers.
///
/// `Config` doubles as the state shape: it serializes to the flat attribute
/// map kept in [`ResourceState`], computed fields included.
pub trait ArmResource: Send + Sync + 'static {
    type Id: ResourceId;
    type Config: Serialize + DeserializeOwned + Clone + Debug + Send + Sync;
    type Model: Serialize + DeserializeOwned + Debug + Send + Sync;

    const TYPE_NAME: &'static str;
    const API_VERSION: &'static str;

    /// Fields whose change requires destroying and recreating the entity.
    const FORCE_NEW: &'static [&'static str];

    /// Fields that keep their prior value when left unset (computed by the API).
    /// `list[].field` names a field inside each element of a block list.
    const COMPUTED: &'static [&'static str] = &[];

    /// Most API Management entities demand `If-Match: *` on PUT and DELETE.
    const IF_MATCH: bool = true;

    fn timeouts() -> Timeouts {
        Timeouts::CHILD
    }

    fn validate(config: &Self::Config) -> Result<(), ValidationError>;

    /// Fills in values the caller may leave for creation to choose, such as
    /// a generated name. Runs once, before the first write.
    fn assign_generated(_config: &mut Self::Config) {}

    fn id_from_config(subscription_id: &str, config: &Self::Config) -> Self::Id;

    fn expand(config: &Self::Config) -> Self::Model;

    /// `prior` supplies write-only values the API never returns.
    fn flatten(id: &Self::Id, model: &Self::Model, prior: Option<&Self::Config>) -> Self::Config;

    /// Payload written and awaited before the main one, e.g. an API
    /// definition import. `prior` is `None` on create.
    fn staged_model(_config: &Self::Config, _prior: Option<&Self::Config>) -> Option<Self::Model> {
        None
    }

    /// Where a soft-deleted entity with this configuration's name would live.
    fn soft_deleted(_subscription_id: &str, _config: &Self::Config) -> Option<SoftDeleted<Self::Model>> {
        None
    }

    /// Where the soft-deleted copy of `model` lands after a delete.
    fn purge_path(_id: &Self::Id, _model: &Self::Model) -> Option<String> {
        None
    }
}

/// Compares desired configuration against prior state.
pub fn plan_change(
    force_new: &[&str],
    computed: &[&str],
    prior: &Map<String, Value>,
    desired: &Map<String, Value>,
) -> Plan {
    let mut merged = desired.clone();
    merge_computed(computed, prior, &mut merged);
    let desired = &merged;

    let mut keys: Vec<&String> = prior.keys().chain(desired.keys()).collect();
    keys.sort();
    keys.dedup();

    let changed: Vec<String> = keys
        .into_iter()
        .filter(|key| {
            let wanted = desired.get(key.as_str()).unwrap_or(&Value::Null);
            if is_unset(wanted) && computed.contains(&key.as_str()) {
                return false;
            }
            prior.get(key.as_str()).unwrap_or(&Value::Null) != wanted
        })
        .cloned()
        .collect();

    let replace: Vec<String> = changed
        .iter()
        .filter(|key| force_new.contains(&key.as_str()))
        .cloned()
        .collect();

    if !replace.is_empty() {
        Plan::Replace { fields: replace }
    } else if changed.is_empty() {
        Plan::NoOp
    } else {
        Plan::Update { changed }
    }
}

/// Null and the empty list both mean "not configured".
fn is_unset(value: &Value) -> bool {
    value.is_null() || value.as_array().is_some_and(Vec::is_empty)
}

/// Fills computed fields left unset in `desired` from `prior`.
///
/// Block list elements pair up by position.
pub fn merge_computed(computed: &[&str], prior: &Map<String, Value>, desired: &mut Map<String, Value>) {
    for field in computed {
        merge_field(field, prior, desired);
    }
}

fn merge_field(path: &str, prior: &Map<String, Value>, desired: &mut Map<String, Value>) {
    if let Some((list, rest)) = path.split_once("[].") {
        let (Some(Value::Array(before)), Some(Value::Array(after))) = (prior.get(list), desired.get_mut(list))
        else {
            return;
        };
        for (old, new) in before.iter().zip(after.iter_mut()) {
            if let (Value::Object(old), Value::Object(new)) = (old, new) {
                merge_field(rest, old, new);
            }
        }
        return;
    }

    let unset = desired.get(path).is_none_or(is_unset);
    if unset {
        if let Some(value) = prior.get(path) {
            desired.insert(path.to_string(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_resource_state_serialization_snake_case() {
        let state = ResourceState {
            resource_type: "azurerm_api_management_logger".to_string(),
            id: "/subscriptions/s".to_string(),
            attributes: map(json!({"buffered": true})),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("resource_type"));
        assert!(!json.contains("resourceType"));

        let back: ResourceState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.get("buffered"), Some(&json!(true)));
    }

    #[test]
    fn test_get_str() {
        let state = ResourceState {
            resource_type: "t".to_string(),
            id: "/x".to_string(),
            attributes: map(json!({"name": "echo", "count": 1})),
        };
        assert_eq!(state.get_str("name"), Some("echo"));
        assert_eq!(state.get_str("count"), None);
        assert_eq!(state.get_str("missing"), None);
    }

    #[test]
    fn test_timeouts_presets() {
        assert_eq!(Timeouts::CHILD.create, Duration::from_secs(30 * 60));
        assert_eq!(Timeouts::CHILD.read, Duration::from_secs(5 * 60));
        assert_eq!(Timeouts::SERVICE.delete, Duration::from_secs(180 * 60));
        assert_eq!(Timeouts::uniform(Duration::from_secs(1)).update, Duration::from_secs(1));
    }

    #[test]
    fn test_plan_noop() {
        let prior = map(json!({"name": "a", "description": "x"}));
        let desired = prior.clone();
        assert_eq!(plan_change(&["name"], &[], &prior, &desired), Plan::NoOp);
    }

    #[test]
    fn test_plan_update_lists_changed_fields() {
        let prior = map(json!({"name": "a", "description": "x", "title": "t"}));
        let desired = map(json!({"name": "a", "description": "y", "title": "t"}));
        assert_eq!(
            plan_change(&["name"], &[], &prior, &desired),
            Plan::Update {
                changed: vec!["description".to_string()]
            }
        );
    }

    #[test]
    fn test_plan_replace_on_force_new() {
        let prior = map(json!({"name": "a", "description": "x"}));
        let desired = map(json!({"name": "b", "description": "y"}));
        assert_eq!(
            plan_change(&["name"], &[], &prior, &desired),
            Plan::Replace {
                fields: vec!["name".to_string()]
            }
        );
    }

    #[test]
    fn test_plan_ignores_unset_computed() {
        let prior = map(json!({"name": "a", "path": "echo"}));
        let desired = map(json!({"name": "a", "path": null}));
        assert_eq!(plan_change(&["name"], &["path"], &prior, &desired), Plan::NoOp);

        let changed = map(json!({"name": "a", "path": "other"}));
        assert_eq!(
            plan_change(&["name"], &["path"], &prior, &changed),
            Plan::Update {
                changed: vec!["path".to_string()]
            }
        );
    }

    #[test]
    fn test_plan_unsetting_optional_is_a_change() {
        let prior = map(json!({"name": "a", "description": "x"}));
        let desired = map(json!({"name": "a", "description": null}));
        assert_eq!(
            plan_change(&["name"], &[], &prior, &desired),
            Plan::Update {
                changed: vec!["description".to_string()]
            }
        );
    }

    #[test]
    fn test_plan_treats_empty_list_as_unset_for_computed() {
        let prior = map(json!({"protocols": ["https"]}));
        let desired = map(json!({"protocols": []}));
        assert_eq!(plan_change(&[], &["protocols"], &prior, &desired), Plan::NoOp);
        assert_eq!(
            plan_change(&[], &[], &prior, &desired),
            Plan::Update {
                changed: vec!["protocols".to_string()]
            }
        );
    }

    #[test]
    fn test_merge_computed_fills_only_unset() {
        let prior = map(json!({"path": "echo", "display_name": "Echo"}));
        let mut desired = map(json!({"path": null, "display_name": "New"}));
        merge_computed(&["path", "display_name"], &prior, &mut desired);
        assert_eq!(desired.get("path"), Some(&json!("echo")));
        assert_eq!(desired.get("display_name"), Some(&json!("New")));
    }

    #[test]
    fn test_merge_computed_descends_into_block_lists() {
        let prior = map(json!({"certificate": [
            {"store_name": "Root", "thumbprint": "AB"},
            {"store_name": "CertificateAuthority", "thumbprint": "CD"}
        ]}));
        let mut desired = map(json!({"certificate": [
            {"store_name": "Root", "thumbprint": null}
        ]}));
        merge_computed(&["certificate[].thumbprint"], &prior, &mut desired);
        assert_eq!(desired["certificate"], json!([{"store_name": "Root", "thumbprint": "AB"}]));
    }

    #[test]
    fn test_plan_ignores_computed_fields_inside_blocks() {
        let computed = ["hostname_configuration[].proxy[].expiry"];
        let prior = map(json!({"hostname_configuration": [
            {"proxy": [{"host_name": "api.contoso.com", "expiry": "2027-01-01T00:00:00Z"}]}
        ]}));
        let desired = map(json!({"hostname_configuration": [
            {"proxy": [{"host_name": "api.contoso.com", "expiry": null}]}
        ]}));
        assert_eq!(plan_change(&[], &computed, &prior, &desired), Plan::NoOp);

        let renamed = map(json!({"hostname_configuration": [
            {"proxy": [{"host_name": "gw.contoso.com", "expiry": null}]}
        ]}));
        assert_eq!(
            plan_change(&[], &computed, &prior, &renamed),
            Plan::Update {
                changed: vec!["hostname_configuration".to_string()]
            }
        );
    }
}
