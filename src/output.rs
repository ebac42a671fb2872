//! Terminal rendering for the CLI.

use serde_json::Value;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use termtree::Tree;

use crate::resource::{Plan, ResourceState};
use crate::state::StateFile;

#[derive(Tabled)]
struct StateRow<'a> {
    #[tabled(rename = "ADDRESS")]
    address: &'a str,
    #[tabled(rename = "ID")]
    id: &'a str,
}

#[derive(Tabled)]
struct AttributeRow<'a> {
    #[tabled(rename = "FIELD")]
    field: &'a str,
    #[tabled(rename = "VALUE")]
    value: String,
}

#[derive(Tabled)]
struct TypeRow<'a> {
    #[tabled(rename = "TYPE")]
    resource_type: &'a str,
    #[tabled(rename = "ID FORMAT")]
    id_format: &'a str,
}

pub fn state_table(state: &StateFile) -> String {
    let rows = state.resources.iter().map(|(address, entry)| StateRow {
        address: address.as_str(),
        id: entry.id.as_str(),
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn attribute_table(state: &ResourceState) -> String {
    let rows = state.attributes.iter().map(|(field, value)| AttributeRow {
        field: field.as_str(),
        value: render_value(value),
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn resource_types_table(types: &[(&str, String)]) -> String {
    let rows = types.iter().map(|(resource_type, id_format)| TypeRow {
        resource_type: *resource_type,
        id_format: id_format.as_str(),
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn describe_plan(plan: &Plan) -> String {
    match plan {
        Plan::NoOp => "no changes".to_string(),
        Plan::Update { changed } => format!("update in place: {}", changed.join(", ")),
        Plan::Replace { fields } => format!("must be replaced: {}", fields.join(", ")),
    }
}

/// Nests each named segment under its parent, outermost first.
pub fn id_tree(kind: &str, segments: &[(&'static str, String)]) -> Tree<String> {
    let mut leaves = segments
        .iter()
        .rev()
        .map(|(name, value)| Tree::new(format!("{}: {}", name, value)));

    let innermost = leaves.next();
    let chain = leaves.fold(innermost, |child, mut parent| {
        if let Some(child) = child {
            parent.push(child);
        }
        Some(parent)
    });

    let mut root = Tree::new(kind.to_string());
    if let Some(chain) = chain {
        root.push(chain);
    }
    root
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    #[test]
    fn test_id_tree_nests_segments() {
        let segments = vec![
            ("subscription_id", "sub".to_string()),
            ("resource_group_name", "rg".to_string()),
            ("service_name", "svc".to_string()),
        ];
        let rendered = id_tree("API Management Service", &segments).to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "API Management Service");
        assert!(lines[1].ends_with("subscription_id: sub"));
        assert!(lines[2].ends_with("resource_group_name: rg"));
        assert!(lines[3].ends_with("service_name: svc"));
        // Deeper segments are indented further.
        let indent = |line: &str| line.find(|c: char| c.is_alphanumeric()).unwrap_or(0);
        assert!(indent(lines[2]) > indent(lines[1]));
        assert!(indent(lines[3]) > indent(lines[2]));
    }

    #[test]
    fn test_id_tree_without_segments() {
        assert_eq!(id_tree("Logger", &[]).to_string().trim_end(), "Logger");
    }

    #[test]
    fn test_attribute_table_renders_values() {
        let attributes = match json!({"buffered": true, "description": null, "name": "ai"}) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let state = ResourceState {
            resource_type: "azurerm_api_management_logger".to_string(),
            id: "/x".to_string(),
            attributes,
        };
        let table = attribute_table(&state);
        assert!(table.contains("FIELD"));
        assert!(table.contains("buffered"));
        assert!(table.contains("true"));
        assert!(table.contains(" ai "));
        assert!(!table.contains("\"ai\""));
    }

    #[test]
    fn test_state_table_lists_addresses() {
        let mut state = StateFile::default();
        state.insert(
            "azurerm_api_management_workspace.main",
            ResourceState {
                resource_type: "azurerm_api_management_workspace".to_string(),
                id: "/ws".to_string(),
                attributes: Map::new(),
            },
        );
        let table = state_table(&state);
        assert!(table.contains("azurerm_api_management_workspace.main"));
        assert!(table.contains("/ws"));
    }

    #[test]
    fn test_describe_plan() {
        assert_eq!(describe_plan(&Plan::NoOp), "no changes");
        assert_eq!(
            describe_plan(&Plan::Replace {
                fields: vec!["name".to_string()]
            }),
            "must be replaced: name"
        );
    }
}
