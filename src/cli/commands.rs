use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use super::args::{
    AddressArgs, Cli, Command, CreateArgs, GlobalArgs, IdArgs, ImportArgs, TypedConfigArgs,
    UpdateArgs,
};
use crate::arm::ArmClient;
use crate::config::ProviderConfig;
use crate::error::ApimError;
use crate::output;
use crate::resource::{Plan, ResourceState};
use crate::resources::{ProviderContext, get_resource, resource_types};
use crate::state::{self, StateFile};

pub async fn run(cli: Cli) -> Result<(), ApimError> {
    let global = cli.global;
    match cli.command {
        Command::Resources => list_resources(),
        Command::Validate(args) => validate(args),
        Command::Create(args) => create(&global, args).await,
        Command::Read(args) => read(&global, args).await,
        Command::Plan(args) => plan(&global, args),
        Command::Update(args) => update(&global, args).await,
        Command::Delete(args) => delete(&global, args).await,
        Command::Import(args) => import(&global, args).await,
        Command::Exists(args) => exists(&global, args).await,
        Command::ParseId(args) => parse_id(args),
        Command::State => show_state(&global),
        Command::Show(args) => show(&global, args),
    }
}

/// A context for commands that never reach the network.
fn offline_context() -> Result<ProviderContext, ApimError> {
    let client = ArmClient::new(String::new()).map_err(|e| ApimError::Config(e.to_string()))?;
    Ok(ProviderContext::new(client, String::new()))
}

fn context(global: &GlobalArgs) -> Result<ProviderContext, ApimError> {
    let config = ProviderConfig::new(
        global.subscription_id.clone().unwrap_or_default(),
        global.token.clone().unwrap_or_default(),
    )
    .with_endpoint(global.endpoint.clone())
    .with_poll_interval(Duration::from_secs(global.poll_interval_secs))
    .with_soft_delete(!global.no_recover_soft_deleted, global.purge_soft_deleted);

    let ctx = ProviderContext::from_config(&config)?;
    Ok(match global.timeout_minutes {
        Some(minutes) => ctx.with_timeout(Duration::from_secs(minutes * 60)),
        None => ctx,
    })
}

fn state_path(global: &GlobalArgs) -> Result<PathBuf, ApimError> {
    match &global.state {
        Some(path) => Ok(path.clone()),
        None => state::default_path(),
    }
}

fn read_config(path: &Path) -> Result<Value, ApimError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Splits `{type}.{name}`.
fn split_address(address: &str) -> Result<(&str, &str), ApimError> {
    address
        .split_once('.')
        .filter(|(resource_type, name)| !resource_type.is_empty() && !name.is_empty())
        .ok_or_else(|| ApimError::Config(format!("address {:?} is not `{{type}}.{{name}}`", address)))
}

fn tracked<'a>(state: &'a StateFile, address: &str) -> Result<&'a ResourceState, ApimError> {
    state
        .get(address)
        .ok_or_else(|| ApimError::Config(format!("{} is not in the state", address)))
}

fn list_resources() -> Result<(), ApimError> {
    let ctx = offline_context()?;
    let mut rows = Vec::new();
    for resource_type in resource_types() {
        let handler = get_resource(resource_type, ctx.clone())?;
        rows.push((*resource_type, handler.id_format()));
    }
    println!("{}", output::resource_types_table(&rows));
    Ok(())
}

fn validate(args: TypedConfigArgs) -> Result<(), ApimError> {
    let handler = get_resource(&args.resource_type, offline_context()?)?;
    handler.validate(&read_config(&args.config)?)?;
    println!("{} configuration is valid", args.resource_type);
    Ok(())
}

async fn create(global: &GlobalArgs, args: CreateArgs) -> Result<(), ApimError> {
    let path = state_path(global)?;
    let mut state = StateFile::load(&path)?;
    let address = state::address(&args.resource_type, &args.name);
    if state.get(&address).is_some() {
        return Err(ApimError::Config(format!("{} is already in the state", address)));
    }

    let handler = get_resource(&args.resource_type, context(global)?)?;
    let config = read_config(&args.config)?;
    let created = handler.create(&config).await?;
    println!("created {}", created.id);
    state.insert(address, created);
    state.save(&path)
}

async fn read(global: &GlobalArgs, args: AddressArgs) -> Result<(), ApimError> {
    let path = state_path(global)?;
    let mut state = StateFile::load(&path)?;
    let prior = tracked(&state, &args.address)?.clone();
    let (resource_type, _) = split_address(&args.address)?;

    let handler = get_resource(resource_type, context(global)?)?;
    match handler.read(&prior).await? {
        Some(refreshed) => {
            println!("{}", output::attribute_table(&refreshed));
            state.insert(args.address, refreshed);
        }
        None => {
            println!("{} no longer exists and was removed from the state", args.address);
            state.remove(&args.address);
        }
    }
    state.save(&path)
}

fn plan(global: &GlobalArgs, args: UpdateArgs) -> Result<(), ApimError> {
    let state = StateFile::load(&state_path(global)?)?;
    let prior = tracked(&state, &args.address)?;
    let (resource_type, _) = split_address(&args.address)?;

    let handler = get_resource(resource_type, offline_context()?)?;
    let plan = handler.plan(prior, &read_config(&args.config)?)?;
    println!("{}: {}", args.address, output::describe_plan(&plan));
    Ok(())
}

async fn update(global: &GlobalArgs, args: UpdateArgs) -> Result<(), ApimError> {
    let path = state_path(global)?;
    let mut state = StateFile::load(&path)?;
    let prior = tracked(&state, &args.address)?.clone();
    let (resource_type, _) = split_address(&args.address)?;

    let handler = get_resource(resource_type, context(global)?)?;
    let config = read_config(&args.config)?;

    let updated = match handler.plan(&prior, &config)? {
        Plan::NoOp => {
            println!("{}: no changes", args.address);
            return Ok(());
        }
        Plan::Replace { fields } if !args.no_replace => {
            tracing::info!(address = %args.address, fields = ?fields, "replacing");
            handler.delete(&prior.id).await?;
            state.remove(&args.address);
            state.save(&path)?;
            handler.create(&config).await?
        }
        Plan::Replace { .. } | Plan::Update { .. } => handler.update(&prior, &config).await?,
    };

    println!("updated {}", updated.id);
    state.insert(args.address, updated);
    state.save(&path)
}

async fn delete(global: &GlobalArgs, args: AddressArgs) -> Result<(), ApimError> {
    let path = state_path(global)?;
    let mut state = StateFile::load(&path)?;
    let prior = tracked(&state, &args.address)?.clone();
    let (resource_type, _) = split_address(&args.address)?;

    let handler = get_resource(resource_type, context(global)?)?;
    handler.delete(&prior.id).await?;
    println!("deleted {}", prior.id);
    state.remove(&args.address);
    state.save(&path)
}

async fn import(global: &GlobalArgs, args: ImportArgs) -> Result<(), ApimError> {
    let path = state_path(global)?;
    let mut state = StateFile::load(&path)?;
    let address = state::address(&args.resource_type, &args.name);
    if let Some(existing) = state.address_of(&args.id) {
        return Err(ApimError::Config(format!("{} is already tracked as {}", args.id, existing)));
    }
    if state.get(&address).is_some() {
        return Err(ApimError::Config(format!("{} is already in the state", address)));
    }

    let handler = get_resource(&args.resource_type, context(global)?)?;
    let imported = handler.import(&args.id).await?;
    println!("imported {} as {}", imported.id, address);
    state.insert(address, imported);
    state.save(&path)
}

async fn exists(global: &GlobalArgs, args: IdArgs) -> Result<(), ApimError> {
    let handler = get_resource(&args.resource_type, context(global)?)?;
    println!("{}", handler.exists(&args.id).await?);
    Ok(())
}

fn parse_id(args: IdArgs) -> Result<(), ApimError> {
    let handler = get_resource(&args.resource_type, offline_context()?)?;
    let segments = handler.parse_id(&args.id)?;
    println!("{}", output::id_tree(&args.resource_type, &segments));
    Ok(())
}

fn show_state(global: &GlobalArgs) -> Result<(), ApimError> {
    let state = StateFile::load(&state_path(global)?)?;
    println!("{}", output::state_table(&state));
    Ok(())
}

fn show(global: &GlobalArgs, args: AddressArgs) -> Result<(), ApimError> {
    let state = StateFile::load(&state_path(global)?)?;
    println!("{}", output::attribute_table(tracked(&state, &args.address)?));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_address() {
        assert_eq!(
            split_address("azurerm_api_management_logger.main").unwrap(),
            ("azurerm_api_management_logger", "main")
        );
        assert!(split_address("no_dot").is_err());
        assert!(split_address(".main").is_err());
        assert!(split_address("type.").is_err());
    }

    #[test]
    fn test_context_requires_credentials() {
        let global = GlobalArgs {
            subscription_id: None,
            token: Some("t".to_string()),
            endpoint: "https://management.azure.com".to_string(),
            state: None,
            poll_interval_secs: 10,
            timeout_minutes: None,
            no_recover_soft_deleted: false,
            purge_soft_deleted: false,
        };
        let err = context(&global).unwrap_err();
        assert!(err.to_string().contains("ARM_SUBSCRIPTION_ID"));
    }

    #[test]
    fn test_context_applies_timeout_override() {
        let global = GlobalArgs {
            subscription_id: Some("sub".to_string()),
            token: Some("t".to_string()),
            endpoint: "http://127.0.0.1:1".to_string(),
            state: None,
            poll_interval_secs: 2,
            timeout_minutes: Some(1),
            no_recover_soft_deleted: true,
            purge_soft_deleted: true,
        };
        let ctx = context(&global).unwrap();
        assert_eq!(ctx.poll_interval, Duration::from_secs(2));
        assert_eq!(ctx.timeout_override, Some(Duration::from_secs(60)));
        assert!(!ctx.recover_soft_deleted);
        assert!(ctx.purge_soft_delete_on_destroy);
    }

    #[tokio::test]
    async fn test_import_refuses_already_tracked_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let id = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.ApiManagement/service/svc/workspaces/ws";

        let mut state = StateFile::default();
        state.insert(
            "azurerm_api_management_workspace.main",
            ResourceState {
                resource_type: "azurerm_api_management_workspace".to_string(),
                id: id.to_string(),
                attributes: serde_json::Map::new(),
            },
        );
        state.save(&path).unwrap();

        let global = GlobalArgs {
            subscription_id: Some("sub".to_string()),
            token: Some("t".to_string()),
            endpoint: "http://127.0.0.1:1".to_string(),
            state: Some(path),
            poll_interval_secs: 1,
            timeout_minutes: None,
            no_recover_soft_deleted: false,
            purge_soft_deleted: false,
        };
        let err = import(
            &global,
            ImportArgs {
                resource_type: "azurerm_api_management_workspace".to_string(),
                name: "other".to_string(),
                id: id.to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("already tracked"));
    }
}
