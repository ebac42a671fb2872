use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::arm::DEFAULT_ENDPOINT;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug)]
pub struct GlobalArgs {
    /// Azure subscription that owns the API Management services.
    #[arg(long, global = true, env = "ARM_SUBSCRIPTION_ID")]
    pub subscription_id: Option<String>,

    /// Bearer token for Azure Resource Manager.
    #[arg(long, global = true, env = "ARM_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, global = true, env = "ARM_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// State file; defaults to the platform data directory.
    #[arg(long, global = true, env = "APIM_STATE")]
    pub state: Option<PathBuf>,

    #[arg(long, global = true, default_value_t = 10)]
    pub poll_interval_secs: u64,

    /// Overrides the per-resource operation deadline.
    #[arg(long, global = true)]
    pub timeout_minutes: Option<u64>,

    /// Fail instead of restoring a soft-deleted service with the same name.
    #[arg(long, global = true)]
    pub no_recover_soft_deleted: bool,

    /// Purge a deleted service's soft-deleted copy as well.
    #[arg(long, global = true)]
    pub purge_soft_deleted: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List supported resource types and their ID formats.
    Resources,
    /// Validate a configuration file without contacting Azure.
    Validate(TypedConfigArgs),
    /// Create an entity and track it under `{type}.{name}`.
    Create(CreateArgs),
    /// Refresh a tracked entity from Azure.
    Read(AddressArgs),
    /// Show what an update would change.
    Plan(UpdateArgs),
    /// Apply a new configuration to a tracked entity.
    Update(UpdateArgs),
    /// Delete a tracked entity.
    Delete(AddressArgs),
    /// Start tracking an existing entity.
    Import(ImportArgs),
    /// Check whether an entity exists.
    Exists(IdArgs),
    /// Parse an ID and print its segments.
    ParseId(IdArgs),
    /// List tracked entities.
    State,
    /// Print the attributes of a tracked entity.
    Show(AddressArgs),
}

#[derive(clap::Args, Debug)]
pub struct TypedConfigArgs {
    pub resource_type: String,

    /// JSON file with the entity's attributes.
    #[arg(long, short)]
    pub config: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct CreateArgs {
    pub resource_type: String,

    /// Local name; the entity is tracked as `{type}.{name}`.
    pub name: String,

    #[arg(long, short)]
    pub config: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct AddressArgs {
    /// `{type}.{name}`
    pub address: String,
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    pub address: String,

    #[arg(long, short)]
    pub config: PathBuf,

    /// Fail instead of deleting and recreating when a changed field cannot
    /// be updated in place.
    #[arg(long)]
    pub no_replace: bool,
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    pub resource_type: String,
    pub name: String,
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct IdArgs {
    pub resource_type: String,
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    #[test]
    fn test_create_args() {
        let cli = Cli::parse_from([
            "apim",
            "create",
            "azurerm_api_management_logger",
            "main",
            "--config=logger.json",
        ]);

        if let Command::Create(args) = cli.command {
            assert_eq!(args.resource_type, "azurerm_api_management_logger");
            assert_eq!(args.name, "main");
            assert_eq!(args.config, PathBuf::from("logger.json"));
        } else {
            panic!("Expected Create command, got {:?}", cli.command);
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "apim",
            "read",
            "azurerm_api_management_logger.main",
            "--subscription-id=sub",
            "--poll-interval-secs=1",
            "--timeout-minutes=3",
        ]);
        assert_eq!(cli.global.subscription_id, Some("sub".to_string()));
        assert_eq!(cli.global.poll_interval_secs, 1);
        assert_eq!(cli.global.timeout_minutes, Some(3));
        assert!(!cli.global.no_recover_soft_deleted);
        assert!(!cli.global.purge_soft_deleted);
        assert!(matches!(cli.command, Command::Read(_)));
    }

    #[test]
    fn test_soft_delete_flags() {
        let cli = Cli::parse_from([
            "apim",
            "delete",
            "azurerm_api_management.main",
            "--purge-soft-deleted",
            "--no-recover-soft-deleted",
        ]);
        assert!(cli.global.no_recover_soft_deleted);
        assert!(cli.global.purge_soft_deleted);
    }

    #[test]
    fn test_update_replaces_by_default() {
        let cli = Cli::parse_from(["apim", "update", "a.b", "-c", "x.json"]);
        if let Command::Update(args) = cli.command {
            assert!(!args.no_replace);
        } else {
            panic!("Expected Update command, got {:?}", cli.command);
        }
    }

    #[test]
    fn test_parse_id_args() {
        let cli = Cli::parse_from(["apim", "parse-id", "azurerm_api_management", "/subscriptions/x"]);
        if let Command::ParseId(args) = cli.command {
            assert_eq!(args.resource_type, "azurerm_api_management");
            assert_eq!(args.id, "/subscriptions/x");
        } else {
            panic!("Expected ParseId command, got {:?}", cli.command);
        }
    }

    #[test]
    #[serial]
    fn test_no_flags_provided() {
        let token_backup = std::env::var("ARM_ACCESS_TOKEN").ok();
        let endpoint_backup = std::env::var("ARM_ENDPOINT").ok();
        unsafe {
            std::env::remove_var("ARM_ACCESS_TOKEN");
            std::env::remove_var("ARM_ENDPOINT");
        }

        let cli = Cli::parse_from(["apim", "state"]);

        unsafe {
            if let Some(token) = token_backup {
                std::env::set_var("ARM_ACCESS_TOKEN", token);
            }
            if let Some(endpoint) = endpoint_backup {
                std::env::set_var("ARM_ENDPOINT", endpoint);
            }
        }

        assert!(cli.global.token.is_none());
        assert_eq!(cli.global.endpoint, "https://management.azure.com");
    }

    #[test]
    #[serial]
    fn test_cli_flag_takes_precedence_over_env() {
        let token_backup = std::env::var("ARM_ACCESS_TOKEN").ok();

        unsafe {
            std::env::set_var("ARM_ACCESS_TOKEN", "env_token");
        }

        let cli = Cli::parse_from(["apim", "state", "--token=cli_token"]);

        unsafe {
            match token_backup {
                Some(token) => std::env::set_var("ARM_ACCESS_TOKEN", token),
                None => std::env::remove_var("ARM_ACCESS_TOKEN"),
            }
        }

        assert_eq!(cli.global.token, Some("cli_token".to_string()));
    }

    #[test]
    #[serial]
    fn test_subscription_from_env_var_fallback() {
        let backup = std::env::var("ARM_SUBSCRIPTION_ID").ok();

        unsafe {
            std::env::set_var("ARM_SUBSCRIPTION_ID", "env_sub_123");
        }

        let cli = Cli::parse_from(["apim", "state"]);

        unsafe {
            match backup {
                Some(sub) => std::env::set_var("ARM_SUBSCRIPTION_ID", sub),
                None => std::env::remove_var("ARM_SUBSCRIPTION_ID"),
            }
        }

        assert_eq!(cli.global.subscription_id, Some("env_sub_123".to_string()));
    }
}
