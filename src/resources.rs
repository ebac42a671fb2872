pub mod api;
pub mod api_operation;
pub mod backend;
pub mod diagnostic;
pub mod gateway;
pub mod gateway_hostname_configuration;
pub mod logger;
pub mod named_value;
pub mod policy;
pub mod service;
pub mod subscription;
pub mod workspace;

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::arm::{ArmClient, ArmError, Poller};
use crate::config::ProviderConfig;
use crate::error::ApimError;
use crate::ids::{ResourceId, format_template};
use crate::resource::{
    ArmResource, Plan, ResourceState, SoftDeleted, Timeouts, merge_computed, plan_change,
};
use crate::validate::ValidationError;

/// Everything an operator needs to reach ARM.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub client: ArmClient,
    pub subscription_id: String,
    pub poll_interval: Duration,
    /// Overrides every per-kind deadline when set.
    pub timeout_override: Option<Duration>,
    /// Restore a soft-deleted entity instead of failing when creating over it.
    pub recover_soft_deleted: bool,
    /// Permanently remove the soft-deleted copy a delete leaves behind.
    pub purge_soft_delete_on_destroy: bool,
}

impl ProviderContext {
    pub fn new(client: ArmClient, subscription_id: impl Into<String>) -> Self {
        Self {
            client,
            subscription_id: subscription_id.into(),
            poll_interval: crate::arm::DEFAULT_POLL_INTERVAL,
            timeout_override: None,
            recover_soft_deleted: true,
            purge_soft_delete_on_destroy: false,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, ApimError> {
        let client = config.client()?;
        Ok(Self {
            client,
            subscription_id: config.subscription_id.clone(),
            poll_interval: config.poll_interval,
            timeout_override: None,
            recover_soft_deleted: config.recover_soft_deleted,
            purge_soft_delete_on_destroy: config.purge_soft_delete_on_destroy,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, after: Duration) -> Self {
        self.timeout_override = Some(after);
        self
    }

    pub fn with_soft_delete(mut self, recover: bool, purge_on_destroy: bool) -> Self {
        self.recover_soft_deleted = recover;
        self.purge_soft_delete_on_destroy = purge_on_destroy;
        self
    }
}

/// Type-erased lifecycle of one resource kind, addressed by type name.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn resource_type(&self) -> &'static str;

    /// The ID template, e.g. `/subscriptions/{subscription_id}/...`.
    fn id_format(&self) -> String;

    /// Strictly parses `id`, returning its named segments in hierarchy order.
    fn parse_id(&self, id: &str) -> Result<Vec<(&'static str, String)>, ApimError>;

    fn validate(&self, config: &Value) -> Result<(), ApimError>;

    fn plan(&self, prior: &ResourceState, config: &Value) -> Result<Plan, ApimError>;

    async fn create(&self, config: &Value) -> Result<ResourceState, ApimError>;

    /// `Ok(None)` when the entity is gone and the state should be dropped.
    async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>, ApimError>;

    async fn update(&self, prior: &ResourceState, config: &Value)
    -> Result<ResourceState, ApimError>;

    async fn delete(&self, id: &str) -> Result<(), ApimError>;

    async fn import(&self, id: &str) -> Result<ResourceState, ApimError>;

    async fn exists(&self, id: &str) -> Result<bool, ApimError>;
}

/// Drives the CRUD lifecycle for any [`ArmResource`].
pub struct Operator<R: ArmResource> {
    ctx: ProviderContext,
    _kind: PhantomData<fn() -> R>,
}

impl<R: ArmResource> Operator<R> {
    pub fn new(ctx: ProviderContext) -> Self {
        Self {
            ctx,
            _kind: PhantomData,
        }
    }

    fn timeouts(&self) -> Timeouts {
        match self.ctx.timeout_override {
            Some(after) => Timeouts::uniform(after),
            None => R::timeouts(),
        }
    }

    fn if_match() -> Option<&'static str> {
        R::IF_MATCH.then_some("*")
    }

    pub fn parse_config(config: &Value) -> Result<R::Config, ApimError> {
        let config: R::Config = serde_json::from_value(config.clone())
            .map_err(|e| ValidationError::from_config(R::TYPE_NAME, e))?;
        R::validate(&config)?;
        Ok(config)
    }

    fn attributes(config: &R::Config) -> Result<Map<String, Value>, ApimError> {
        match serde_json::to_value(config)? {
            Value::Object(map) => Ok(map),
            other => Err(ApimError::Config(format!(
                "{} configuration serialized to {} instead of an object",
                R::TYPE_NAME,
                other
            ))),
        }
    }

    fn to_state(id: &R::Id, config: &R::Config) -> Result<ResourceState, ApimError> {
        Ok(ResourceState {
            resource_type: R::TYPE_NAME.to_string(),
            id: id.id(),
            attributes: Self::attributes(config)?,
        })
    }

    /// State written by an older build may not deserialize; it is then ignored.
    fn prior_config(state: &ResourceState) -> Option<R::Config> {
        serde_json::from_value(Value::Object(state.attributes.clone())).ok()
    }

    fn check_type(state: &ResourceState) -> Result<(), ApimError> {
        if state.resource_type != R::TYPE_NAME {
            return Err(ApimError::Config(format!(
                "state entry is a {}, not a {}",
                state.resource_type,
                R::TYPE_NAME
            )));
        }
        Ok(())
    }

    async fn within<T, F>(
        operation: &'static str,
        id: &R::Id,
        after: Duration,
        fut: F,
    ) -> Result<T, ApimError>
    where
        F: Future<Output = Result<T, ApimError>>,
    {
        tokio::time::timeout(after, fut)
            .await
            .map_err(|_| ApimError::Timeout {
                operation,
                id: id.to_string(),
                after,
            })?
    }

    async fn fetch(&self, id: &R::Id) -> Result<Option<R::Model>, ApimError> {
        match self
            .ctx
            .client
            .get_model::<R::Model>(&id.id(), R::API_VERSION)
            .await
        {
            Ok(model) => Ok(Some(model)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(ApimError::remote(format!("retrieving {}", id), e)),
        }
    }

    async fn put_and_wait(
        &self,
        id: &R::Id,
        model: &R::Model,
        verb: &str,
        if_match: Option<&str>,
    ) -> Result<(), ApimError> {
        let path = id.id();
        let client = &self.ctx.client;
        let response = client
            .put(&path, R::API_VERSION, model, if_match)
            .await
            .map_err(|e| ApimError::remote(format!("{} {}", verb, id), e))?;

        Poller::new(client, self.ctx.poll_interval)
            .wait(&response, &path, R::API_VERSION)
            .await
            .map_err(|e| ApimError::remote(format!("polling after {} {}", verb, id), e))
    }

    async fn read_inner(
        &self,
        id: &R::Id,
        prior: Option<&R::Config>,
    ) -> Result<Option<ResourceState>, ApimError> {
        match self.fetch(id).await? {
            Some(model) => {
                let config = R::flatten(id, &model, prior);
                Self::to_state(id, &config).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Restores a soft-deleted entity in the way of a create, if there is one.
    async fn recover(&self, id: &R::Id, deleted: SoftDeleted<R::Model>) -> Result<(), ApimError> {
        match self.ctx.client.get(&deleted.path, R::API_VERSION).await {
            Ok(_) => {}
            // Without subscription-wide read access ARM answers 403 rather than 404.
            Err(e) if e.is_not_found() || e.status() == Some(403) => return Ok(()),
            Err(e) => {
                return Err(ApimError::remote(
                    format!("checking for a soft-deleted copy of {}", id),
                    e,
                ));
            }
        }

        if !self.ctx.recover_soft_deleted {
            return Err(ApimError::SoftDeleted {
                resource_type: R::TYPE_NAME.to_string(),
                path: deleted.path,
            });
        }

        tracing::info!(id = %id.id(), deleted = %deleted.path, "recovering soft-deleted");
        loop {
            // ARM rejects restores with 400 for a while after the delete settles.
            match self
                .put_and_wait(id, &deleted.restore, "recovering", Self::if_match())
                .await
            {
                Err(ApimError::Remote {
                    source: ArmError::Api { status: 400, .. },
                    ..
                }) => {
                    tracing::debug!(id = %id.id(), "restore rejected, retrying");
                    tokio::time::sleep(self.ctx.poll_interval).await;
                }
                other => return other,
            }
        }
    }

    async fn purge(&self, id: &R::Id, path: &str) -> Result<(), ApimError> {
        let client = &self.ctx.client;
        let response = match client.delete(path, R::API_VERSION, None).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => {
                return Err(ApimError::remote(
                    format!("purging the soft-deleted copy of {}", id),
                    e,
                ));
            }
        };

        match Poller::new(client, self.ctx.poll_interval)
            .wait(&response, path, R::API_VERSION)
            .await
        {
            Ok(()) | Err(ArmError::NotFound { .. }) => {
                tracing::info!(deleted = %path, "purged");
                Ok(())
            }
            Err(e) => Err(ApimError::remote(
                format!("polling after purging the soft-deleted copy of {}", id),
                e,
            )),
        }
    }

    fn not_found(id: &R::Id) -> ApimError {
        ApimError::NotFound {
            resource_type: R::TYPE_NAME.to_string(),
            id: id.id(),
        }
    }

    pub async fn create_config(&self, mut config: R::Config) -> Result<ResourceState, ApimError> {
        R::assign_generated(&mut config);
        let id = R::id_from_config(&self.ctx.subscription_id, &config);
        let after = self.timeouts().create;

        Self::within("creating", &id, after, async {
            match self.ctx.client.get(&id.id(), R::API_VERSION).await {
                Ok(_) => {
                    return Err(ApimError::RequiresImport {
                        resource_type: R::TYPE_NAME.to_string(),
                        id: id.id(),
                    });
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    return Err(ApimError::remote(
                        format!("checking for presence of existing {}", id),
                        e,
                    ));
                }
            }

            if let Some(deleted) = R::soft_deleted(&self.ctx.subscription_id, &config) {
                self.recover(&id, deleted).await?;
            }
            if let Some(staged) = R::staged_model(&config, None) {
                self.put_and_wait(&id, &staged, "importing into", None).await?;
            }

            let model = R::expand(&config);
            self.put_and_wait(&id, &model, "creating", Self::if_match()).await?;
            tracing::info!(id = %id.id(), resource_type = R::TYPE_NAME, "created");

            self.read_inner(&id, Some(&config))
                .await?
                .ok_or_else(|| Self::not_found(&id))
        })
        .await
    }

    pub fn plan_config(&self, prior: &ResourceState, config: &R::Config) -> Result<Plan, ApimError> {
        Self::check_type(prior)?;
        let desired = Self::attributes(config)?;
        Ok(plan_change(R::FORCE_NEW, R::COMPUTED, &prior.attributes, &desired))
    }

    pub async fn update_config(
        &self,
        prior: &ResourceState,
        config: R::Config,
    ) -> Result<ResourceState, ApimError> {
        let id = R::Id::parse(&prior.id)?;

        if let Plan::Replace { fields } = self.plan_config(prior, &config)? {
            return Err(ApimError::ForceNew {
                resource_type: R::TYPE_NAME.to_string(),
                id: id.id(),
                fields,
            });
        }

        let mut desired = Self::attributes(&config)?;
        merge_computed(R::COMPUTED, &prior.attributes, &mut desired);
        let merged: R::Config = serde_json::from_value(Value::Object(desired))?;
        let prior_config = Self::prior_config(prior);

        let after = self.timeouts().update;
        Self::within("updating", &id, after, async {
            if let Some(staged) = R::staged_model(&merged, prior_config.as_ref()) {
                self.put_and_wait(&id, &staged, "importing into", None).await?;
            }

            let model = R::expand(&merged);
            self.put_and_wait(&id, &model, "updating", Self::if_match()).await?;
            tracing::info!(id = %id.id(), resource_type = R::TYPE_NAME, "updated");

            self.read_inner(&id, Some(&merged))
                .await?
                .ok_or_else(|| Self::not_found(&id))
        })
        .await
    }

    pub async fn read_state(&self, state: &ResourceState) -> Result<Option<ResourceState>, ApimError> {
        Self::check_type(state)?;
        let id = R::Id::parse(&state.id)?;
        let prior = Self::prior_config(state);

        let after = self.timeouts().read;
        let refreshed = Self::within("reading", &id, after, self.read_inner(&id, prior.as_ref())).await?;
        if refreshed.is_none() {
            tracing::info!(id = %id.id(), resource_type = R::TYPE_NAME, "does not exist - removing from state");
        }
        Ok(refreshed)
    }

    pub async fn delete_id(&self, raw_id: &str) -> Result<(), ApimError> {
        let id = R::Id::parse(raw_id)?;
        let path = id.id();
        let client = &self.ctx.client;
        let after = self.timeouts().delete;

        Self::within("deleting", &id, after, async {
            let purge_path = if self.ctx.purge_soft_delete_on_destroy {
                self.fetch(&id)
                    .await?
                    .and_then(|model| R::purge_path(&id, &model))
            } else {
                None
            };

            let response = match client.delete(&path, R::API_VERSION, Self::if_match()).await {
                Ok(response) => response,
                Err(e) if e.is_not_found() => {
                    tracing::info!(id = %path, "already absent");
                    return Ok(());
                }
                Err(e) => return Err(ApimError::remote(format!("deleting {}", id), e)),
            };

            match Poller::new(client, self.ctx.poll_interval)
                .wait(&response, &path, R::API_VERSION)
                .await
            {
                Ok(()) => {}
                Err(ArmError::NotFound { .. }) => {}
                Err(e) => return Err(ApimError::remote(format!("polling after deleting {}", id), e)),
            }
            tracing::info!(id = %path, resource_type = R::TYPE_NAME, "deleted");

            if let Some(purge_path) = purge_path {
                self.purge(&id, &purge_path).await?;
            }
            Ok(())
        })
        .await
    }

    pub async fn import_id(&self, raw_id: &str) -> Result<ResourceState, ApimError> {
        let id = R::Id::parse(raw_id)?;
        let after = self.timeouts().read;
        Self::within("importing", &id, after, self.read_inner(&id, None))
            .await?
            .ok_or_else(|| Self::not_found(&id))
    }

    pub async fn exists_id(&self, raw_id: &str) -> Result<bool, ApimError> {
        let id = R::Id::parse(raw_id)?;
        let after = self.timeouts().read;
        Self::within("checking", &id, after, async {
            match self.ctx.client.get(&id.id(), R::API_VERSION).await {
                Ok(_) => Ok(true),
                Err(e) if e.is_not_found() => Ok(false),
                Err(e) => Err(ApimError::remote(format!("checking existence of {}", id), e)),
            }
        })
        .await
    }
}

#[async_trait]
impl<R: ArmResource> ResourceHandler for Operator<R> {
    fn resource_type(&self) -> &'static str {
        R::TYPE_NAME
    }

    fn id_format(&self) -> String {
        format_template(&R::Id::template())
    }

    fn parse_id(&self, id: &str) -> Result<Vec<(&'static str, String)>, ApimError> {
        Ok(R::Id::parse(id)?.segments())
    }

    fn validate(&self, config: &Value) -> Result<(), ApimError> {
        Self::parse_config(config).map(|_| ())
    }

    fn plan(&self, prior: &ResourceState, config: &Value) -> Result<Plan, ApimError> {
        let config = Self::parse_config(config)?;
        self.plan_config(prior, &config)
    }

    async fn create(&self, config: &Value) -> Result<ResourceState, ApimError> {
        let config = Self::parse_config(config)?;
        self.create_config(config).await
    }

    async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>, ApimError> {
        self.read_state(state).await
    }

    async fn update(
        &self,
        prior: &ResourceState,
        config: &Value,
    ) -> Result<ResourceState, ApimError> {
        let config = Self::parse_config(config)?;
        self.update_config(prior, config).await
    }

    async fn delete(&self, id: &str) -> Result<(), ApimError> {
        self.delete_id(id).await
    }

    async fn import(&self, id: &str) -> Result<ResourceState, ApimError> {
        self.import_id(id).await
    }

    async fn exists(&self, id: &str) -> Result<bool, ApimError> {
        self.exists_id(id).await
    }
}

pub(crate) fn default_true() -> bool {
    true
}

const RESOURCE_TYPES: &[&str] = &[
    service::ApiManagementService::TYPE_NAME,
    api::Api::TYPE_NAME,
    api_operation::ApiOperation::TYPE_NAME,
    policy::ServicePolicy::TYPE_NAME,
    policy::ApiPolicy::TYPE_NAME,
    policy::ApiOperationPolicy::TYPE_NAME,
    logger::Logger::TYPE_NAME,
    diagnostic::ServiceDiagnostic::TYPE_NAME,
    diagnostic::ApiDiagnostic::TYPE_NAME,
    gateway::Gateway::TYPE_NAME,
    gateway_hostname_configuration::GatewayHostnameConfiguration::TYPE_NAME,
    workspace::Workspace::TYPE_NAME,
    subscription::Subscription::TYPE_NAME,
    backend::Backend::TYPE_NAME,
    named_value::NamedValue::TYPE_NAME,
];

pub fn resource_types() -> &'static [&'static str] {
    RESOURCE_TYPES
}

pub fn get_resource(
    name: &str,
    ctx: ProviderContext,
) -> Result<Box<dyn ResourceHandler>, ApimError> {
    let handler: Box<dyn ResourceHandler> = match name {
        service::ApiManagementService::TYPE_NAME => {
            Box::new(Operator::<service::ApiManagementService>::new(ctx))
        }
        api::Api::TYPE_NAME => Box::new(Operator::<api::Api>::new(ctx)),
        api_operation::ApiOperation::TYPE_NAME => {
            Box::new(Operator::<api_operation::ApiOperation>::new(ctx))
        }
        policy::ServicePolicy::TYPE_NAME => Box::new(Operator::<policy::ServicePolicy>::new(ctx)),
        policy::ApiPolicy::TYPE_NAME => Box::new(Operator::<policy::ApiPolicy>::new(ctx)),
        policy::ApiOperationPolicy::TYPE_NAME => {
            Box::new(Operator::<policy::ApiOperationPolicy>::new(ctx))
        }
        logger::Logger::TYPE_NAME => Box::new(Operator::<logger::Logger>::new(ctx)),
        diagnostic::ServiceDiagnostic::TYPE_NAME => {
            Box::new(Operator::<diagnostic::ServiceDiagnostic>::new(ctx))
        }
        diagnostic::ApiDiagnostic::TYPE_NAME => {
            Box::new(Operator::<diagnostic::ApiDiagnostic>::new(ctx))
        }
        gateway::Gateway::TYPE_NAME => Box::new(Operator::<gateway::Gateway>::new(ctx)),
        gateway_hostname_configuration::GatewayHostnameConfiguration::TYPE_NAME => Box::new(
            Operator::<gateway_hostname_configuration::GatewayHostnameConfiguration>::new(ctx),
        ),
        workspace::Workspace::TYPE_NAME => Box::new(Operator::<workspace::Workspace>::new(ctx)),
        subscription::Subscription::TYPE_NAME => {
            Box::new(Operator::<subscription::Subscription>::new(ctx))
        }
        backend::Backend::TYPE_NAME => Box::new(Operator::<backend::Backend>::new(ctx)),
        named_value::NamedValue::TYPE_NAME => {
            Box::new(Operator::<named_value::NamedValue>::new(ctx))
        }
        other => return Err(ApimError::UnknownResourceType(other.to_string())),
    };
    Ok(handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ProviderContext {
        let client = ArmClient::new("test_token".to_string()).unwrap();
        ProviderContext::new(client, "00000000-0000-0000-0000-000000000000")
    }

    #[test]
    fn test_every_listed_type_resolves() {
        for name in resource_types() {
            let handler = get_resource(name, ctx()).unwrap();
            assert_eq!(handler.resource_type(), *name);
        }
    }

    #[test]
    fn test_get_resource_unknown() {
        let result = get_resource("azurerm_api_management_unicorn", ctx());
        match result {
            Err(ApimError::UnknownResourceType(name)) => {
                assert_eq!(name, "azurerm_api_management_unicorn")
            }
            _ => panic!("expected UnknownResourceType error"),
        }
    }

    #[test]
    fn test_id_format_for_logger() {
        let handler = get_resource("azurerm_api_management_logger", ctx()).unwrap();
        assert_eq!(
            handler.id_format(),
            "/subscriptions/{subscription_id}/resourceGroups/{resource_group_name}/providers/Microsoft.ApiManagement/service/{service_name}/loggers/{logger_id}"
        );
    }

    #[test]
    fn test_validate_rejects_unknown_fields() {
        let handler = get_resource("azurerm_api_management_workspace", ctx()).unwrap();
        let err = handler
            .validate(&serde_json::json!({
                "name": "ws",
                "api_management_name": "svc",
                "resource_group_name": "rg",
                "display_name": "Workspace",
                "bogus": true
            }))
            .unwrap_err();
        assert!(matches!(err, ApimError::Validation(_)));
    }

    #[test]
    fn test_plan_rejects_state_of_other_type() {
        let handler = get_resource("azurerm_api_management_workspace", ctx()).unwrap();
        let state = ResourceState {
            resource_type: "azurerm_api_management_logger".to_string(),
            id: "/x".to_string(),
            attributes: Map::new(),
        };
        let err = handler
            .plan(
                &state,
                &serde_json::json!({
                    "name": "ws",
                    "api_management_name": "svc",
                    "resource_group_name": "rg",
                    "display_name": "Workspace"
                }),
            )
            .unwrap_err();
        assert!(matches!(err, ApimError::Config(_)));
    }

    #[test]
    fn test_parse_id_returns_named_segments() {
        let handler = get_resource("azurerm_api_management_gateway", ctx()).unwrap();
        let segments = handler
            .parse_id("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.ApiManagement/service/svc/gateways/gw")
            .unwrap();
        assert_eq!(
            segments,
            vec![
                ("subscription_id", "sub".to_string()),
                ("resource_group_name", "rg".to_string()),
                ("service_name", "svc".to_string()),
                ("gateway_id", "gw".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_rejects_malformed_id_before_network() {
        let handler = get_resource("azurerm_api_management_gateway", ctx()).unwrap();
        let err = handler.delete("not-an-id").await.unwrap_err();
        assert!(matches!(err, ApimError::InvalidId(_)));
    }
}
