//! Provisioning service facade.
//!
//! Owns the connector registry and wires the mapping, propagation and
//! reconciliation engines around it.

use std::sync::Arc;

use tracing::{info, instrument};

use idsync_connector::{
    AttributeValue, Connector, ConnectorGateway, ConnectorRegistry, ExternalResource, Item,
    SecretCipher, SyncDelta,
};
use idsync_core::{AnyTypeKind, Entity, EntityStore, ResourceKey, SchemaStore};

use crate::cache::VirAttrCache;
use crate::config::ProvisioningConfig;
use crate::error::{ProvisioningError, Result};
use crate::expression::{ExpressionEvaluator, RhaiExpressionEvaluator};
use crate::mapping::outbound::OutboundOptions;
use crate::mapping::{InboundTarget, MappingEngine, PasswordGenerator, PreparedAttributes};
use crate::propagation::{
    ExecutionOutcome, LinkedAccountPropagation, PriorityPropagationExecutor, PropagationByResource,
    PropagationPlan, PropagationStatus, PropagationTaskBuilder,
};
use crate::reconciliation::{
    InMemorySyncTokenStore, ProvisioningResult, PullOptions, PushOptions, ReconciliationEngine,
    ReconciliationReport, SyncTokenStore,
};
use crate::resolver::InternalAttrReference;
use crate::workflow::{StoreWorkflowAdapter, WorkflowAdapter};

/// Builder for [`ProvisioningService`].
pub struct ProvisioningServiceBuilder {
    config: ProvisioningConfig,
    schemas: Arc<dyn SchemaStore>,
    store: Arc<dyn EntityStore>,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    workflow: Option<Arc<dyn WorkflowAdapter>>,
    tokens: Option<Arc<dyn SyncTokenStore>>,
    cipher: Option<SecretCipher>,
    passwords: Option<Arc<dyn PasswordGenerator>>,
}

impl ProvisioningServiceBuilder {
    #[must_use]
    pub fn with_config(mut self, config: ProvisioningConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the Rhai evaluator.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Route lifecycle transitions through `workflow` instead of writing to
    /// the store directly.
    #[must_use]
    pub fn with_workflow(mut self, workflow: Arc<dyn WorkflowAdapter>) -> Self {
        self.workflow = Some(workflow);
        self
    }

    #[must_use]
    pub fn with_token_store(mut self, tokens: Arc<dyn SyncTokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    #[must_use]
    pub fn with_cipher(mut self, cipher: SecretCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    #[must_use]
    pub fn with_password_generator(mut self, generator: Arc<dyn PasswordGenerator>) -> Self {
        self.passwords = Some(generator);
        self
    }

    /// Validate the configuration and assemble the engines.
    pub fn build(self) -> Result<ProvisioningService> {
        self.config.validate()?;

        let registry = Arc::new(ConnectorRegistry::new(self.config.gateway_settings()));
        let evaluator = self
            .evaluator
            .unwrap_or_else(|| Arc::new(RhaiExpressionEvaluator::new(&self.config.expression)));
        let cache = VirAttrCache::new(self.config.cache_ttl(), self.config.cache_max_capacity);

        let mut mapping = MappingEngine::new(
            self.schemas,
            Arc::clone(&self.store),
            Arc::clone(&registry),
            evaluator,
            cache,
        );
        if let Some(cipher) = self.cipher {
            mapping = mapping.with_cipher(cipher);
        }
        if let Some(generator) = self.passwords {
            mapping = mapping.with_password_generator(generator);
        }
        let mapping = Arc::new(mapping);

        let workflow = self
            .workflow
            .unwrap_or_else(|| Arc::new(StoreWorkflowAdapter::new(Arc::clone(&self.store))));
        let reconciliation = ReconciliationEngine::new(
            Arc::clone(&mapping),
            Arc::clone(&registry),
            workflow,
            self.config.clone(),
        );

        info!(
            async_propagation = self.config.async_propagation,
            pool_size = self.config.connector_pool_size,
            "Provisioning service initialized"
        );
        Ok(ProvisioningService {
            builder: PropagationTaskBuilder::new(Arc::clone(&mapping), Arc::clone(&registry)),
            executor: PriorityPropagationExecutor::new(Arc::clone(&registry)),
            tokens: self
                .tokens
                .unwrap_or_else(|| Arc::new(InMemorySyncTokenStore::new())),
            config: self.config,
            registry,
            mapping,
            reconciliation,
        })
    }
}

/// Entry point to mapping, propagation and reconciliation.
pub struct ProvisioningService {
    config: ProvisioningConfig,
    registry: Arc<ConnectorRegistry>,
    mapping: Arc<MappingEngine>,
    builder: PropagationTaskBuilder,
    executor: PriorityPropagationExecutor,
    reconciliation: ReconciliationEngine,
    tokens: Arc<dyn SyncTokenStore>,
}

impl std::fmt::Debug for ProvisioningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningService")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ProvisioningService {
    pub fn builder(
        schemas: Arc<dyn SchemaStore>,
        store: Arc<dyn EntityStore>,
    ) -> ProvisioningServiceBuilder {
        ProvisioningServiceBuilder {
            config: ProvisioningConfig::default(),
            schemas,
            store,
            evaluator: None,
            workflow: None,
            tokens: None,
            cipher: None,
            passwords: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectorRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn mapping(&self) -> &Arc<MappingEngine> {
        &self.mapping
    }

    #[must_use]
    pub fn reconciliation(&self) -> &ReconciliationEngine {
        &self.reconciliation
    }

    /// Register a resource with its connector.
    pub async fn register(
        &self,
        resource: ExternalResource,
        connector: Arc<dyn Connector>,
    ) -> Arc<ConnectorGateway> {
        self.registry.register(resource, connector).await
    }

    /// Remove a resource, disposing its connector.
    pub async fn unregister(&self, resource: &ResourceKey) -> bool {
        self.registry.unregister(resource).await
    }

    /// Parse an internal attribute expression.
    pub fn resolve(&self, expression: &str, kind: AnyTypeKind) -> Result<InternalAttrReference> {
        self.mapping.resolver().resolve(expression, kind)
    }

    /// Remote attributes of `entity` on `resource`.
    pub async fn prepare_outbound(
        &self,
        entity: &Entity,
        resource: &ResourceKey,
        options: &OutboundOptions,
    ) -> Result<PreparedAttributes> {
        let gateway = self.registry.find(resource).await.ok_or_else(|| {
            ProvisioningError::ResourceNotFound {
                resource: resource.clone(),
            }
        })?;
        let provision = gateway.resource().provision(&entity.any_type).ok_or_else(|| {
            ProvisioningError::ProvisionNotFound {
                resource: resource.clone(),
                any_type: entity.any_type.clone(),
            }
        })?;
        self.mapping
            .prepare_outbound(entity, gateway.resource(), provision, options)
            .await
    }

    /// Write one remote attribute onto `target`.
    pub async fn apply_inbound(
        &self,
        values: Option<&[AttributeValue]>,
        item: &Item,
        target: &mut InboundTarget,
    ) -> Result<()> {
        self.mapping.apply_inbound(values, item, target).await
    }

    /// Current values of a virtual schema, through the cache.
    pub async fn virtual_values(&self, entity: &Entity, schema: &str) -> Vec<String> {
        self.mapping.virtual_values(entity, schema).await
    }

    /// Tasks for the intended per-resource operations, with a failed status
    /// for every target no task could be built for.
    pub async fn build_propagation_tasks(
        &self,
        entity: &Entity,
        by_resource: &PropagationByResource,
        by_linked_account: Option<&LinkedAccountPropagation>,
        options: &OutboundOptions,
        excluded: &[ResourceKey],
    ) -> PropagationPlan {
        self.builder
            .build(entity, by_resource, by_linked_account, options, excluded)
            .await
    }

    /// Run a plan, in async mode when configured.
    pub async fn execute(&self, plan: impl Into<PropagationPlan>) -> ExecutionOutcome {
        self.executor
            .execute(plan, self.config.async_propagation)
            .await
    }

    /// Run a plan with an explicit mode.
    pub async fn execute_with_mode(
        &self,
        plan: impl Into<PropagationPlan>,
        async_mode: bool,
    ) -> ExecutionOutcome {
        self.executor.execute(plan, async_mode).await
    }

    /// Build and run tasks for `entity`, waiting for every status.
    #[instrument(skip(self, entity, by_resource, options), fields(entity = %entity.key))]
    pub async fn provision(
        &self,
        entity: &Entity,
        by_resource: &PropagationByResource,
        options: &OutboundOptions,
    ) -> Vec<PropagationStatus> {
        let plan = self
            .build_propagation_tasks(entity, by_resource, None, options, &[])
            .await;
        self.executor.execute_and_wait(plan).await
    }

    /// Reconcile one delta.
    pub async fn reconcile(
        &self,
        resource: &ResourceKey,
        any_type: &str,
        delta: &SyncDelta,
        options: &PullOptions,
    ) -> ProvisioningResult {
        self.reconciliation
            .reconcile(resource, any_type, delta, options)
            .await
    }

    /// Pull changes since the stored sync token.
    pub async fn pull_incremental(
        &self,
        resource: &ResourceKey,
        any_type: &str,
        options: &PullOptions,
    ) -> Result<ReconciliationReport> {
        self.reconciliation
            .pull_incremental(resource, any_type, options, self.tokens.as_ref())
            .await
    }

    /// Pull every remote object.
    pub async fn pull_full(
        &self,
        resource: &ResourceKey,
        any_type: &str,
        options: &PullOptions,
    ) -> Result<ReconciliationReport> {
        self.reconciliation.pull_full(resource, any_type, options).await
    }

    /// Push one entity.
    pub async fn push(
        &self,
        resource: &ResourceKey,
        entity: &Entity,
        options: &PushOptions,
    ) -> ProvisioningResult {
        self.reconciliation
            .push_entity(resource, entity, options)
            .await
    }

    /// Push every entity of an any type.
    pub async fn push_all(
        &self,
        resource: &ResourceKey,
        any_type: &str,
        options: &PushOptions,
    ) -> Result<ReconciliationReport> {
        self.reconciliation.push_all(resource, any_type, options).await
    }
}
