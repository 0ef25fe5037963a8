//! Per-component module contract (§4.4) and the registry that replaces
//! the source's dynamic dispatch over module objects (§9): a
//! `ComponentController` capability interface plus a `Registry` keyed by
//! component name, which the diff engine walks instead of resolving a
//! string to a Python module.

pub mod cache;
pub mod coordinator;
pub mod document_db;
pub mod function_controller;
pub mod invoker;
pub mod message_log;
pub mod mongo_proxy;
pub mod monitoring;
pub mod object_store;
pub mod quota_enforcer;
pub mod registry;
pub mod relational_db;
pub mod static_gateway;
pub mod vector_db;
pub mod vector_db_coordinator;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

use crate::config::ConfigStore;
use crate::crd::whisk::Whisk;
use crate::error::Result;
use crate::k8s::adapter::KubeAdapter;
use crate::template::Renderer;

/// Shared context every component call receives: the adapter, the
/// template renderer, and the process-wide configuration store. Built
/// once per reconciler and cloned (cheaply, via `Arc`) into every
/// component call.
#[derive(Clone)]
pub struct ComponentContext {
    pub adapter: Arc<KubeAdapter>,
    pub renderer: Arc<Renderer>,
    pub config: Arc<ConfigStore>,
}

impl ComponentContext {
    /// Narrow accessor for components that need the raw `kube::Client` for
    /// calls the adapter doesn't wrap directly (e.g. pod readiness
    /// polling via `kube::runtime::wait`).
    pub fn adapter_client(&self) -> kube::Client {
        self.adapter.client()
    }
}

/// Capability interface every managed subsystem implements (§4.4, §9).
/// `dependencies` lets the registry double-check the DAG independently of
/// [`crate::crd::whisk::Components::prerequisites`].
#[async_trait]
pub trait ComponentController: Send + Sync {
    fn name(&self) -> &'static str;

    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    /// Composes templates, applies them, waits for readiness, and runs
    /// post-install side effects (admin users, buckets, indexes), then
    /// annotates `cm/config` with any derived endpoints.
    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()>;

    /// Deletes the manifests and their externally-provisioned side
    /// effects.
    async fn delete(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()>;

    /// The diff engine's multiplexer: dispatches to `create`/`delete`
    /// based on the classified action. `Update` defaults to re-running
    /// `create` (idempotent re-apply), which matches the source's
    /// generic `patch` fallback unless a component overrides it.
    async fn patch(
        &self,
        ctx: &ComponentContext,
        whisk: &Whisk,
        owner: &OwnerReference,
        action: crate::diff::Action,
    ) -> Result<()> {
        match action {
            crate::diff::Action::Create | crate::diff::Action::Update => {
                self.create(ctx, whisk, owner).await
            }
            crate::diff::Action::Delete => self.delete(ctx, whisk, owner).await,
        }
    }
}

/// Component name → controller, in the order a fresh boot would create
/// them (§4.2). Built once at startup.
pub struct Registry {
    controllers: BTreeMap<&'static str, Arc<dyn ComponentController>>,
}

impl Registry {
    pub fn build() -> Self {
        let mut controllers: BTreeMap<&'static str, Arc<dyn ComponentController>> = BTreeMap::new();
        let all: Vec<Arc<dyn ComponentController>> = vec![
            Arc::new(document_db::DocumentDb),
            Arc::new(object_store::ObjectStore),
            Arc::new(cache::Cache),
            Arc::new(coordinator::Coordinator),
            Arc::new(registry::Registry_),
            Arc::new(message_log::MessageLog),
            Arc::new(relational_db::RelationalDb),
            Arc::new(mongo_proxy::MongoProxy),
            Arc::new(invoker::Invoker),
            Arc::new(function_controller::FunctionController),
            Arc::new(static_gateway::StaticGateway),
            Arc::new(vector_db_coordinator::VectorDbCoordinator),
            Arc::new(vector_db::VectorDb),
            Arc::new(quota_enforcer::QuotaEnforcer),
            Arc::new(monitoring::Monitoring),
        ];
        for controller in all {
            controllers.insert(controller.name(), controller);
        }
        Self { controllers }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ComponentController>> {
        self.controllers.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.controllers.keys().copied()
    }
}
