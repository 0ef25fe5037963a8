//! Controller wiring: context shared between the two reconcilers and the
//! web server, and `run()` which starts both the `Whisk` and `WhiskUser`
//! controllers concurrently against the same client and metrics registry.
//!
//! Grounded on the teacher's `Context`/`Diagnostics`/`State`/`run` shape;
//! generalized from one resource kind to two, and `ComponentContext` +
//! [`crate::components::Registry`] are threaded through so reconcile
//! handlers never construct their own adapter or renderer.

pub mod tenant;
pub mod whisk;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::runtime::events::Reporter;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{
    api::{Api, ListParams},
    client::Client,
    runtime::controller::{Action, Controller},
};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tracing::{error, info, trace};

use crate::components::{ComponentContext, Registry};
use crate::config::ConfigStore;
use crate::crd::whisk::Whisk;
use crate::crd::whisk_user::WhiskUser;
use crate::error::Error;
use crate::k8s::adapter::KubeAdapter;
use crate::metrics::Metrics;
use crate::template::Renderer;
use crate::templates;

/// Context shared by both reconcilers.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    pub metrics: Arc<Metrics>,
    pub components: Arc<ComponentContext>,
    pub registry: Arc<Registry>,
}

#[derive(Clone, Serialize)]
pub struct Diagnostics {
    #[serde(deserialize_with = "from_ts")]
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "whisk-operator".into(),
        }
    }
}

fn from_ts<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(DateTime::<Utc>::deserialize(deserializer).unwrap_or_else(|_| Utc::now()))
}

/// State shared between the controllers and the web server (`/health`,
/// `/metrics`, `/diagnostics`).
#[derive(Clone)]
pub struct State {
    diagnostics: Arc<RwLock<Diagnostics>>,
    metrics: Arc<Metrics>,
    components: Arc<ComponentContext>,
    registry: Arc<Registry>,
}

impl State {
    /// Builds the component context (adapter, renderer, config store) once
    /// at startup, registering reconcile metrics into `metrics_registry`
    /// (which the caller may already have populated, e.g. with the
    /// Kubernetes client's own request metrics). Fallible because
    /// discovery and config bootstrap both touch the outside world.
    pub async fn bootstrap(client: Client, metrics_registry: prometheus_client::registry::Registry) -> crate::error::Result<Self> {
        let adapter = Arc::new(KubeAdapter::new(client).await?);
        let renderer = Arc::new(Renderer::new(&templates::catalog())?);
        let config = Arc::new(ConfigStore::bootstrap()?);
        let components = Arc::new(ComponentContext {
            adapter,
            renderer,
            config,
        });
        Ok(Self {
            diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
            metrics: Arc::new(Metrics::new(metrics_registry)),
            components,
            registry: Arc::new(Registry::build()),
        })
    }

    pub fn metrics(&self) -> String {
        let mut buffer = String::new();
        let registry = &*self.metrics.registry;
        prometheus_client::encoding::text::encode(&mut buffer, registry).unwrap();
        buffer
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    pub fn to_context(&self, client: Client) -> Arc<Context> {
        Arc::new(Context {
            client,
            diagnostics: self.diagnostics.clone(),
            metrics: self.metrics.clone(),
            components: self.components.clone(),
            registry: self.registry.clone(),
        })
    }
}

fn error_policy<K: kube::ResourceExt>(resource: Arc<K>, error: &Error, ctx: Arc<Context>) -> Action {
    tracing::warn!("reconcile failed: {error:?}");
    ctx.metrics.reconcile.set_failure(&resource, error);
    if error.is_retryable() {
        Action::requeue(Duration::from_secs(30))
    } else {
        Action::requeue(Duration::from_secs(5 * 60))
    }
}

/// Starts both controllers and runs them to completion (i.e. until
/// shutdown), concurrently.
pub async fn run(state: State) {
    let client = Client::try_default().await.expect("failed to create kube Client");

    let whisks = Api::<Whisk>::all(client.clone());
    if let Err(e) = whisks.list(&ListParams::default().limit(1)).await {
        error!("Whisk CRD is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }
    let whisk_users = Api::<WhiskUser>::all(client.clone());
    if let Err(e) = whisk_users.list(&ListParams::default().limit(1)).await {
        error!("WhiskUser CRD is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }

    trace!("init controllers");
    let ctx = state.to_context(client);

    let whisk_controller = Controller::new(whisks, WatcherConfig::default().any_semantic())
        .shutdown_on_signal()
        .run(whisk::reconcile, error_policy, ctx.clone())
        .for_each(|result| async move {
            if let Err(e) = result {
                info!("whisk reconcile error: {e:?}");
            }
        });

    let whisk_user_controller = Controller::new(whisk_users, WatcherConfig::default().any_semantic())
        .shutdown_on_signal()
        .run(tenant::reconcile, error_policy, ctx)
        .for_each(|result| async move {
            if let Err(e) = result {
                info!("whiskuser reconcile error: {e:?}");
            }
        });

    futures::future::join(whisk_controller, whisk_user_controller).await;
}
