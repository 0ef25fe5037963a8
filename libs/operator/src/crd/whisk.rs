use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Affinity, Toleration};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
#[cfg(feature = "schemars")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The `Whisk` custom resource declares the desired state of the whole
/// serverless platform: which subsystems are enabled, their sizing, and the
/// cluster-wide hints (runtime flavor, storage class, API host, protocol)
/// that the reconciliation layer needs to compute concrete manifests.
///
/// For each `Whisk` resource, the operator reconciles a dependency-ordered
/// set of Kubernetes manifests — one controller module per enabled
/// component — and tracks per-component readiness in `.status`.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[kube(
    group = "nuvolaris.org",
    version = "v1",
    kind = "Whisk",
    plural = "whisks",
    singular = "whisk",
    shortname = "wsk",
    namespaced,
    status = "WhiskStatus",
    printcolumn = r#"{"name":"Runtime","type":"string","jsonPath":".spec.runtime"}"#,
    printcolumn = r#"{"name":"ApiHost","type":"string","jsonPath":".status.apiHost"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#,
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct WhiskSpec {
    /// Which subsystems are enabled. Components form a DAG (see
    /// [`Components::prerequisites`]); enabling a component without its
    /// prerequisites is a validation error.
    #[serde(default)]
    pub components: Components,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_db: Option<Workload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<Workload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_log: Option<Workload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<Workload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_controller: Option<Workload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoker: Option<Workload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_store: Option<ObjectStoreSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub relational_db: Option<Workload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_db: Option<Workload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_db_coordinator: Option<Workload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistrySpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<MonitoringSpec>,

    /// Cluster flavor. Drives ingress-class selection, host computation and
    /// whether `tls=true` is honored (ignored on `kind`).
    #[serde(default)]
    pub runtime: RuntimeFlavor,

    /// Default `StorageClass` used by component PVCs when a component does
    /// not override it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Literal hostname, or `"auto"` to derive it from the ingress
    /// controller's load-balancer address (see host computation, §4.5).
    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// `"auto"`, `"http"` or `"https"`. `"auto"` derives the scheme from
    /// `components.tls` (and is always downgraded to `http` on `kind`).
    #[serde(default)]
    pub protocol: Protocol,
}

fn default_api_host() -> String {
    "auto".to_owned()
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct Components {
    #[serde(default)]
    pub document_db: bool,
    #[serde(default)]
    pub object_store: bool,
    #[serde(default)]
    pub cache: bool,
    #[serde(default)]
    pub coordinator: bool,
    #[serde(default)]
    pub registry: bool,
    #[serde(default)]
    pub preloader: bool,
    #[serde(default)]
    pub message_log: bool,
    #[serde(default)]
    pub relational_db: bool,
    #[serde(default)]
    pub mongo_proxy: bool,
    #[serde(default)]
    pub invoker: bool,
    #[serde(default)]
    pub function_controller: bool,
    #[serde(default)]
    pub api_endpoint: bool,
    #[serde(default)]
    pub static_gateway: bool,
    #[serde(default)]
    pub vector_db_coordinator: bool,
    #[serde(default)]
    pub vector_db: bool,
    #[serde(default)]
    pub quota_enforcer: bool,
    #[serde(default)]
    pub monitoring: bool,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub cron: bool,
}

/// Every component name known to the reconciliation layer, in the fixed
/// order §4.2 requires them to be created (leaves first).
pub const COMPONENT_ORDER: &[&str] = &[
    "documentDB",
    "objectStore",
    "cache",
    "coordinator",
    "registry",
    "preloader",
    "messageLog",
    "relationalDB",
    "mongoProxy",
    "invoker",
    "functionController",
    "apiEndpoint",
    "staticGateway",
    "vectorDBCoordinator",
    "vectorDB",
    "quotaEnforcer",
    "monitoring",
    "tls",
    "cron",
];

impl Components {
    /// Component → declared prerequisites, per the table in §4.2.
    pub fn prerequisites(component: &str) -> &'static [&'static str] {
        match component {
            "messageLog" => &["coordinator"],
            "mongoProxy" => &["relationalDB"],
            "invoker" => &["documentDB", "messageLog"],
            "functionController" => &["documentDB", "messageLog", "objectStore"],
            "apiEndpoint" => &["functionController"],
            "staticGateway" => &["objectStore"],
            "vectorDB" => &["vectorDBCoordinator", "objectStore"],
            _ => &[],
        }
    }

    pub fn is_enabled(&self, component: &str) -> bool {
        match component {
            "documentDB" => self.document_db,
            "objectStore" => self.object_store,
            "cache" => self.cache,
            "coordinator" => self.coordinator,
            "registry" => self.registry,
            "preloader" => self.preloader,
            "messageLog" => self.message_log,
            "relationalDB" => self.relational_db,
            "mongoProxy" => self.mongo_proxy,
            "invoker" => self.invoker,
            "functionController" => self.function_controller,
            "apiEndpoint" => self.api_endpoint,
            "staticGateway" => self.static_gateway,
            "vectorDBCoordinator" => self.vector_db_coordinator,
            "vectorDB" => self.vector_db,
            "quotaEnforcer" => self.quota_enforcer,
            "monitoring" => self.monitoring,
            "tls" => self.tls,
            "cron" => self.cron,
            _ => false,
        }
    }

    /// Checks that every enabled component's prerequisites are also
    /// enabled. A component enabled without a declared prerequisite is a
    /// `ValidationError` per §3's invariants.
    pub fn validate_dag(&self) -> Result<()> {
        for &component in COMPONENT_ORDER {
            if !self.is_enabled(component) {
                continue;
            }
            for &dep in Self::prerequisites(component) {
                if !self.is_enabled(dep) {
                    return Err(Error::ValidationError(format!(
                        "component {component} requires {dep} to be enabled"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFlavor {
    K3s,
    Microk8s,
    Kind,
    Openshift,
    Eks,
    Gke,
    Aks,
    Generic,
}

impl Default for RuntimeFlavor {
    fn default() -> Self {
        RuntimeFlavor::Generic
    }
}

impl RuntimeFlavor {
    /// Runtimes whose ingress controller service is backed by a cloud load
    /// balancer, and therefore exposes `status.loadBalancer.ingress`.
    pub fn is_load_balanced(&self) -> bool {
        !matches!(
            self,
            RuntimeFlavor::K3s | RuntimeFlavor::Microk8s | RuntimeFlavor::Kind
        )
    }

    pub fn ingress_class(&self) -> &'static str {
        match self {
            RuntimeFlavor::Microk8s => "public",
            RuntimeFlavor::K3s => "traefik",
            _ => "nginx",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Auto,
    Http,
    Https,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,
    #[serde(default)]
    pub ingress: IngressExposure,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct IngressExposure {
    #[serde(default)]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreSpec {
    #[serde(default)]
    pub workload: Workload,
    /// `"minio"`, `"rook"` or `"seaweedfs"`; selects the bucket-claim
    /// (alternative) variant vs the mgmt-API (primary) variant.
    #[serde(default = "default_s3_provider")]
    pub provider: String,
}

fn default_s3_provider() -> String {
    "minio".to_owned()
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct RegistrySpec {
    /// `"internal"` (StatefulSet + htpasswd) or `"external"` (secrets only).
    #[serde(default = "default_registry_mode")]
    pub mode: String,
    #[serde(default)]
    pub workload: Workload,
}

fn default_registry_mode() -> String {
    "internal".to_owned()
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct QuotaSpec {
    /// Cron schedule for the quota-enforcer CronJob. Defaults to every 10
    /// minutes per §4.6.
    #[serde(default = "default_quota_schedule")]
    pub schedule: String,
}

fn default_quota_schedule() -> String {
    "*/10 * * * *".to_owned()
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSpec {
    #[serde(default)]
    pub alertmanager: bool,
}

/// Most recent observed status of the `Whisk` cluster. Read-only.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct WhiskStatus {
    /// Per-component reconciliation state, one of `on`/`off`/`error`/`?`.
    /// Collapses the original source's separate `whisk_create`/
    /// `whisk_update` maps into one logical map (see DESIGN.md).
    #[serde(default)]
    pub component_states: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_host: Option<String>,
}

impl Whisk {
    /// Validates the invariants of §3: the component DAG, and that
    /// `tls=true` is meaningless (and thus silently ignored, not rejected)
    /// on `kind`.
    pub fn validate(&self) -> Result<()> {
        self.spec.components.validate_dag()
    }

    /// Effective `tls` flag after applying the `kind` override.
    pub fn tls_enabled(&self) -> bool {
        self.spec.components.tls && self.spec.runtime != RuntimeFlavor::Kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dag_requires_prerequisite() {
        let mut c = Components::default();
        c.message_log = true; // requires coordinator
        assert!(c.validate_dag().is_err());
        c.coordinator = true;
        assert!(c.validate_dag().is_ok());
    }

    #[test]
    fn function_controller_requires_three_prerequisites() {
        let mut c = Components::default();
        c.function_controller = true;
        assert!(c.validate_dag().is_err());
        c.document_db = true;
        c.message_log = true;
        c.coordinator = true;
        c.object_store = true;
        assert!(c.validate_dag().is_ok());
    }

    #[test]
    fn tls_ignored_on_kind() {
        let mut whisk = Whisk::new("test", WhiskSpec::default());
        whisk.spec.components.tls = true;
        whisk.spec.runtime = RuntimeFlavor::Generic;
        assert!(whisk.tls_enabled());
        whisk.spec.runtime = RuntimeFlavor::Kind;
        assert!(!whisk.tls_enabled());
    }

    #[test]
    fn independent_components_have_no_prerequisites() {
        let mut c = Components::default();
        c.document_db = true;
        c.object_store = true;
        c.cache = true;
        c.coordinator = true;
        c.registry = true;
        c.preloader = true;
        assert!(c.validate_dag().is_ok());
    }
}
