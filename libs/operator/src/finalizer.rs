//! Finalizer management (§3's Lifecycle rule: delete always runs the
//! teardown path before Kubernetes is allowed to remove the resource).
//!
//! Generic over the custom resource kind so both `Whisk` and `WhiskUser`
//! share one implementation. Uses a JSON merge patch against
//! `metadata.finalizers`, the same patch kind [`crate::quota::annotate`]
//! already uses for annotations — no separate JSON-patch dependency
//! needed for a single-field array replace.

use kube::api::{Api, Patch, PatchParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fmt::Debug;

use crate::error::{Error, Result};

pub const FINALIZER: &str = "nuvolaris.org/whisk-operator";

/// Adds [`FINALIZER`] to `resource` if not already present. Idempotent.
pub async fn add<K>(client: kube::Client, resource: &K) -> Result<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Serialize,
{
    let mut finalizers = resource.finalizers().to_vec();
    if finalizers.iter().any(|f| f == FINALIZER) {
        return Ok(resource.clone());
    }
    finalizers.push(FINALIZER.to_owned());
    patch_finalizers(client, resource, finalizers).await
}

/// Removes [`FINALIZER`] from `resource` if present. Idempotent.
pub async fn remove<K>(client: kube::Client, resource: &K) -> Result<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Serialize,
{
    let finalizers: Vec<String> = resource.finalizers().iter().filter(|f| *f != FINALIZER).cloned().collect();
    patch_finalizers(client, resource, finalizers).await
}

async fn patch_finalizers<K>(client: kube::Client, resource: &K, finalizers: Vec<String>) -> Result<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Serialize,
{
    let api: Api<K> = match resource.namespace() {
        Some(namespace) => Api::namespaced(client, &namespace),
        None => Api::all(client),
    };
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&resource.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(Error::KubeError)
}
