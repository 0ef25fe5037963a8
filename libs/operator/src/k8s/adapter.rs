//! Contract implementation for §4.1: apply a manifest list, delete a
//! manifest list, query a resource by path expression, wait for a
//! condition (delegated to [`super::wait`]), exec into a pod, copy a file
//! into a pod.
//!
//! All cluster interaction the reconciliation layer performs funnels
//! through [`KubeAdapter`]; component modules never hold a raw
//! `kube::Client`.

use std::collections::BTreeMap;

use futures::{AsyncBufReadExt, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{
    Api, AttachParams, DeleteParams, DynamicObject, Patch, PatchParams, PostParams,
};
use kube::discovery::{ApiResource, Discovery, Scope};
use kube::{Client, ResourceExt};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::error::{Error, Result};

const FIELD_MANAGER: &str = "whisk-operator";
const MAX_APPLY_ATTEMPTS: u32 = 5;

/// Reference to a single pod, for `exec`/`copy`.
#[derive(Clone, Debug)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
    pub container: Option<String>,
}

pub struct KubeAdapter {
    client: Client,
    discovery: Discovery,
}

impl KubeAdapter {
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(Error::KubeError)?;
        Ok(Self { client, discovery })
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    fn resolve(&self, api_version: &str, kind: &str) -> Result<(ApiResource, Scope)> {
        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", api_version),
        };
        for group_entry in self.discovery.groups() {
            if group_entry.name() != group {
                continue;
            }
            for (resource, capabilities) in group_entry.recommended_resources() {
                if resource.kind == kind && resource.version == version {
                    return Ok((resource, capabilities.scope.clone()));
                }
            }
        }
        Err(Error::ExternalSystemError {
            component: "discovery",
            message: format!(
                "apiVersion {api_version} kind {kind} not found in discovery; API server may still be registering the CRD"
            ),
        })
    }

    fn dynamic_api(&self, api_version: &str, kind: &str, namespace: &str) -> Result<Api<DynamicObject>> {
        let (resource, scope) = self.resolve(api_version, kind)?;
        Ok(match scope {
            Scope::Namespaced => Api::namespaced_with(self.client.clone(), namespace, &resource),
            Scope::Cluster => Api::all_with(self.client.clone(), &resource),
        })
    }

    /// Posts the manifests in list order via server-side apply; retries a
    /// bounded number of times on `Conflict` (§4.1).
    #[instrument(skip(self, manifests))]
    pub async fn apply(&self, manifests: &[Value], owner: &OwnerReference) -> Result<()> {
        for manifest in manifests {
            self.apply_one(manifest, owner).await?;
        }
        Ok(())
    }

    async fn apply_one(&self, manifest: &Value, owner: &OwnerReference) -> Result<()> {
        let mut object: DynamicObject =
            serde_json::from_value(manifest.clone()).map_err(Error::SerializationError)?;
        object.metadata.owner_references.get_or_insert_with(Vec::new).push(owner.clone());

        let api_version = object.types.as_ref().map(|t| t.api_version.clone()).unwrap_or_default();
        let kind = object.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
        let namespace = object.metadata.namespace.clone().unwrap_or_default();
        let name = object.name_any();

        let api = self.dynamic_api(&api_version, &kind, &namespace)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = api
                .patch(
                    &name,
                    &PatchParams::apply(FIELD_MANAGER).force(),
                    &Patch::Apply(&object),
                )
                .await;
            match result {
                Ok(_) => return Ok(()),
                Err(kube::Error::Api(err)) if err.code == 409 && attempt < MAX_APPLY_ATTEMPTS => {
                    warn!(kind, name, attempt, "conflict applying manifest, re-reading and retrying");
                    if let Ok(current) = api.get(&name).await {
                        object.metadata.resource_version = current.metadata.resource_version;
                    }
                    continue;
                }
                Err(e @ kube::Error::Api(_)) if attempt >= MAX_APPLY_ATTEMPTS => {
                    return Err(Error::TransientFailure { source: e })
                }
                Err(e) => return Err(Error::KubeError(e)),
            }
        }
    }

    /// Deletes the manifests in reverse order, swallowing `NotFound`
    /// (§4.1).
    #[instrument(skip(self, manifests))]
    pub async fn delete(&self, manifests: &[Value]) -> Result<()> {
        for manifest in manifests.iter().rev() {
            let api_version = manifest.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
            let kind = manifest.get("kind").and_then(Value::as_str).unwrap_or_default();
            let namespace = manifest
                .pointer("/metadata/namespace")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let name = manifest
                .pointer("/metadata/name")
                .and_then(Value::as_str)
                .unwrap_or_default();

            let api = self.dynamic_api(api_version, kind, namespace)?;
            match api.delete(name, &DeleteParams::default()).await {
                Ok(_) => {}
                Err(kube::Error::Api(err)) if err.code == 404 => {}
                Err(e) => return Err(Error::KubeError(e)),
            }
        }
        Ok(())
    }

    /// Fetches one object and resolves a dotted field path against it
    /// (e.g. `"status.loadBalancer.ingress"`), returning every matched
    /// leaf as a list. An absent path yields an empty list rather than an
    /// error.
    pub async fn query(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
        path: &str,
    ) -> Result<Vec<Value>> {
        let api = self.dynamic_api(api_version, kind, namespace)?;
        let object = match api.get(name).await {
            Ok(object) => object,
            Err(kube::Error::Api(err)) if err.code == 404 => return Ok(Vec::new()),
            Err(e) => return Err(Error::KubeError(e)),
        };
        Ok(resolve_path(&serde_json::to_value(&object).map_err(Error::SerializationError)?, path))
    }

    /// Executes `argv` inside a pod's container, returning combined stdout
    /// and the process's exit code (best-effort; `None` if the status
    /// could not be determined).
    #[instrument(skip(self, argv))]
    pub async fn exec(&self, pod: &PodRef, argv: Vec<String>) -> Result<(String, Option<i32>)> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        let mut params = AttachParams::default().stdout(true).stderr(true);
        if let Some(container) = &pod.container {
            params = params.container(container);
        }
        let mut attached = api
            .exec(&pod.name, argv, &params)
            .await
            .map_err(Error::KubeError)?;
        let stdout = attached.stdout().take();
        let mut output = String::new();
        if let Some(stdout) = stdout {
            let mut lines = stdout.lines();
            while let Some(line) = lines.try_next().await.map_err(|e| {
                Error::ExternalSystemError {
                    component: "pod-exec",
                    message: format!("reading exec output: {e}"),
                }
            })? {
                output.push_str(&line);
                output.push('\n');
            }
        }
        let status = attached.take_status().and_then(|mut rx| rx.try_recv().ok().flatten());
        let code = status.and_then(|s| s.details).and_then(|d| d.causes).and_then(|causes| {
            causes
                .into_iter()
                .find(|c| c.reason.as_deref() == Some("ExitCode"))
                .and_then(|c| c.message)
                .and_then(|m| m.parse().ok())
        });
        Ok((output, code))
    }

    /// Streams `contents` into `remote_path` inside a pod by piping a tar
    /// stream to `tar xf - -C <dir>`, the standard kube-rs idiom for
    /// single-file pod copy.
    #[instrument(skip(self, contents))]
    pub async fn copy(&self, pod: &PodRef, remote_path: &str, contents: Vec<u8>) -> Result<()> {
        let (dir, file_name) = remote_path.rsplit_once('/').unwrap_or((".", remote_path));
        let tar_bytes = build_single_file_tar(file_name, &contents);

        let api: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        let mut params = AttachParams::default().stdin(true).stdout(false).stderr(true);
        if let Some(container) = &pod.container {
            params = params.container(container);
        }
        let argv = vec!["tar".to_owned(), "xf".to_owned(), "-".to_owned(), "-C".to_owned(), dir.to_owned()];
        let mut attached = api
            .exec(&pod.name, argv, &params)
            .await
            .map_err(Error::KubeError)?;
        if let Some(mut writer) = attached.stdin() {
            use futures::io::AsyncWriteExt;
            writer
                .write_all(&tar_bytes)
                .await
                .map_err(|e| Error::ExternalSystemError {
                    component: "pod-copy",
                    message: format!("writing tar stream: {e}"),
                })?;
            writer
                .close()
                .await
                .map_err(|e| Error::ExternalSystemError {
                    component: "pod-copy",
                    message: format!("closing tar stream: {e}"),
                })?;
        }
        attached.join().await.map_err(Error::KubeError)?;
        Ok(())
    }

    /// Opaque "pod command" side effect per §9: render, copy, exec and
    /// implicit cleanup (the script is written under `/tmp` and left for
    /// the container's own lifecycle to reap) as a single atomic call.
    #[instrument(skip(self, script))]
    pub async fn run_in_pod(&self, pod: &PodRef, script: &str, interpreter: &str) -> Result<String> {
        let remote_path = "/tmp/whisk-operator-command.sh";
        self.copy(pod, remote_path, script.as_bytes().to_vec()).await?;
        let (output, code) = self
            .exec(pod, vec![interpreter.to_owned(), remote_path.to_owned()])
            .await?;
        match code {
            Some(0) | None => Ok(output),
            Some(other) => Err(Error::ExternalSystemError {
                component: "pod-command",
                message: format!("command exited {other}: {output}"),
            }),
        }
    }
}

fn resolve_path(value: &Value, path: &str) -> Vec<Value> {
    let mut current = vec![value.clone()];
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let mut next = Vec::new();
        for item in current {
            match item {
                Value::Object(ref map) => {
                    if let Some(v) = map.get(segment) {
                        next.push(v.clone());
                    }
                }
                Value::Array(ref items) => {
                    for element in items {
                        if let Some(v) = element.get(segment) {
                            next.push(v.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

/// Minimal USTAR single-file archive, enough for `tar xf -` to unpack one
/// regular file at the archive root.
fn build_single_file_tar(name: &str, contents: &[u8]) -> Vec<u8> {
    let mut header = [0u8; 512];
    let name_bytes = name.as_bytes();
    header[..name_bytes.len().min(100)].copy_from_slice(&name_bytes[..name_bytes.len().min(100)]);
    header[100..108].copy_from_slice(b"0000755\0");
    header[108..116].copy_from_slice(b"0000000\0");
    header[116..124].copy_from_slice(b"0000000\0");
    let size_octal = format!("{:011o}\0", contents.len());
    header[124..124 + size_octal.len()].copy_from_slice(size_octal.as_bytes());
    header[156] = b'0';
    header[257..263].copy_from_slice(b"ustar\0");
    header[263..265].copy_from_slice(b"00");

    for byte in header[148..156].iter_mut() {
        *byte = b' ';
    }
    let checksum: u32 = header.iter().map(|&b| b as u32).sum();
    let checksum_octal = format!("{:06o}\0 ", checksum);
    header[148..148 + checksum_octal.len()].copy_from_slice(checksum_octal.as_bytes());

    let mut archive = Vec::with_capacity(1536 + contents.len());
    archive.extend_from_slice(&header);
    archive.extend_from_slice(contents);
    let padding = (512 - (contents.len() % 512)) % 512;
    archive.extend(std::iter::repeat(0u8).take(padding));
    archive.extend(std::iter::repeat(0u8).take(1024));
    archive
}

/// Builds an owner reference from any resource implementing the standard
/// metadata accessors, suitable for [`KubeAdapter::apply`].
pub fn owner_reference<K>(owner: &K, api_version: &str, kind: &str) -> OwnerReference
where
    K: ResourceExt,
{
    OwnerReference {
        api_version: api_version.to_owned(),
        kind: kind.to_owned(),
        name: owner.name_any(),
        uid: owner.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Labels every owned manifest gets, so §8's "no manifest owned by P has
/// label `component=c` when `c` is disabled" property holds trivially: the
/// label is only ever attached by the component that is actually invoked.
pub fn component_labels(whisk_name: &str, component: &str) -> BTreeMap<String, String> {
    use crate::config::keys;
    BTreeMap::from([
        (keys::LABEL_MANAGED_BY.to_owned(), keys::MANAGED_BY_VALUE.to_owned()),
        (keys::LABEL_PART_OF.to_owned(), whisk_name.to_owned()),
        (keys::LABEL_COMPONENT.to_owned(), component.to_owned()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_path_walks_objects() {
        let value = json!({"status": {"loadBalancer": {"ingress": [{"ip": "1.2.3.4"}]}}});
        let result = resolve_path(&value, "status.loadBalancer.ingress");
        assert_eq!(result, vec![json!([{"ip": "1.2.3.4"}])]);
    }

    #[test]
    fn resolve_path_on_missing_segment_is_empty() {
        let value = json!({"status": {}});
        assert!(resolve_path(&value, "status.loadBalancer").is_empty());
    }

    #[test]
    fn single_file_tar_has_ustar_magic() {
        let archive = build_single_file_tar("a.txt", b"hello");
        assert_eq!(&archive[257..263], b"ustar\0");
    }
}
