//! Cache (§4.4): a single-pod Deployment with a default password and a
//! per-tenant ACL model — each tenant gets a key-prefix, granted
//! `+@all` on `prefix:*`. ACL operations are rendered as a small command
//! script, copied into the pod, executed via `exec` (§9's "pod-side
//! script execution" design note). Quota enforcement toggles the prefix
//! between `+@all` and `+@read`.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::Whisk;
use crate::error::Result;
use crate::k8s::adapter::{component_labels, PodRef};
use crate::k8s::wait;
use crate::template::TemplateData;

const NAME: &str = "cache";
const LABEL_SELECTOR: &str = "app=whisk-cache";

pub struct Cache;

#[async_trait]
impl ComponentController for Cache {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace.clone())
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let manifests = ctx.renderer.render_manifest_list("cache.yaml", &data)?;
        ctx.adapter.apply(&manifests, owner).await?;

        wait::wait_for_pod_ready(&ctx.adapter_client(), &namespace, LABEL_SELECTOR, wait::default_deadline())
            .await?;

        ctx.config.record_endpoint("redis_service", format!("{}-cache", whisk.name_any()))?;
        ctx.config.record_endpoint("redis_port", "6379")?;
        Ok(())
    }

    async fn delete(&self, ctx: &ComponentContext, whisk: &Whisk, _owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace);
        let manifests = ctx.renderer.render_manifest_list("cache.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}

fn pod_ref(namespace: &str) -> PodRef {
    PodRef {
        namespace: namespace.to_owned(),
        name: "cache-0".to_owned(),
        container: None,
    }
}

/// Grants a tenant prefix full read/write access: `+@all` on `prefix:*`.
pub async fn create_tenant_prefix(ctx: &ComponentContext, namespace: &str, prefix: &str, password: &str) -> Result<()> {
    let script = format!(
        "redis-cli ACL SETUSER {prefix} on >{password} ~{prefix}:* +@all\n"
    );
    ctx.adapter.run_in_pod(&pod_ref(namespace), &script, "sh").await.map(drop)
}

pub async fn delete_tenant_prefix(ctx: &ComponentContext, namespace: &str, prefix: &str) -> Result<()> {
    let script = format!("redis-cli ACL DELUSER {prefix}\n");
    ctx.adapter.run_in_pod(&pod_ref(namespace), &script, "sh").await.map(drop)
}

/// Revokes write access for a prefix: `+@read` on `prefix:*`, used by
/// quota enforcement (§4.6).
pub async fn set_read_only(ctx: &ComponentContext, namespace: &str, prefix: &str) -> Result<()> {
    let script = format!("redis-cli ACL SETUSER {prefix} resetkeys ~{prefix}:* +@read\n");
    ctx.adapter.run_in_pod(&pod_ref(namespace), &script, "sh").await.map(drop)
}

/// Restores full access for a prefix: `+@all` on `prefix:*`.
pub async fn set_all(ctx: &ComponentContext, namespace: &str, prefix: &str) -> Result<()> {
    let script = format!("redis-cli ACL SETUSER {prefix} resetkeys ~{prefix}:* +@all\n");
    ctx.adapter.run_in_pod(&pod_ref(namespace), &script, "sh").await.map(drop)
}

/// Lua script summing `MEMORY USAGE` across every key under a tenant
/// prefix, used by the quota checker's usage measurement (§4.6).
pub async fn measure_prefix_usage_bytes(ctx: &ComponentContext, namespace: &str, prefix: &str) -> Result<u64> {
    let script = format!(
        "redis-cli --no-raw EVAL \"local total=0 for _,k in ipairs(redis.call('KEYS', ARGV[1])) do total=total+redis.call('MEMORY','USAGE',k) end return total\" 0 '{prefix}:*'\n"
    );
    let output = ctx.adapter.run_in_pod(&pod_ref(namespace), &script, "sh").await?;
    Ok(output.trim().parse().unwrap_or(0))
}
